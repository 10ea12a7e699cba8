//! Frequency-band derivation and spectral aggregation.

mod aggregate;
mod bands;

pub use aggregate::{aggregate_bands, AggregationPolicy, Smoothing, SpectrumFrame};
pub use bands::BandLayout;
