//! Ridgeline library - stacked audio spectrum silhouettes
//!
//! Audio samples → FFT magnitudes → per-layer log bands → shared state →
//! per-frame silhouette geometry.

pub mod audio;
pub mod cli;
pub mod error;
pub mod params;
pub mod rendering;
pub mod silhouette;
pub mod spectrum;
pub mod state;

pub use error::{AcquisitionError, Result, RidgelineError};
