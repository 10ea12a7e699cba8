//! Parameter definitions with physical units and documented semantics.
//!
//! Presets and tuning values live here as data; the band mapping and
//! aggregation code is parameterized over any number of layers.

mod audio;
mod layers;
mod render;

// Re-export all types
pub use audio::AnalysisConfig;
pub use layers::{presets_for, LayerPreset, Rgba8, DEPTH_PRESETS, SILHOUETTE_RGB};
pub use render::RenderConfig;
