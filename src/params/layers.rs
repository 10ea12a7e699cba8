//! Per-layer presets for the stacked "depth" silhouettes.

use tracing::warn;

/// Straight (non-premultiplied) RGBA colour, 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_f32(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

/// Shared silhouette colour; layers differ only in alpha
pub const SILHOUETTE_RGB: (u8, u8, u8) = (38, 37, 36);

/// Configuration for one visualizer layer
#[derive(Debug, Clone)]
pub struct LayerPreset {
    /// Number of bands (silhouette vertices), at least 2
    pub band_count: u32,

    /// Peak height of a band at amplitude 1.0 (pixels)
    pub height_px: u32,

    /// Layer opacity (0-255)
    pub alpha: u8,

    /// Lowest band edge (Hz)
    pub freq_min_hz: f32,

    /// Highest band edge (Hz)
    pub freq_max_hz: f32,

    /// Gain applied to the normalized band magnitude
    pub sensitivity: f32,
}

impl LayerPreset {
    const fn depth(band_count: u32, height_px: u32, alpha: u8) -> Self {
        Self {
            band_count,
            height_px,
            alpha,
            freq_min_hz: 20.0,
            freq_max_hz: 20000.0,
            sensitivity: 35.0,
        }
    }

    pub fn color(&self) -> Rgba8 {
        let (r, g, b) = SILHOUETTE_RGB;
        Rgba8::new(r, g, b, self.alpha)
    }
}

/// Back-to-front depth layers: tall, faint and coarse at the back,
/// short, opaque and detailed at the front.
pub const DEPTH_PRESETS: [LayerPreset; 4] = [
    LayerPreset::depth(9, 180, 63),
    LayerPreset::depth(17, 170, 127),
    LayerPreset::depth(33, 160, 191),
    LayerPreset::depth(65, 150, 255),
];

/// The front-most `count` depth presets (clamped to 1..=4), back to front.
pub fn presets_for(count: usize) -> Vec<LayerPreset> {
    let clamped = count.clamp(1, DEPTH_PRESETS.len());
    if clamped != count {
        warn!("{} layers requested, using {}", count, clamped);
    }
    let count = clamped;
    DEPTH_PRESETS[DEPTH_PRESETS.len() - count..].to_vec()
}
