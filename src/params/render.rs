//! Overlay window and frame pacing configuration.

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Assumed display refresh rate (Hz); also the auto-resize period in frames
    pub refresh_rate_hz: u32,

    /// Distance from the bottom edge of the window to the silhouette baseline (pixels)
    pub baseline_margin_px: u32,

    /// Window width used when no monitor can be queried (pixels)
    pub fallback_width: u32,

    /// Window height used when no monitor can be queried (pixels)
    pub fallback_height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            refresh_rate_hz: 165,
            baseline_margin_px: 30,
            fallback_width: 2560,
            fallback_height: 1440,
        }
    }
}

impl RenderConfig {
    /// Baseline y coordinate for a window of the given height (pixels, y down)
    pub fn baseline_y(&self, window_height: u32) -> f32 {
        window_height.saturating_sub(self.baseline_margin_px) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_matches_1440p_layout() {
        let config = RenderConfig::default();
        assert_eq!(config.baseline_y(1440), 1410.0);
        assert_eq!(config.baseline_y(10), 0.0);
    }
}
