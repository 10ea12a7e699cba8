//! Logarithmic band edges for a visualizer layer.
//!
//! Pitch perception is roughly logarithmic, so edges are spaced by a constant
//! ratio rather than a constant width:
//!
//! ```text
//! edge(i) = freq_min * (freq_max / freq_min) ^ (i / band_count)
//! ```

use crate::error::{Result, RidgelineError};

/// Strictly increasing band edges spanning `[freq_min, freq_max]`.
///
/// Band `i` covers the half-open interval `[edges[i], edges[i + 1])`.
#[derive(Debug, Clone, PartialEq)]
pub struct BandLayout {
    edges: Box<[f32]>,
}

impl BandLayout {
    /// Compute `band_count + 1` log-spaced edges.
    ///
    /// Fails with [`RidgelineError::InvalidRange`] when `freq_min <= 0`,
    /// `freq_max <= freq_min`, either bound is not finite, or the range is too
    /// narrow to give every band a distinct `f32` edge.
    pub fn new(freq_min: f32, freq_max: f32, band_count: u32) -> Result<Self> {
        let invalid = || RidgelineError::InvalidRange { freq_min, freq_max };

        if band_count < 2 {
            return Err(RidgelineError::TooFewBands(band_count));
        }
        if !freq_min.is_finite() || !freq_max.is_finite() {
            return Err(invalid());
        }
        if freq_min <= 0.0 || freq_max <= freq_min {
            return Err(invalid());
        }

        let min = freq_min as f64;
        let ratio = freq_max as f64 / min;
        let n = band_count as usize;

        let mut edges = Vec::new();
        edges
            .try_reserve_exact(n + 1)
            .map_err(|source| RidgelineError::Allocation {
                what: "band edges",
                source,
            })?;
        edges.push(freq_min);
        edges.extend((1..n).map(|i| (min * ratio.powf(i as f64 / n as f64)) as f32));
        // Pin the top edge so rounding never leaves it short of freq_max
        edges.push(freq_max);

        if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(invalid());
        }

        Ok(Self {
            edges: edges.into_boxed_slice(),
        })
    }

    pub fn edges(&self) -> &[f32] {
        &self.edges
    }

    pub fn band_count(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn freq_min(&self) -> f32 {
        self.edges[0]
    }

    pub fn freq_max(&self) -> f32 {
        self.edges[self.edges.len() - 1]
    }

    /// Frequency interval `[low, high)` of band `index`
    pub fn band_range(&self, index: usize) -> (f32, f32) {
        (self.edges[index], self.edges[index + 1])
    }

    /// Index of the band containing `freq_hz`, if any
    pub fn band_of(&self, freq_hz: f32) -> Option<usize> {
        if !(freq_hz >= self.freq_min() && freq_hz < self.freq_max()) {
            return None;
        }
        // First edge strictly above freq, minus one
        Some(self.edges.partition_point(|&edge| edge <= freq_hz) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_nine_bands_audible_range() {
        let layout = BandLayout::new(20.0, 20000.0, 9).unwrap();
        let edges = layout.edges();

        assert_eq!(edges.len(), 10);
        assert_eq!(edges[0], 20.0);
        assert_eq!(edges[9], 20000.0);

        // (20000 / 20) ^ (1 / 9) ≈ 2.154
        for pair in edges.windows(2) {
            let ratio = pair[1] / pair[0];
            assert!((ratio - 2.154).abs() < 0.001, "ratio {}", ratio);
        }
    }

    #[test]
    fn test_rejects_non_positive_min() {
        assert!(matches!(
            BandLayout::new(0.0, 20000.0, 9),
            Err(RidgelineError::InvalidRange { .. })
        ));
        assert!(matches!(
            BandLayout::new(-5.0, 20000.0, 9),
            Err(RidgelineError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_or_empty_range() {
        assert!(BandLayout::new(1000.0, 1000.0, 4).is_err());
        assert!(BandLayout::new(2000.0, 1000.0, 4).is_err());
        assert!(BandLayout::new(f32::NAN, 1000.0, 4).is_err());
        assert!(BandLayout::new(20.0, f32::INFINITY, 4).is_err());
    }

    #[test]
    fn test_rejects_single_band() {
        assert!(matches!(
            BandLayout::new(20.0, 20000.0, 1),
            Err(RidgelineError::TooFewBands(1))
        ));
    }

    #[test]
    fn test_band_of_uses_half_open_intervals() {
        let layout = BandLayout::new(100.0, 400.0, 2).unwrap();
        // Edges: 100, 200, 400
        assert!((layout.edges()[1] - 200.0).abs() < 0.01);

        assert_eq!(layout.band_of(99.9), None);
        assert_eq!(layout.band_of(100.0), Some(0));
        assert_eq!(layout.band_of(150.0), Some(0));
        assert_eq!(layout.band_of(250.0), Some(1));
        assert_eq!(layout.band_of(400.0), None);
        assert_eq!(layout.band_of(f32::NAN), None);
    }

    proptest! {
        #[test]
        fn prop_edges_strictly_increase_and_pin_endpoints(
            freq_min in 1.0f32..5000.0,
            factor in 1.5f32..2000.0,
            band_count in 2u32..256,
        ) {
            let freq_max = freq_min * factor;
            let layout = BandLayout::new(freq_min, freq_max, band_count).unwrap();
            let edges = layout.edges();

            prop_assert_eq!(edges.len(), band_count as usize + 1);
            prop_assert_eq!(edges[0], freq_min);
            prop_assert_eq!(edges[band_count as usize], freq_max);
            prop_assert!(edges.windows(2).all(|pair| pair[0] < pair[1]));
        }

        #[test]
        fn prop_band_of_agrees_with_edges(
            band_count in 2u32..128,
            t in 0.0f32..1.0,
        ) {
            let layout = BandLayout::new(20.0, 20000.0, band_count).unwrap();
            let freq = 20.0 + t * (20000.0 - 20.0);
            if let Some(index) = layout.band_of(freq) {
                let (low, high) = layout.band_range(index);
                prop_assert!(low <= freq && freq < high);
            }
        }
    }
}
