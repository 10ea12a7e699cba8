//! Collapse a linear FFT magnitude spectrum into a layer's log-spaced bands.

use super::bands::BandLayout;

/// How the magnitudes of the bins inside one band are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationPolicy {
    /// Loudest bin wins (punchier, spikier silhouettes)
    #[default]
    Max,
    /// Root mean square of the bins (smoother silhouettes)
    Rms,
}

/// Temporal smoothing applied between successive aggregation passes
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Smoothing {
    /// Each pass replaces the previous amplitudes outright
    #[default]
    None,
    /// Exponential moving average: `out = decay * previous + (1 - decay) * fresh`
    Exponential { decay: f32 },
}

impl Smoothing {
    /// Blend `fresh` into `current` in place.
    pub fn apply(self, current: &mut [f32], fresh: &[f32]) {
        debug_assert_eq!(current.len(), fresh.len());
        match self {
            Smoothing::None => current.copy_from_slice(fresh),
            Smoothing::Exponential { decay } => {
                for (value, &new) in current.iter_mut().zip(fresh) {
                    *value = decay * *value + (1.0 - decay) * new;
                }
            }
        }
    }
}

/// One magnitude spectrum as produced by the FFT stage
#[derive(Debug, Clone)]
pub struct SpectrumFrame {
    /// Magnitude per linear bin, `fft_size / 2 + 1` entries (DC to Nyquist)
    pub magnitudes: Vec<f32>,

    pub sample_rate_hz: u32,

    pub fft_size: usize,

    /// Magnitude a unit-amplitude sinusoid produces at its bin
    pub reference_peak: f32,
}

impl SpectrumFrame {
    /// An all-zero spectrum for the given transform
    pub fn silent(sample_rate_hz: u32, fft_size: usize, reference_peak: f32) -> Self {
        Self {
            magnitudes: vec![0.0; fft_size / 2 + 1],
            sample_rate_hz,
            fft_size,
            reference_peak,
        }
    }

    /// Width of one bin (Hz)
    pub fn bin_width_hz(&self) -> f32 {
        self.sample_rate_hz as f32 / self.fft_size as f32
    }

    /// Centre frequency of bin `k` (Hz)
    pub fn bin_frequency(&self, k: usize) -> f32 {
        k as f32 * self.bin_width_hz()
    }

    /// Bins whose centre frequency lies in `[low, high)`
    fn bins_in(&self, low: f32, high: f32) -> std::ops::Range<usize> {
        let width = self.bin_width_hz();
        let len = self.magnitudes.len();
        let start = ((low / width).ceil() as usize).min(len);
        let mut end = ((high / width).ceil() as usize).min(len);
        // Guard against ceil() rounding a bin on the upper edge into this band
        if end > start && self.bin_frequency(end - 1) >= high {
            end -= 1;
        }
        start..end.max(start)
    }
}

/// Compute one amplitude per band of `layout` into `out`.
///
/// Every entry of `out` is overwritten: bands with no FFT bin inside them are
/// set to 0. Values are normalized by the frame's reference peak and scaled by
/// `sensitivity`. Pure and deterministic, so callers can run it outside the
/// shared lock.
pub fn aggregate_bands(
    frame: &SpectrumFrame,
    layout: &BandLayout,
    sensitivity: f32,
    policy: AggregationPolicy,
    out: &mut [f32],
) {
    debug_assert_eq!(out.len(), layout.band_count());

    let norm = if frame.reference_peak > 0.0 {
        sensitivity / frame.reference_peak
    } else {
        sensitivity
    };

    for (index, value) in out.iter_mut().enumerate() {
        let (low, high) = layout.band_range(index);
        let bins = &frame.magnitudes[frame.bins_in(low, high)];

        let magnitude = if bins.is_empty() {
            0.0
        } else {
            match policy {
                AggregationPolicy::Max => bins.iter().copied().fold(0.0, f32::max),
                AggregationPolicy::Rms => {
                    let energy: f32 = bins.iter().map(|m| m * m).sum();
                    (energy / bins.len() as f32).sqrt()
                }
            }
        };

        *value = magnitude * norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame_with_bin(k: usize, magnitude: f32) -> SpectrumFrame {
        let mut frame = SpectrumFrame::silent(44100, 1024, 1.0);
        frame.magnitudes[k] = magnitude;
        frame
    }

    #[test]
    fn test_single_bin_lights_one_band() {
        let layout = BandLayout::new(20.0, 20000.0, 9).unwrap();
        // Bin 23 ≈ 990.5 Hz, the closest bin to 1 kHz at 44.1kHz / 1024
        let frame = frame_with_bin(23, 1.0);
        let target = layout.band_of(frame.bin_frequency(23)).unwrap();
        assert_eq!(target, layout.band_of(1000.0).unwrap());

        let mut out = vec![-1.0; 9];
        aggregate_bands(&frame, &layout, 1.0, AggregationPolicy::Max, &mut out);

        for (index, value) in out.iter().enumerate() {
            if index == target {
                assert_eq!(*value, 1.0);
            } else {
                assert_eq!(*value, 0.0, "band {} should be silent", index);
            }
        }
    }

    #[test]
    fn test_empty_bands_are_zeroed_not_stale() {
        // 65 bands over 20-20000 Hz: the lowest bands are narrower than one bin
        let layout = BandLayout::new(20.0, 20000.0, 65).unwrap();
        let mut frame = SpectrumFrame::silent(44100, 1024, 1.0);
        frame.magnitudes.iter_mut().for_each(|m| *m = 0.5);

        let mut out = vec![f32::NAN; 65];
        aggregate_bands(&frame, &layout, 2.0, AggregationPolicy::Max, &mut out);

        assert!(out.iter().all(|v| *v == 0.0 || *v == 1.0));
        // 20 Hz to ~22 Hz holds no bin centre
        assert_eq!(out[0], 0.0);
        assert_eq!(out[64], 1.0);
    }

    #[test]
    fn test_rms_vs_max() {
        let layout = BandLayout::new(100.0, 400.0, 2).unwrap();
        let mut frame = SpectrumFrame::silent(1024, 1024, 1.0);
        // 1 Hz bins: band 0 spans bins 100..200
        frame.magnitudes[150] = 4.0;

        let mut max = vec![0.0; 2];
        let mut rms = vec![0.0; 2];
        aggregate_bands(&frame, &layout, 1.0, AggregationPolicy::Max, &mut max);
        aggregate_bands(&frame, &layout, 1.0, AggregationPolicy::Rms, &mut rms);

        assert_eq!(max[0], 4.0);
        assert!((rms[0] - 0.4).abs() < 1e-4, "rms {}", rms[0]);
        assert_eq!(rms[1], 0.0);
    }

    #[test]
    fn test_normalizes_by_reference_peak_and_sensitivity() {
        let layout = BandLayout::new(100.0, 400.0, 2).unwrap();
        let mut frame = SpectrumFrame::silent(1024, 1024, 256.0);
        frame.magnitudes[300] = 128.0;

        let mut out = vec![0.0; 2];
        aggregate_bands(&frame, &layout, 35.0, AggregationPolicy::Max, &mut out);
        assert_eq!(out, vec![0.0, 17.5]);
    }

    #[test]
    fn test_bin_on_upper_edge_belongs_to_next_band() {
        let layout = BandLayout::new(100.0, 400.0, 2).unwrap();
        let mut frame = SpectrumFrame::silent(1024, 1024, 1.0);
        let upper = layout.edges()[1];
        let k = upper.ceil() as usize;
        frame.magnitudes[k] = 1.0;

        let mut out = vec![0.0; 2];
        aggregate_bands(&frame, &layout, 1.0, AggregationPolicy::Max, &mut out);
        assert_eq!(out, vec![0.0, 1.0]);
    }

    #[test]
    fn test_exponential_smoothing_converges() {
        let smoothing = Smoothing::Exponential { decay: 0.6 };
        let target = [1.0, 0.25, 0.0];
        let mut current = [0.0, 1.0, 0.5];

        let mut previous_error = f32::MAX;
        for _ in 0..60 {
            smoothing.apply(&mut current, &target);
            let error = current
                .iter()
                .zip(&target)
                .map(|(c, t)| (c - t).abs())
                .fold(0.0, f32::max);
            assert!(error <= previous_error + 1e-6);
            previous_error = error;
        }
        assert!(previous_error < 1e-6);
    }

    #[test]
    fn test_no_smoothing_replaces_outright() {
        let mut current = [0.9, 0.9];
        Smoothing::None.apply(&mut current, &[0.1, 0.0]);
        assert_eq!(current, [0.1, 0.0]);
    }

    proptest! {
        #[test]
        fn prop_aggregation_is_deterministic_and_total(
            magnitudes in proptest::collection::vec(0.0f32..100.0, 513),
            band_count in 2u32..80,
            rms in any::<bool>(),
        ) {
            let layout = BandLayout::new(20.0, 20000.0, band_count).unwrap();
            let frame = SpectrumFrame {
                magnitudes,
                sample_rate_hz: 44100,
                fft_size: 1024,
                reference_peak: 256.0,
            };
            let policy = if rms { AggregationPolicy::Rms } else { AggregationPolicy::Max };

            let mut first = vec![f32::NAN; band_count as usize];
            let mut second = vec![f32::NAN; band_count as usize];
            aggregate_bands(&frame, &layout, 35.0, policy, &mut first);
            aggregate_bands(&frame, &layout, 35.0, policy, &mut second);

            prop_assert!(first.iter().all(|v| v.is_finite() && *v >= 0.0));
            prop_assert_eq!(first, second);
        }
    }
}
