//! FFT stage: windowed forward transform to a magnitude spectrum.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{Result, RidgelineError};
use crate::spectrum::SpectrumFrame;

/// Sliding window of the most recent `len` mono samples
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: Vec<f32>,
    filled: usize,
}

impl SampleWindow {
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
            filled: 0,
        }
    }

    /// Shift `batch` in at the end, dropping the oldest samples
    pub fn push(&mut self, batch: &[f32]) {
        let len = self.samples.len();
        if batch.len() >= len {
            self.samples.copy_from_slice(&batch[batch.len() - len..]);
        } else {
            self.samples.copy_within(batch.len().., 0);
            self.samples[len - batch.len()..].copy_from_slice(batch);
        }
        self.filled = (self.filled + batch.len()).min(len);
    }

    /// True once a full window of real samples has been seen
    pub fn is_full(&self) -> bool {
        self.filled == self.samples.len()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Forward FFT with a precomputed Hann window and reusable buffers
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    sample_rate_hz: u32,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    reference_peak: f32,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize, sample_rate_hz: u32) -> Result<Self> {
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(RidgelineError::InvalidConfig(format!(
                "FFT size must be a power of 2, got {}",
                fft_size
            )));
        }
        if sample_rate_hz == 0 {
            return Err(RidgelineError::InvalidConfig(
                "sample rate must be > 0".to_string(),
            ));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let window: Vec<f32> = (0..fft_size).map(|i| hann_window(i, fft_size)).collect();
        // Coherent gain: a unit sinusoid on a bin centre peaks at sum(w) / 2
        let reference_peak = window.iter().sum::<f32>() / 2.0;

        Ok(Self {
            fft,
            sample_rate_hz,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            reference_peak,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn reference_peak(&self) -> f32 {
        self.reference_peak
    }

    /// A silent frame sized for this transform
    pub fn empty_frame(&self) -> SpectrumFrame {
        SpectrumFrame::silent(self.sample_rate_hz, self.fft_size(), self.reference_peak)
    }

    /// Transform exactly `fft_size` samples into `frame`.
    pub fn process(&mut self, samples: &[f32], frame: &mut SpectrumFrame) {
        debug_assert_eq!(samples.len(), self.fft_size());

        for ((slot, &sample), &w) in self.buffer.iter_mut().zip(samples).zip(&self.window) {
            *slot = Complex::new(sample * w, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        // Bins above Nyquist mirror the lower half
        let half = self.fft_size() / 2 + 1;
        frame.magnitudes.clear();
        frame
            .magnitudes
            .extend(self.buffer[..half].iter().map(|c| c.norm()));
        frame.sample_rate_hz = self.sample_rate_hz;
        frame.fft_size = self.fft_size();
        frame.reference_peak = self.reference_peak;
    }
}

/// Hann window function for FFT analysis
pub fn hann_window(index: usize, size: usize) -> f32 {
    0.5 * (1.0 - ((2.0 * PI * index as f32) / (size as f32 - 1.0)).cos())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq_hz: f32, sample_rate_hz: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * freq_hz * n as f32 / sample_rate_hz as f32).sin())
            .collect()
    }

    #[test]
    fn test_hann_window() {
        let size = 1024;

        // Hann window should be 0 at edges, 1 at center
        assert!((hann_window(0, size) - 0.0).abs() < 0.01);
        assert!((hann_window(size - 1, size) - 0.0).abs() < 0.01);
        assert!((hann_window(size / 2, size) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(SpectrumAnalyzer::new(1000, 44100).is_err());
        assert!(SpectrumAnalyzer::new(1024, 0).is_err());
    }

    #[test]
    fn test_unit_sine_peaks_at_reference() {
        let mut analyzer = SpectrumAnalyzer::new(1024, 44100).unwrap();
        let mut frame = analyzer.empty_frame();

        // Exactly on bin 23 (≈ 990.5 Hz)
        let freq = 23.0 * 44100.0 / 1024.0;
        analyzer.process(&sine(freq, 44100, 1024), &mut frame);

        assert_eq!(frame.magnitudes.len(), 513);
        let (peak_bin, peak) = frame
            .magnitudes
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0), |best, (k, m)| if m > best.1 { (k, m) } else { best });

        assert_eq!(peak_bin, 23);
        let ratio = peak / analyzer.reference_peak();
        assert!((ratio - 1.0).abs() < 0.02, "ratio {}", ratio);
    }

    #[test]
    fn test_silence_is_zero() {
        let mut analyzer = SpectrumAnalyzer::new(256, 48000).unwrap();
        let mut frame = analyzer.empty_frame();
        analyzer.process(&[0.0; 256], &mut frame);
        assert!(frame.magnitudes.iter().all(|m| *m == 0.0));
    }

    #[test]
    fn test_sample_window_slides() {
        let mut window = SampleWindow::new(4);
        assert!(!window.is_full());

        window.push(&[1.0, 2.0]);
        assert_eq!(window.samples(), &[0.0, 0.0, 1.0, 2.0]);
        assert!(!window.is_full());

        window.push(&[3.0, 4.0, 5.0]);
        assert_eq!(window.samples(), &[2.0, 3.0, 4.0, 5.0]);
        assert!(window.is_full());

        window.push(&[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(window.samples(), &[8.0, 9.0, 10.0, 11.0]);
    }
}
