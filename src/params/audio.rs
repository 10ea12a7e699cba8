//! Audio analysis configuration and constants.

use std::time::Duration;

use crate::error::{Result, RidgelineError};
use crate::spectrum::{AggregationPolicy, Smoothing};

/// FFT analysis and worker cadence configuration
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Audio sample rate (Hz), fixed for the process lifetime
    /// Overwritten with the device rate once a source is opened
    pub sample_rate_hz: u32,

    /// FFT window size (must be power of 2)
    /// 1024 @ 44.1kHz = ~43 Hz per bin
    pub fft_size: usize,

    /// Target period between aggregation passes (milliseconds)
    /// 100 = ~10 Hz spectrum updates
    pub aggregation_interval_ms: u64,

    /// Longest the worker blocks on the source per iteration (milliseconds)
    pub acquisition_timeout_ms: u64,

    /// Consecutive acquisition failures before the worker drains
    pub max_consecutive_failures: u32,

    /// How FFT bins inside one band are combined
    pub policy: AggregationPolicy,

    /// Temporal smoothing between aggregation passes
    pub smoothing: Smoothing,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 44100,
            fft_size: 1024,
            aggregation_interval_ms: 100,
            acquisition_timeout_ms: 250,
            max_consecutive_failures: 3,
            policy: AggregationPolicy::Max,
            smoothing: Smoothing::None,
        }
    }
}

impl AnalysisConfig {
    pub fn aggregation_interval(&self) -> Duration {
        Duration::from_millis(self.aggregation_interval_ms)
    }

    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_millis(self.acquisition_timeout_ms)
    }

    /// Frequency resolution of one FFT bin (Hz)
    pub fn bin_width_hz(&self) -> f32 {
        self.sample_rate_hz as f32 / self.fft_size as f32
    }

    /// Validate configuration (FFT size must be power of 2, etc.)
    pub fn validate(&self) -> Result<()> {
        if self.fft_size < 2 || !self.fft_size.is_power_of_two() {
            return Err(RidgelineError::InvalidConfig(format!(
                "FFT size must be a power of 2, got {}",
                self.fft_size
            )));
        }
        if self.sample_rate_hz == 0 {
            return Err(RidgelineError::InvalidConfig(
                "sample rate must be > 0".to_string(),
            ));
        }
        if self.aggregation_interval_ms == 0 {
            return Err(RidgelineError::InvalidConfig(
                "aggregation interval must be > 0".to_string(),
            ));
        }
        if self.max_consecutive_failures == 0 {
            return Err(RidgelineError::InvalidConfig(
                "failure budget must be > 0".to_string(),
            ));
        }
        if let Smoothing::Exponential { decay } = self.smoothing {
            if !(0.0..1.0).contains(&decay) {
                return Err(RidgelineError::InvalidConfig(format!(
                    "smoothing decay must be in [0, 1), got {}",
                    decay
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());

        // 44100 / 1024 ≈ 43.07 Hz per bin
        assert!((config.bin_width_hz() - 43.066).abs() < 0.01);
        assert_eq!(config.aggregation_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = AnalysisConfig {
            fft_size: 1000,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RidgelineError::InvalidConfig(_))
        ));

        let config = AnalysisConfig {
            sample_rate_hz: 0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AnalysisConfig {
            smoothing: Smoothing::Exponential { decay: 1.0 },
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
