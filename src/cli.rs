//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use crate::audio::CaptureDevice;
use crate::params::{presets_for, AnalysisConfig, LayerPreset, RenderConfig};
use crate::spectrum::{AggregationPolicy, Smoothing};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "ridgeline")]
#[command(about = "Transparent overlay of stacked audio spectrum silhouettes", long_about = None)]
pub struct Args {
    /// Visualize a WAV file instead of a live device
    #[arg(long, value_name = "PATH", conflicts_with_all = ["tone", "loopback"])]
    pub wav: Option<PathBuf>,

    /// Visualize a generated sine tone instead of a live device
    #[arg(long, value_name = "HZ", conflicts_with = "loopback")]
    pub tone: Option<f32>,

    /// Capture what the default output device is playing (WASAPI loopback)
    #[arg(long)]
    pub loopback: bool,

    /// Number of depth layers to stack (1-4)
    #[arg(
        long,
        value_name = "COUNT",
        default_value = "4",
        value_parser = clap::value_parser!(u8).range(1..=4)
    )]
    pub layers: u8,

    /// Milliseconds between spectrum updates
    #[arg(long, value_name = "MS", default_value = "100")]
    pub interval_ms: u64,

    /// FFT window size (power of 2)
    #[arg(long, value_name = "SAMPLES", default_value = "1024")]
    pub fft_size: usize,

    /// Override the gain of every layer
    #[arg(long, value_name = "GAIN")]
    pub sensitivity: Option<f32>,

    /// Band aggregation: max (default) or rms
    #[arg(long, value_name = "POLICY", default_value = "max")]
    pub policy: String,

    /// Exponential smoothing decay in [0, 1); off by default
    #[arg(long, value_name = "DECAY")]
    pub smoothing: Option<f32>,

    /// Display refresh rate (Hz), also the monitor re-check period in frames
    #[arg(long, value_name = "HZ", default_value = "165")]
    pub refresh_rate: u32,
}

/// Where audio comes from
#[derive(Debug, Clone, PartialEq)]
pub enum InputChoice {
    Capture(CaptureDevice),
    Wav(PathBuf),
    Tone(f32),
}

impl Args {
    /// Parse aggregation policy from command-line arguments
    pub fn parse_policy(&self) -> AggregationPolicy {
        match self.policy.to_lowercase().as_str() {
            "max" => AggregationPolicy::Max,
            "rms" => AggregationPolicy::Rms,
            other => {
                warn!("Unknown aggregation policy '{}', using max", other);
                AggregationPolicy::Max
            }
        }
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            fft_size: self.fft_size,
            aggregation_interval_ms: self.interval_ms,
            policy: self.parse_policy(),
            smoothing: self
                .smoothing
                .map_or(Smoothing::None, |decay| Smoothing::Exponential { decay }),
            ..AnalysisConfig::default()
        }
    }

    pub fn layer_presets(&self) -> Vec<LayerPreset> {
        let mut presets = presets_for(usize::from(self.layers));
        if let Some(sensitivity) = self.sensitivity {
            presets
                .iter_mut()
                .for_each(|preset| preset.sensitivity = sensitivity);
        }
        presets
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            refresh_rate_hz: self.refresh_rate.max(1),
            ..RenderConfig::default()
        }
    }

    pub fn input(&self) -> InputChoice {
        if let Some(path) = &self.wav {
            info!("Input: WAV file {}", path.display());
            InputChoice::Wav(path.clone())
        } else if let Some(freq) = self.tone {
            info!("Input: {} Hz test tone", freq);
            InputChoice::Tone(freq)
        } else if self.loopback {
            info!("Input: output loopback");
            InputChoice::Capture(CaptureDevice::Loopback)
        } else {
            info!("Input: default capture device");
            InputChoice::Capture(CaptureDevice::DefaultInput)
        }
    }
}
