//! Live capture from a cpal device into a [`ChannelSource`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::Sender;
use tracing::{error, info, warn};

use super::source::ChannelSource;
use crate::error::{Result, RidgelineError};

/// Batches buffered between the device callback and the worker
const CHANNEL_CAPACITY: usize = 32;

/// Which endpoint to record from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureDevice {
    /// Default microphone / line-in
    #[default]
    DefaultInput,
    /// Default output device opened for input (WASAPI loopback)
    Loopback,
}

/// Keeps the device stream alive; the worker reads from the paired source
pub struct CaptureSystem {
    /// Audio input stream (kept alive)
    _stream: cpal::Stream,

    dropped: Arc<AtomicU64>,
}

impl CaptureSystem {
    /// Open and start the device. The stream must stay on this thread.
    pub fn start(which: CaptureDevice) -> Result<(Self, ChannelSource)> {
        let host = cpal::default_host();
        let (device, config) = match which {
            CaptureDevice::DefaultInput => {
                let device = host.default_input_device().ok_or_else(|| {
                    RidgelineError::AudioDevice("no audio input device found".to_string())
                })?;
                let config = device.default_input_config().map_err(|e| {
                    RidgelineError::AudioDevice(format!("failed to get input config: {}", e))
                })?;
                (device, config)
            }
            CaptureDevice::Loopback => {
                let device = host.default_output_device().ok_or_else(|| {
                    RidgelineError::AudioDevice("no audio output device found".to_string())
                })?;
                let config = device.default_output_config().map_err(|e| {
                    RidgelineError::AudioDevice(format!("failed to get output config: {}", e))
                })?;
                (device, config)
            }
        };

        let sample_rate_hz = config.sample_rate().0;
        let channels = config.channels() as usize;
        info!(
            "Audio capture: {} @ {}Hz, {} ch, {:?}",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate_hz,
            channels,
            config.sample_format()
        );

        let (sender, source) = ChannelSource::pair(sample_rate_hz, CHANNEL_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        let stream_config: cpal::StreamConfig = config.clone().into();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, channels, sender, Arc::clone(&dropped))
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, channels, sender, Arc::clone(&dropped))
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, channels, sender, Arc::clone(&dropped))
            }
            cpal::SampleFormat::I32 => {
                build_stream::<i32>(&device, &stream_config, channels, sender, Arc::clone(&dropped))
            }
            other => Err(RidgelineError::AudioDevice(format!(
                "unsupported sample format {:?}",
                other
            ))),
        }?;

        stream
            .play()
            .map_err(|e| RidgelineError::AudioDevice(format!("failed to start audio stream: {}", e)))?;

        Ok((
            Self {
                _stream: stream,
                dropped,
            },
            source,
        ))
    }

    /// Batches discarded because the worker fell behind
    pub fn dropped_batches(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicU64>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = channels.max(1);
    let scale = 1.0 / channels as f32;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let batch: Vec<f32> = data
                    .chunks_exact(channels)
                    .map(|frame| frame.iter().map(|&s| f32::from_sample_(s)).sum::<f32>() * scale)
                    .collect();

                // Never block the device thread; drop when the worker is behind
                if sender.try_send(batch).is_err() {
                    let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if total % 1000 == 1 {
                        warn!("audio worker behind, {} batches dropped so far", total);
                    }
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| RidgelineError::AudioDevice(format!("failed to build audio stream: {}", e)))
}
