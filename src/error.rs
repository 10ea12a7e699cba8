//! Error taxonomy for the audio-to-visual pipeline.

use std::collections::TryReserveError;

use thiserror::Error;

/// Why an audio batch could not be pulled for one worker iteration.
///
/// These are absorbed by the worker loop and never reach the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    #[error("timed out waiting for audio samples")]
    Timeout,

    #[error("audio source disconnected")]
    Disconnected,

    #[error("audio source exhausted")]
    Exhausted,
}

#[derive(Debug, Error)]
pub enum RidgelineError {
    #[error("invalid frequency range: min {freq_min} Hz, max {freq_max} Hz")]
    InvalidRange { freq_min: f32, freq_max: f32 },

    #[error("a layer needs at least 2 bands, got {0}")]
    TooFewBands(u32),

    #[error("audio acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("failed to allocate {what}")]
    Allocation {
        what: &'static str,
        #[source]
        source: TryReserveError,
    },

    #[error("invalid analysis config: {0}")]
    InvalidConfig(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("wav input error: {0}")]
    Wav(#[from] hound::Error),

    #[error("render error: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, RidgelineError>;

/// Allocate a zeroed buffer, reporting allocator failure instead of aborting.
pub(crate) fn try_zeroed(len: usize, what: &'static str) -> Result<Vec<f32>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|source| RidgelineError::Allocation { what, source })?;
    buffer.resize(len, 0.0);
    Ok(buffer)
}
