//! Audio capture, FFT analysis, and the worker thread that drives them.
//!
//! Sources hand mono sample batches to the worker, which turns them into
//! per-layer band amplitudes in the shared state.

mod capture;
mod fft;
mod source;
mod worker;

// Re-export public types
pub use capture::{CaptureDevice, CaptureSystem};
pub use fft::{hann_window, SampleWindow, SpectrumAnalyzer};
pub use source::{downmix, AudioSource, ChannelSource, ToneSource, WavSource};
pub use worker::{AudioWorker, WorkerHandle, WorkerReport};
