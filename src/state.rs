//! Shared visualizer state handed from the audio worker to the render loop.
//!
//! The only cross-thread mutable data is the per-layer band amplitudes, kept
//! behind one exclusive lock. Layer configuration is fixed at construction and
//! read without locking.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::{try_zeroed, Result, RidgelineError};
use crate::params::{AnalysisConfig, LayerPreset, Rgba8};
use crate::spectrum::BandLayout;

/// One stacked spectrum silhouette: its preset and derived band edges.
#[derive(Debug, Clone)]
pub struct VisualizerLayer {
    preset: LayerPreset,
    layout: BandLayout,
}

impl VisualizerLayer {
    pub fn new(preset: LayerPreset) -> Result<Self> {
        let layout = BandLayout::new(preset.freq_min_hz, preset.freq_max_hz, preset.band_count)?;
        Ok(Self { preset, layout })
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    pub fn band_count(&self) -> usize {
        self.layout.band_count()
    }

    pub fn sensitivity(&self) -> f32 {
        self.preset.sensitivity
    }

    pub fn height_px(&self) -> u32 {
        self.preset.height_px
    }

    pub fn color(&self) -> Rgba8 {
        self.preset.color()
    }
}

/// Band amplitudes for every layer, plus a counter of completed writes.
#[derive(Debug)]
pub struct Amplitudes {
    generation: u64,
    layers: Box<[Box<[f32]>]>,
}

impl Amplitudes {
    /// Number of write passes published so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn layer(&self, index: usize) -> &[f32] {
        &self.layers[index]
    }

    pub fn layers(&self) -> impl Iterator<Item = &[f32]> {
        self.layers.iter().map(|layer| &layer[..])
    }

    pub fn layer_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.layers[index]
    }
}

/// Lifecycle of the audio worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            2 => WorkerState::Draining,
            _ => WorkerState::Stopped,
        }
    }
}

/// Coordination record between the audio worker and its owner.
#[derive(Debug)]
pub struct AudioProcessingState {
    aggregation_interval: Duration,
    state: AtomicU8,
    work_running: AtomicBool,
    stopped: Mutex<bool>,
    stopped_signal: Condvar,
}

impl AudioProcessingState {
    fn new(aggregation_interval: Duration) -> Self {
        Self {
            aggregation_interval,
            state: AtomicU8::new(WorkerState::Idle as u8),
            work_running: AtomicBool::new(false),
            stopped: Mutex::new(false),
            stopped_signal: Condvar::new(),
        }
    }

    pub fn aggregation_interval(&self) -> Duration {
        self.aggregation_interval
    }

    /// True from worker start until it has released the shared state for good
    pub fn is_work_running(&self) -> bool {
        self.work_running.load(Ordering::Acquire)
    }

    pub fn worker_state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Mark the worker as live. Called before its thread is spawned so the
    /// owner never mistakes a not-yet-started worker for a stopped one.
    pub(crate) fn claim(&self) {
        self.work_running.store(true, Ordering::Release);
    }

    pub(crate) fn transition(&self, next: WorkerState) {
        let previous = WorkerState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        if previous != next {
            debug!("audio worker {:?} -> {:?}", previous, next);
        }
    }

    /// Last action of the worker: after this it never touches shared state.
    pub(crate) fn finish(&self) {
        self.transition(WorkerState::Stopped);
        let mut stopped = self.stopped.lock();
        self.work_running.store(false, Ordering::Release);
        *stopped = true;
        self.stopped_signal.notify_all();
    }

    /// Block until the worker has stopped, or `timeout` elapses.
    ///
    /// Returns whether the worker is stopped. Returns immediately if no
    /// worker ever started.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped && !self.is_work_running() && self.worker_state() == WorkerState::Idle {
            return true;
        }
        if !*stopped {
            let _ = self
                .stopped_signal
                .wait_while_for(&mut stopped, |stopped| !*stopped, timeout);
        }
        *stopped
    }
}

/// Aggregate root shared by the control thread and the audio worker.
#[derive(Debug)]
pub struct SharedContext {
    layers: Box<[VisualizerLayer]>,
    amplitudes: Mutex<Amplitudes>,
    processing: AudioProcessingState,
    running: AtomicBool,
}

impl SharedContext {
    /// Build the context with the aggregation cadence taken from `config`.
    ///
    /// The worker for this context must be built from the same config.
    pub fn from_config(presets: &[LayerPreset], config: &AnalysisConfig) -> Result<Self> {
        Self::new(presets, config.aggregation_interval())
    }

    /// Build every layer and its amplitude buffer at once.
    ///
    /// Range and allocation errors are returned before anything is shared.
    pub fn new(presets: &[LayerPreset], aggregation_interval: Duration) -> Result<Self> {
        if presets.is_empty() {
            return Err(RidgelineError::InvalidConfig(
                "at least one visualizer layer is required".to_string(),
            ));
        }

        let layers = presets
            .iter()
            .cloned()
            .map(VisualizerLayer::new)
            .collect::<Result<Vec<_>>>()?
            .into_boxed_slice();

        let buffers = layers
            .iter()
            .map(|layer| try_zeroed(layer.band_count(), "band amplitudes").map(Vec::into_boxed_slice))
            .collect::<Result<Vec<_>>>()?
            .into_boxed_slice();

        debug!(
            "shared context: {} layers, bands {:?}",
            layers.len(),
            layers.iter().map(VisualizerLayer::band_count).collect::<Vec<_>>()
        );

        Ok(Self {
            layers,
            amplitudes: Mutex::new(Amplitudes {
                generation: 0,
                layers: buffers,
            }),
            processing: AudioProcessingState::new(aggregation_interval),
            running: AtomicBool::new(true),
        })
    }

    pub fn layers(&self) -> &[VisualizerLayer] {
        &self.layers
    }

    pub fn processing(&self) -> &AudioProcessingState {
        &self.processing
    }

    /// Process-wide run flag, polled by the worker every iteration
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the worker to drain and stop
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Mutate the amplitudes under the lock; counts as one published pass.
    ///
    /// Not re-entrant. Never call blocking I/O or the FFT from `f`.
    pub fn with_write_lock<R>(&self, f: impl FnOnce(&mut Amplitudes) -> R) -> R {
        let mut amplitudes = self.amplitudes.lock();
        let result = f(&mut amplitudes);
        amplitudes.generation += 1;
        result
    }

    /// Read the amplitudes under the same exclusive lock. Not re-entrant.
    pub fn with_read_lock<R>(&self, f: impl FnOnce(&Amplitudes) -> R) -> R {
        let amplitudes = self.amplitudes.lock();
        f(&amplitudes)
    }

    /// Copy all layers' amplitudes into `out`, reusing its allocations.
    ///
    /// Returns the generation the copy was taken from.
    pub fn snapshot_into(&self, out: &mut Vec<Vec<f32>>) -> u64 {
        out.resize_with(self.layers.len(), Vec::new);
        self.with_read_lock(|amplitudes| {
            for (dst, src) in out.iter_mut().zip(amplitudes.layers()) {
                dst.clear();
                dst.extend_from_slice(src);
            }
            amplitudes.generation()
        })
    }
}
