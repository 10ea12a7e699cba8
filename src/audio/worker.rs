//! Audio worker loop: the single writer of the shared band amplitudes.
//!
//! ```text
//! Idle → Running → Draining → Stopped
//! ```
//!
//! Each iteration pulls one batch from the source (bounded by a timeout so the
//! run flag is always rechecked), runs the FFT, and on the aggregation cadence
//! recomputes every layer outside the lock before publishing all of them in a
//! single critical section.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::fft::{SampleWindow, SpectrumAnalyzer};
use super::source::AudioSource;
use crate::error::{try_zeroed, Result, RidgelineError};
use crate::params::AnalysisConfig;
use crate::spectrum::{aggregate_bands, AggregationPolicy, Smoothing, SpectrumFrame};
use crate::state::{AudioProcessingState, SharedContext, WorkerState};

/// Summary returned when the worker exits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    /// Aggregation passes published to the shared state
    pub passes: u64,

    /// Total batches that could not be acquired
    pub acquisition_failures: u64,

    /// True if the worker drained because the failure budget ran out
    pub drained_on_failures: bool,

    pub final_state: WorkerState,
}

pub struct AudioWorker<S> {
    context: Arc<SharedContext>,
    source: S,
    analyzer: SpectrumAnalyzer,
    window: SampleWindow,
    frame: SpectrumFrame,
    batch: Vec<f32>,

    /// Latest aggregation per layer, before smoothing
    fresh: Vec<Vec<f32>>,
    /// Values last published per layer (smoothing state)
    published: Vec<Vec<f32>>,

    policy: AggregationPolicy,
    smoothing: Smoothing,
    acquisition_timeout: Duration,
    max_consecutive_failures: u32,
}

impl<S: AudioSource> AudioWorker<S> {
    /// Prepare a worker for `context`. The FFT runs at the source's sample rate.
    pub fn new(context: Arc<SharedContext>, source: S, config: &AnalysisConfig) -> Result<Self> {
        let config = AnalysisConfig {
            sample_rate_hz: source.sample_rate_hz(),
            ..config.clone()
        };
        config.validate()?;

        // The loop paces itself from the shared state
        let interval = context.processing().aggregation_interval();
        if config.aggregation_interval() != interval {
            return Err(RidgelineError::InvalidConfig(format!(
                "aggregation interval {}ms does not match the shared context's {}ms",
                config.aggregation_interval_ms,
                interval.as_millis()
            )));
        }

        let analyzer = SpectrumAnalyzer::new(config.fft_size, config.sample_rate_hz)?;
        let frame = analyzer.empty_frame();

        let scratch = |what| {
            context
                .layers()
                .iter()
                .map(|layer| try_zeroed(layer.band_count(), what))
                .collect::<Result<Vec<_>>>()
        };
        let fresh = scratch("aggregation scratch")?;
        let published = scratch("smoothing state")?;

        debug!(
            "audio worker: fft_size={}, rate={}Hz, bin={:.2}Hz, interval={}ms, policy={:?}, smoothing={:?}",
            config.fft_size,
            config.sample_rate_hz,
            config.bin_width_hz(),
            interval.as_millis(),
            config.policy,
            config.smoothing
        );

        Ok(Self {
            context,
            source,
            window: SampleWindow::new(config.fft_size),
            analyzer,
            frame,
            batch: Vec::new(),
            fresh,
            published,
            policy: config.policy,
            smoothing: config.smoothing,
            acquisition_timeout: config.acquisition_timeout(),
            max_consecutive_failures: config.max_consecutive_failures,
        })
    }

    /// Run the loop on a dedicated thread.
    pub fn spawn(self) -> Result<WorkerHandle>
    where
        S: 'static,
    {
        let context = Arc::clone(&self.context);
        context.processing().claim();

        let thread = thread::Builder::new()
            .name("ridgeline-audio".to_string())
            .spawn(move || self.run());

        match thread {
            Ok(thread) => Ok(WorkerHandle {
                context,
                thread: Some(thread),
            }),
            Err(e) => {
                context.processing().finish();
                Err(RidgelineError::AudioDevice(format!(
                    "failed to spawn audio worker: {}",
                    e
                )))
            }
        }
    }

    /// Run the loop on the current thread until stopped or out of failures.
    pub fn run(mut self) -> WorkerReport {
        let context = Arc::clone(&self.context);
        let processing = context.processing();
        processing.claim();
        let _finish = FinishOnDrop(processing);

        processing.transition(WorkerState::Running);
        let mut report = self.run_loop(processing.aggregation_interval());

        processing.transition(WorkerState::Draining);
        report.final_state = WorkerState::Stopped;
        info!(
            "audio worker stopping: {} passes, {} acquisition failures{}",
            report.passes,
            report.acquisition_failures,
            if report.drained_on_failures {
                " (failure budget exhausted)"
            } else {
                ""
            }
        );
        report
    }

    fn run_loop(&mut self, interval: Duration) -> WorkerReport {
        let mut report = WorkerReport {
            passes: 0,
            acquisition_failures: 0,
            drained_on_failures: false,
            final_state: WorkerState::Running,
        };
        let mut consecutive_failures = 0;
        let mut last_pass: Option<Instant> = None;

        while self.context.is_running() {
            if let Err(e) = self
                .source
                .next_batch(&mut self.batch, self.acquisition_timeout)
            {
                report.acquisition_failures += 1;
                consecutive_failures += 1;
                warn!(
                    "audio acquisition failed ({}/{}): {}",
                    consecutive_failures, self.max_consecutive_failures, e
                );
                if consecutive_failures >= self.max_consecutive_failures {
                    report.drained_on_failures = true;
                    break;
                }
                continue;
            }
            consecutive_failures = 0;

            if self.batch.is_empty() {
                continue;
            }
            self.window.push(&self.batch);
            self.analyzer.process(self.window.samples(), &mut self.frame);

            let due = last_pass.map_or(true, |at| at.elapsed() >= interval);
            if due {
                self.publish();
                last_pass = Some(Instant::now());
                report.passes += 1;
            }
        }

        report
    }

    /// Aggregate every layer outside the lock, then publish them together.
    fn publish(&mut self) {
        for (index, layer) in self.context.layers().iter().enumerate() {
            aggregate_bands(
                &self.frame,
                layer.layout(),
                layer.sensitivity(),
                self.policy,
                &mut self.fresh[index],
            );
            self.smoothing
                .apply(&mut self.published[index], &self.fresh[index]);
        }

        let published = &self.published;
        self.context.with_write_lock(|amplitudes| {
            for (index, values) in published.iter().enumerate() {
                amplitudes.layer_mut(index).copy_from_slice(values);
            }
        });
    }
}

/// Marks the worker stopped even if the loop panics
struct FinishOnDrop<'a>(&'a AudioProcessingState);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Owner's side of a spawned worker
pub struct WorkerHandle {
    context: Arc<SharedContext>,
    thread: Option<thread::JoinHandle<WorkerReport>>,
}

impl WorkerHandle {
    pub fn context(&self) -> &Arc<SharedContext> {
        &self.context
    }

    /// Clear the run flag, wait for the worker to release shared state, join.
    ///
    /// Returns `None` if the worker thread panicked.
    pub fn shutdown(mut self) -> Option<WorkerReport> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Option<WorkerReport> {
        let thread = self.thread.take()?;
        self.context.stop();

        let started = Instant::now();
        while !self.context.processing().wait_stopped(Duration::from_secs(1)) {
            warn!(
                "still waiting for audio worker to stop ({:.0}s)",
                started.elapsed().as_secs_f32()
            );
        }
        debug!("audio worker stopped after {:?}", started.elapsed());

        match thread.join() {
            Ok(report) => Some(report),
            Err(_) => {
                error!("audio worker panicked");
                None
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AcquisitionError;
    use crate::params::presets_for;
    use std::collections::VecDeque;
    use std::f32::consts::PI;

    /// Replays a fixed script of batches and failures, then times out forever
    struct ScriptedSource {
        script: VecDeque<std::result::Result<Vec<f32>, AcquisitionError>>,
    }

    impl AudioSource for ScriptedSource {
        fn sample_rate_hz(&self) -> u32 {
            44100
        }

        fn next_batch(
            &mut self,
            out: &mut Vec<f32>,
            _timeout: Duration,
        ) -> std::result::Result<(), AcquisitionError> {
            match self.script.pop_front() {
                Some(Ok(batch)) => {
                    *out = batch;
                    Ok(())
                }
                Some(Err(e)) => Err(e),
                None => Err(AcquisitionError::Exhausted),
            }
        }
    }

    fn tone(freq_hz: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * freq_hz * n as f32 / 44100.0).sin())
            .collect()
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            aggregation_interval_ms: 1,
            acquisition_timeout_ms: 5,
            ..AnalysisConfig::default()
        }
    }

    fn context() -> Arc<SharedContext> {
        Arc::new(SharedContext::new(&presets_for(4), Duration::from_millis(1)).unwrap())
    }

    #[test]
    fn test_drains_after_consecutive_failures() {
        let ctx = context();
        let source = ScriptedSource {
            script: VecDeque::from(vec![
                Err(AcquisitionError::Timeout),
                Ok(tone(1000.0, 1024)),
                Err(AcquisitionError::Timeout),
                Err(AcquisitionError::Disconnected),
                Err(AcquisitionError::Timeout),
            ]),
        };

        let report = AudioWorker::new(Arc::clone(&ctx), source, &config())
            .unwrap()
            .run();

        assert!(report.drained_on_failures);
        assert_eq!(report.acquisition_failures, 4);
        assert_eq!(report.passes, 1);
        assert_eq!(report.final_state, WorkerState::Stopped);
        assert!(!ctx.processing().is_work_running());
        assert_eq!(ctx.processing().worker_state(), WorkerState::Stopped);
    }

    #[test]
    fn test_tone_lights_matching_band() {
        let ctx = context();
        let source = ScriptedSource {
            script: VecDeque::from(vec![Ok(tone(1000.0, 1024))]),
        };

        let report = AudioWorker::new(Arc::clone(&ctx), source, &config())
            .unwrap()
            .run();
        assert_eq!(report.passes, 1);

        ctx.with_read_lock(|amplitudes| {
            assert_eq!(amplitudes.generation(), 1);
            // Back layer: 9 bands, 1 kHz lives in [928, 2000)
            let back = amplitudes.layer(0);
            let loudest = back
                .iter()
                .enumerate()
                .fold(0, |best, (i, v)| if *v > back[best] { i } else { best });
            assert_eq!(loudest, 5);
            assert!(back[5] > 1.0, "sensitivity should lift a full-scale tone");
        });
    }

    #[test]
    fn test_stopped_context_exits_without_publishing() {
        let ctx = context();
        ctx.stop();
        let source = ScriptedSource {
            script: VecDeque::from(vec![Ok(tone(440.0, 1024))]),
        };

        let report = AudioWorker::new(Arc::clone(&ctx), source, &config())
            .unwrap()
            .run();

        assert_eq!(report.passes, 0);
        assert!(!report.drained_on_failures);
        ctx.with_read_lock(|amplitudes| assert_eq!(amplitudes.generation(), 0));
    }

    #[test]
    fn test_rejects_interval_not_matching_context() {
        let source = ScriptedSource {
            script: VecDeque::new(),
        };
        let config = AnalysisConfig {
            aggregation_interval_ms: 250,
            ..config()
        };
        assert!(matches!(
            AudioWorker::new(context(), source, &config),
            Err(RidgelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let source = ScriptedSource {
            script: VecDeque::new(),
        };
        let config = AnalysisConfig {
            fft_size: 1000,
            ..config()
        };
        assert!(AudioWorker::new(context(), source, &config).is_err());
    }
}
