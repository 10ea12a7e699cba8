//! Pull-model audio sources feeding the worker loop.

use std::f32::consts::TAU;
use std::path::Path;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::info;

use crate::error::{AcquisitionError, Result, RidgelineError};

/// Supplies mono sample batches on demand at a fixed sample rate
pub trait AudioSource: Send {
    fn sample_rate_hz(&self) -> u32;

    /// Replace `out` with the next batch, waiting at most `timeout`.
    fn next_batch(
        &mut self,
        out: &mut Vec<f32>,
        timeout: Duration,
    ) -> std::result::Result<(), AcquisitionError>;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn sample_rate_hz(&self) -> u32 {
        (**self).sample_rate_hz()
    }

    fn next_batch(
        &mut self,
        out: &mut Vec<f32>,
        timeout: Duration,
    ) -> std::result::Result<(), AcquisitionError> {
        (**self).next_batch(out, timeout)
    }
}

/// Average interleaved frames down to one channel, appending to `out`
pub fn downmix(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

/// Batches pushed from another thread (e.g. a device callback)
pub struct ChannelSource {
    receiver: Receiver<Vec<f32>>,
    sample_rate_hz: u32,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<Vec<f32>>, sample_rate_hz: u32) -> Self {
        Self {
            receiver,
            sample_rate_hz,
        }
    }

    /// A bounded channel and the source reading from it
    pub fn pair(sample_rate_hz: u32, capacity: usize) -> (Sender<Vec<f32>>, Self) {
        let (sender, receiver) = bounded(capacity);
        (sender, Self::new(receiver, sample_rate_hz))
    }
}

impl AudioSource for ChannelSource {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn next_batch(
        &mut self,
        out: &mut Vec<f32>,
        timeout: Duration,
    ) -> std::result::Result<(), AcquisitionError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(batch) => {
                *out = batch;
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(AcquisitionError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(AcquisitionError::Disconnected),
        }
    }
}

/// Releases batches no faster than real time
#[derive(Debug)]
struct Pacer {
    period: Duration,
    next_due: Option<Instant>,
}

impl Pacer {
    fn new(batch_len: usize, sample_rate_hz: u32) -> Self {
        Self {
            period: Duration::from_secs_f64(batch_len as f64 / sample_rate_hz as f64),
            next_due: None,
        }
    }

    fn wait(&mut self, timeout: Duration) -> std::result::Result<(), AcquisitionError> {
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        let wait = due.saturating_duration_since(now);
        if wait > timeout {
            std::thread::sleep(timeout);
            return Err(AcquisitionError::Timeout);
        }
        std::thread::sleep(wait);
        // Do not build up a burst after a stall
        self.next_due = Some(due.max(now) + self.period);
        Ok(())
    }
}

/// A decoded WAV file played back in fixed-size batches
pub struct WavSource {
    samples: Vec<f32>,
    position: usize,
    batch_len: usize,
    sample_rate_hz: u32,
    pacer: Option<Pacer>,
}

impl WavSource {
    /// Decode `path` to mono. Playback is paced at real time when `paced`.
    pub fn open(path: impl AsRef<Path>, batch_len: usize, paced: bool) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(RidgelineError::InvalidConfig(
                "WAV sample rate must be > 0".to_string(),
            ));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 * scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let mut samples = Vec::with_capacity(interleaved.len() / spec.channels.max(1) as usize);
        downmix(&interleaved, spec.channels as usize, &mut samples);

        info!(
            "WAV input: {} ({} Hz, {} ch, {:.1}s)",
            path.display(),
            spec.sample_rate,
            spec.channels,
            samples.len() as f32 / spec.sample_rate as f32
        );

        let batch_len = batch_len.max(1);
        Ok(Self {
            samples,
            position: 0,
            batch_len,
            sample_rate_hz: spec.sample_rate,
            pacer: paced.then(|| Pacer::new(batch_len, spec.sample_rate)),
        })
    }
}

impl AudioSource for WavSource {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn next_batch(
        &mut self,
        out: &mut Vec<f32>,
        timeout: Duration,
    ) -> std::result::Result<(), AcquisitionError> {
        if self.position >= self.samples.len() {
            return Err(AcquisitionError::Exhausted);
        }
        if let Some(pacer) = &mut self.pacer {
            pacer.wait(timeout)?;
        }

        let end = (self.position + self.batch_len).min(self.samples.len());
        out.clear();
        out.extend_from_slice(&self.samples[self.position..end]);
        self.position = end;
        Ok(())
    }
}

/// Endless sine tone, handy for checking the overlay without an input device
pub struct ToneSource {
    freq_hz: f32,
    amplitude: f32,
    phase: f32,
    batch_len: usize,
    sample_rate_hz: u32,
    pacer: Option<Pacer>,
}

impl ToneSource {
    pub fn new(
        freq_hz: f32,
        amplitude: f32,
        sample_rate_hz: u32,
        batch_len: usize,
        paced: bool,
    ) -> Self {
        let batch_len = batch_len.max(1);
        Self {
            freq_hz,
            amplitude,
            phase: 0.0,
            batch_len,
            sample_rate_hz,
            pacer: paced.then(|| Pacer::new(batch_len, sample_rate_hz)),
        }
    }
}

impl AudioSource for ToneSource {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn next_batch(
        &mut self,
        out: &mut Vec<f32>,
        timeout: Duration,
    ) -> std::result::Result<(), AcquisitionError> {
        if let Some(pacer) = &mut self.pacer {
            pacer.wait(timeout)?;
        }

        let step = TAU * self.freq_hz / self.sample_rate_hz as f32;
        out.clear();
        for _ in 0..self.batch_len {
            out.push(self.amplitude * self.phase.sin());
            self.phase = (self.phase + step) % TAU;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_averages_frames() {
        let mut out = Vec::new();
        downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0]);

        let mut mono = Vec::new();
        downmix(&[0.25, 0.75], 1, &mut mono);
        assert_eq!(mono, vec![0.25, 0.75]);
    }

    #[test]
    fn test_channel_source_maps_errors() {
        let (sender, mut source) = ChannelSource::pair(48000, 4);
        let mut out = Vec::new();

        assert_eq!(
            source.next_batch(&mut out, Duration::from_millis(1)),
            Err(AcquisitionError::Timeout)
        );

        sender.send(vec![0.1, 0.2]).unwrap();
        assert_eq!(source.next_batch(&mut out, Duration::from_millis(10)), Ok(()));
        assert_eq!(out, vec![0.1, 0.2]);

        drop(sender);
        assert_eq!(
            source.next_batch(&mut out, Duration::from_millis(10)),
            Err(AcquisitionError::Disconnected)
        );
    }

    #[test]
    fn test_wav_source_reads_then_exhausts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..5 {
            writer.write_sample(16384_i16).unwrap();
            writer.write_sample(0_i16).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = WavSource::open(&path, 3, false).unwrap();
        assert_eq!(source.sample_rate_hz(), 8000);

        let mut out = Vec::new();
        source.next_batch(&mut out, Duration::from_millis(10)).unwrap();
        assert_eq!(out, vec![0.25; 3]);
        source.next_batch(&mut out, Duration::from_millis(10)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(
            source.next_batch(&mut out, Duration::from_millis(10)),
            Err(AcquisitionError::Exhausted)
        );
    }

    #[test]
    fn test_wav_source_missing_file() {
        assert!(WavSource::open("/nonexistent/ridgeline.wav", 512, false).is_err());
    }

    #[test]
    fn test_wav_source_zero_rate() {
        // 16-bit mono PCM header with a zero sample rate
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&40_u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1_u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&0_u32.to_le_bytes()); // sample rate
        bytes.extend_from_slice(&0_u32.to_le_bytes()); // byte rate
        bytes.extend_from_slice(&2_u16.to_le_bytes()); // block align
        bytes.extend_from_slice(&16_u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&4_u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero_rate.wav");
        std::fs::write(&path, &bytes).unwrap();

        assert!(WavSource::open(&path, 512, true).is_err());
    }

    #[test]
    fn test_tone_source_amplitude() {
        let mut source = ToneSource::new(1000.0, 0.5, 48000, 480, false);
        let mut out = Vec::new();
        source.next_batch(&mut out, Duration::from_millis(10)).unwrap();

        assert_eq!(out.len(), 480);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.01);
    }
}
