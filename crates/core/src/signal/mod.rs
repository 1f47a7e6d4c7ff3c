//! Microphone loudness as a single shared scalar.
//!
//! The pipeline reads one frame of byte frequency magnitudes per tick,
//! reduces it to `mean / 255` and publishes the result through a
//! [`SignalPublisher`]. Readers hold a cheap [`SignalLevel`] clone. No
//! smoothing happens here; particles smooth the level individually.

mod capture;
mod source;
mod spectrum;

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

pub use capture::open_default_input;
pub use source::{AnalyserSource, SampleRing};
pub use spectrum::SpectrumAnalyser;

use crate::{config::SignalConfig, timeline::ShutdownSignal};

/// Read side of the process-wide loudness value, in [0, 1].
///
/// The value lives in an atomic so the sampler may run on its own thread; a
/// reader sees either the previous or the new level, never a torn one.
#[derive(Debug, Clone, Default)]
pub struct SignalLevel {
    bits: Arc<AtomicU32>,
}

impl SignalLevel {
    /// Creates a fresh level at 0 together with its only writer.
    pub fn channel() -> (SignalPublisher, SignalLevel) {
        let level = SignalLevel::default();
        let publisher = SignalPublisher {
            bits: level.bits.clone(),
        };
        (publisher, level)
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Write side of [`SignalLevel`]. Deliberately not `Clone`.
#[derive(Debug)]
pub struct SignalPublisher {
    bits: Arc<AtomicU32>,
}

impl SignalPublisher {
    /// Stores `level` clamped into [0, 1]. NaN is published as silence.
    pub fn publish(&self, level: f32) {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        self.bits.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Returns another reader of the value this publisher writes.
    pub fn subscribe(&self) -> SignalLevel {
        SignalLevel {
            bits: self.bits.clone(),
        }
    }
}

/// Mean byte magnitude normalised to [0, 1]. An empty frame is silence.
pub fn mean_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&bin| u64::from(bin)).sum();
    sum as f32 / bins.len() as f32 / 255.0
}

/// Anything that can hand out one frame of byte frequency magnitudes per tick.
pub trait SpectrumSource: Send {
    /// Number of magnitude bins per frame.
    fn bin_count(&self) -> usize;

    /// Fills `bins` with the newest frame. Returns `false` while no audio has
    /// arrived yet, in which case `bins` is left untouched.
    fn read_frame(&mut self, bins: &mut [u8]) -> bool;
}

/// Drives a [`SpectrumSource`] and publishes its loudness.
pub struct SignalPipeline {
    publisher: SignalPublisher,
    config: SignalConfig,
    source: Option<Box<dyn SpectrumSource>>,
    bins: Vec<u8>,
}

impl SignalPipeline {
    /// Creates a pipeline that will acquire the default input device on
    /// [`start`](Self::start).
    pub fn new(publisher: SignalPublisher, config: SignalConfig) -> Self {
        Self {
            publisher,
            config,
            source: None,
            bins: Vec::new(),
        }
    }

    /// Creates a pipeline around an already prepared source.
    pub fn with_source(
        publisher: SignalPublisher,
        config: SignalConfig,
        source: Box<dyn SpectrumSource>,
    ) -> Self {
        let mut pipeline = Self::new(publisher, config);
        pipeline.install(source);
        pipeline
    }

    /// Acquires the microphone if no source was injected.
    ///
    /// Failure is reported through the log and otherwise swallowed: the level
    /// stays at 0 and the flames keep their idle motion.
    pub fn start(&mut self) {
        if self.source.is_some() {
            return;
        }

        match open_default_input(&self.config) {
            Ok(source) => {
                tracing::info!(bins = source.bin_count(), "audio input acquired");
                self.install(source);
            }
            Err(err) => {
                tracing::warn!(error = %err, "audio input unavailable, flames will not react");
            }
        }
    }

    /// Whether a source is attached.
    pub fn is_live(&self) -> bool {
        self.source.is_some()
    }

    /// Reader for the level this pipeline publishes.
    pub fn level(&self) -> SignalLevel {
        self.publisher.subscribe()
    }

    /// Reads one frame and publishes its loudness. Returns the published
    /// value, or `None` if no frame was available.
    pub fn sample(&mut self) -> Option<f32> {
        let source = self.source.as_mut()?;
        if !source.read_frame(&mut self.bins) {
            return None;
        }

        let level = mean_level(&self.bins);
        self.publisher.publish(level);
        Some(level)
    }

    /// Moves sampling onto a worker thread that ticks every `interval` until
    /// `shutdown` is cancelled.
    pub fn spawn(
        mut self,
        shutdown: ShutdownSignal,
        interval: Duration,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("signal-sampler".into())
            .spawn(move || {
                while !shutdown.is_cancelled() {
                    self.sample();
                    thread::sleep(interval);
                }
                tracing::debug!("signal sampler stopped");
            })
    }

    fn install(&mut self, source: Box<dyn SpectrumSource>) {
        self.bins = vec![0; source.bin_count()];
        self.source = Some(source);
    }
}

impl std::fmt::Debug for SignalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalPipeline")
            .field("config", &self.config)
            .field("live", &self.is_live())
            .field("bins", &self.bins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a fixed list of frames, then reports no data.
    struct ScriptedSource {
        frames: Vec<Vec<u8>>,
    }

    impl SpectrumSource for ScriptedSource {
        fn bin_count(&self) -> usize {
            4
        }

        fn read_frame(&mut self, bins: &mut [u8]) -> bool {
            if self.frames.is_empty() {
                return false;
            }
            bins.copy_from_slice(&self.frames.remove(0));
            true
        }
    }

    fn scripted(frames: Vec<Vec<u8>>) -> (SignalPipeline, SignalLevel) {
        let (publisher, level) = SignalLevel::channel();
        let pipeline = SignalPipeline::with_source(
            publisher,
            SignalConfig::default(),
            Box::new(ScriptedSource { frames }),
        );
        (pipeline, level)
    }

    #[test]
    fn mean_level_normalises_bytes() {
        assert_eq!(mean_level(&[]), 0.0);
        assert_eq!(mean_level(&[0, 0, 0]), 0.0);
        assert_eq!(mean_level(&[255; 256]), 1.0);
        assert!((mean_level(&[0, 255]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn publishes_mean_of_each_frame() {
        let (mut pipeline, level) = scripted(vec![vec![255, 255, 0, 0], vec![51, 51, 51, 51]]);
        assert_eq!(level.get(), 0.0);

        assert_eq!(pipeline.sample(), Some(0.5));
        assert_eq!(level.get(), 0.5);

        let second = pipeline.sample().unwrap();
        assert!((second - 0.2).abs() < 1e-6);
        assert!((level.get() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn keeps_last_level_when_no_frame_arrives() {
        let (mut pipeline, level) = scripted(vec![vec![255; 4]]);
        pipeline.sample();
        assert_eq!(pipeline.sample(), None);
        assert_eq!(level.get(), 1.0);
    }

    #[test]
    fn pipeline_without_source_stays_silent() {
        let (publisher, level) = SignalLevel::channel();
        let mut pipeline = SignalPipeline::new(publisher, SignalConfig::default());

        assert!(!pipeline.is_live());
        assert_eq!(pipeline.sample(), None);
        assert_eq!(level.get(), 0.0);
    }

    #[cfg(not(feature = "capture"))]
    #[test]
    fn start_without_device_degrades_gracefully() {
        let (publisher, level) = SignalLevel::channel();
        let mut pipeline = SignalPipeline::new(publisher, SignalConfig::default());

        pipeline.start();

        assert!(!pipeline.is_live());
        assert_eq!(level.get(), 0.0);
    }

    #[test]
    fn publisher_clamps_into_unit_range() {
        let (publisher, level) = SignalLevel::channel();
        publisher.publish(3.0);
        assert_eq!(level.get(), 1.0);
        publisher.publish(-1.0);
        assert_eq!(level.get(), 0.0);
        publisher.publish(0.75);
        publisher.publish(f32::NAN);
        assert_eq!(level.get(), 0.0);
        assert_eq!(publisher.subscribe().get(), 0.0);
    }

    #[test]
    fn spawned_sampler_publishes_and_stops() {
        let (pipeline, level) = scripted(vec![vec![255; 4]]);
        let shutdown = ShutdownSignal::new();

        let worker = pipeline
            .spawn(shutdown.clone(), Duration::from_millis(1))
            .unwrap();
        for _ in 0..1000 {
            if level.get() > 0.0 {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        shutdown.cancel();
        worker.join().unwrap();

        assert_eq!(level.get(), 1.0);
    }
}
