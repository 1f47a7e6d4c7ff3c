use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::{SpectrumAnalyser, SpectrumSource};
use crate::config::SignalConfig;

/// Shared buffer holding the most recent mono samples.
///
/// Audio callbacks push into it from their own thread; the analyser takes a
/// snapshot once per frame.
#[derive(Debug, Clone)]
pub struct SampleRing {
    samples: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends mono samples, dropping the oldest beyond capacity.
    pub fn push(&self, samples: &[f32]) {
        let mut ring = self.lock();
        ring.extend(samples.iter().copied());
        self.trim(&mut ring);
    }

    /// Appends interleaved frames, averaging channels down to mono.
    pub fn push_interleaved(&self, data: &[f32], channels: usize) {
        if channels <= 1 {
            self.push(data);
            return;
        }

        let mut ring = self.lock();
        ring.extend(
            data.chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );
        self.trim(&mut ring);
    }

    /// Copies the buffered samples, oldest first, into `out`.
    pub fn snapshot_into(&self, out: &mut Vec<f32>) {
        out.clear();
        out.extend(self.lock().iter().copied());
    }

    fn trim(&self, ring: &mut VecDeque<f32>) {
        let overflow = ring.len().saturating_sub(self.capacity);
        ring.drain(..overflow);
    }

    // A panicking producer leaves plain sample data behind, still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`SpectrumSource`] that analyses whatever currently sits in a
/// [`SampleRing`].
#[derive(Debug)]
pub struct AnalyserSource {
    ring: SampleRing,
    analyser: SpectrumAnalyser,
    snapshot: Vec<f32>,
}

impl AnalyserSource {
    /// Creates a source with a ring sized to one analysis window.
    pub fn new(config: &SignalConfig) -> Self {
        Self::with_ring(SampleRing::new(config.fft_size), config)
    }

    pub fn with_ring(ring: SampleRing, config: &SignalConfig) -> Self {
        Self {
            snapshot: Vec::with_capacity(ring.capacity()),
            ring,
            analyser: SpectrumAnalyser::new(config),
        }
    }

    /// Handle for producers feeding samples into this source.
    pub fn ring(&self) -> SampleRing {
        self.ring.clone()
    }
}

impl SpectrumSource for AnalyserSource {
    fn bin_count(&self) -> usize {
        self.analyser.bin_count()
    }

    fn read_frame(&mut self, bins: &mut [u8]) -> bool {
        self.ring.snapshot_into(&mut self.snapshot);
        if self.snapshot.is_empty() {
            return false;
        }

        match self.analyser.byte_frequency_data(&self.snapshot, bins) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "dropping audio frame");
                false
            }
        }
    }
}
