//! Default microphone acquisition.
//!
//! With the `capture` feature the cpal input stream lives on a dedicated
//! thread (cpal streams are not `Send` on every host) and pushes mono samples
//! into a [`SampleRing`](super::SampleRing). Without it, acquisition always
//! reports the device as unavailable.

use super::SpectrumSource;
use crate::{config::SignalConfig, Result};

#[cfg(feature = "capture")]
pub use enabled::open_default_input;

/// Always fails: the crate was built without microphone support.
#[cfg(not(feature = "capture"))]
pub fn open_default_input(_config: &SignalConfig) -> Result<Box<dyn SpectrumSource>> {
    Err(crate::FlameVizError::DeviceUnavailable(
        "built without the `capture` feature".to_string(),
    ))
}

#[cfg(feature = "capture")]
mod enabled {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            mpsc, Arc,
        },
        thread::{self, JoinHandle},
        time::Duration,
    };

    use cpal::{
        traits::{DeviceTrait, HostTrait, StreamTrait},
        FromSample, SampleFormat, SizedSample,
    };

    use super::*;
    use crate::{
        signal::{AnalyserSource, SampleRing},
        FlameVizError,
    };

    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Analyser fed by a live input stream. Dropping it closes the stream.
    struct CaptureSource {
        analyser: AnalyserSource,
        stop: Arc<AtomicBool>,
        worker: Option<JoinHandle<()>>,
    }

    impl SpectrumSource for CaptureSource {
        fn bin_count(&self) -> usize {
            self.analyser.bin_count()
        }

        fn read_frame(&mut self, bins: &mut [u8]) -> bool {
            self.analyser.read_frame(bins)
        }
    }

    impl Drop for CaptureSource {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        }
    }

    /// Opens the host's default input device.
    ///
    /// Blocks until the stream is playing or acquisition has failed.
    pub fn open_default_input(config: &SignalConfig) -> Result<Box<dyn SpectrumSource>> {
        let analyser = AnalyserSource::new(config);
        let ring = analyser.ring();
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let worker = {
            let stop = stop.clone();
            thread::Builder::new()
                .name("audio-capture".into())
                .spawn(move || run_capture(ring, stop, ready_tx))?
        };

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(FlameVizError::DeviceUnavailable(
                "capture thread exited during setup".to_string(),
            ))
        });
        if let Err(err) = ready {
            let _ = worker.join();
            return Err(err);
        }

        Ok(Box::new(CaptureSource {
            analyser,
            stop,
            worker: Some(worker),
        }))
    }

    fn run_capture(ring: SampleRing, stop: Arc<AtomicBool>, ready: mpsc::SyncSender<Result<()>>) {
        let stream = match build_default_stream(ring) {
            Ok(stream) => stream,
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        while !stop.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);
        }
        drop(stream);
        tracing::debug!("audio capture stopped");
    }

    fn build_default_stream(ring: SampleRing) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| FlameVizError::DeviceUnavailable("no input device".to_string()))?;
        let supported = device
            .default_input_config()
            .map_err(|err| FlameVizError::DeviceUnavailable(err.to_string()))?;

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = supported.sample_rate().0,
            channels = supported.channels(),
            format = ?supported.sample_format(),
            "opening input stream"
        );

        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, ring),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, ring),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, ring),
            other => {
                return Err(FlameVizError::DeviceUnavailable(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        }
        .map_err(|err| FlameVizError::DeviceUnavailable(err.to_string()))?;

        stream
            .play()
            .map_err(|err| FlameVizError::DeviceUnavailable(err.to_string()))?;
        Ok(stream)
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        ring: SampleRing,
    ) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = usize::from(config.channels);
        let mut converted = Vec::new();

        device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                converted.clear();
                converted.extend(data.iter().map(|&sample| f32::from_sample_(sample)));
                ring.push_interleaved(&converted, channels);
            },
            |err| tracing::warn!(error = %err, "audio input stream error"),
            None,
        )
    }
}
