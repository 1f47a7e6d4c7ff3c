use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::SignalConfig, Result};

/// Converts blocks of time-domain samples into byte frequency magnitudes the
/// way a browser analyser node does: Blackman window, real FFT, per-bin
/// smoothing across frames, then a linear map from decibels onto 0..=255.
pub struct SpectrumAnalyser {
    fft_size: usize,
    min_decibels: f32,
    max_decibels: f32,
    smoothing: f32,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new(config: &SignalConfig) -> Self {
        let fft_size = config.fft_size;
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();

        Self {
            fft_size,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            smoothing: config.smoothing,
            plan,
            input,
            spectrum,
            scratch,
            window: (0..fft_size).map(|i| blackman(i, fft_size)).collect(),
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Forgets the smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|value| *value = 0.0);
    }

    /// Analyses the newest `fft_size` samples of `samples` and writes one byte
    /// per bin into `out`. Shorter input is treated as preceded by silence.
    pub fn byte_frequency_data(&mut self, samples: &[f32], out: &mut [u8]) -> Result<()> {
        let recent = &samples[samples.len().saturating_sub(self.fft_size)..];
        let padding = self.fft_size - recent.len();

        self.input[..padding].iter_mut().for_each(|value| *value = 0.0);
        for (index, sample) in recent.iter().enumerate() {
            let slot = padding + index;
            self.input[slot] = *sample * self.window[slot];
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)?;

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        for (bin, (smoothed, byte)) in self.smoothed.iter_mut().zip(out.iter_mut()).enumerate() {
            let magnitude = self.spectrum[bin].norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;

            let decibels = if *smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = (255.0 / range) * (decibels - self.min_decibels);
            *byte = scaled.floor().clamp(0.0, 255.0) as u8;
        }

        Ok(())
    }
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("fft_size", &self.fft_size)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .field("smoothing", &self.smoothing)
            .finish()
    }
}

fn blackman(index: usize, len: usize) -> f32 {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    let x = index as f32 / len as f32;

    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsmoothed() -> SpectrumAnalyser {
        SpectrumAnalyser::new(&SignalConfig {
            smoothing: 0.0,
            ..SignalConfig::default()
        })
    }

    fn tone(bin: usize, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * bin as f32 * i as f32 / len as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero_bytes() {
        let mut analyser = unsmoothed();
        let mut out = vec![7u8; analyser.bin_count()];

        analyser.byte_frequency_data(&[0.0; 512], &mut out).unwrap();

        assert_eq!(out.len(), 256);
        assert!(out.iter().all(|&byte| byte == 0));
    }

    #[test]
    fn loud_tone_saturates_its_bin() {
        let mut analyser = unsmoothed();
        let mut out = vec![0u8; analyser.bin_count()];

        analyser
            .byte_frequency_data(&tone(32, 1.0, 512), &mut out)
            .unwrap();

        let peak = out
            .iter()
            .enumerate()
            .max_by_key(|(_, byte)| **byte)
            .map(|(index, _)| index)
            .unwrap();
        assert_eq!(out[32], 255);
        assert!((31..=33).contains(&peak));
        assert!(out[200] < out[32]);
    }

    #[test]
    fn smoothing_carries_energy_into_following_frames() {
        let mut analyser = SpectrumAnalyser::new(&SignalConfig::default());
        let mut out = vec![0u8; analyser.bin_count()];

        analyser
            .byte_frequency_data(&tone(16, 1.0, 512), &mut out)
            .unwrap();
        analyser.byte_frequency_data(&[0.0; 512], &mut out).unwrap();
        assert!(out[16] > 0, "previous tone should still be visible");

        analyser.reset();
        analyser.byte_frequency_data(&[0.0; 512], &mut out).unwrap();
        assert_eq!(out[16], 0);
    }

    #[test]
    fn short_input_is_padded() {
        let mut analyser = unsmoothed();
        let mut out = vec![0u8; analyser.bin_count()];

        analyser.byte_frequency_data(&[0.5; 10], &mut out).unwrap();
        assert!(out.iter().all(|&byte| byte < 128));

        analyser.byte_frequency_data(&[], &mut out).unwrap();
        assert!(out.iter().all(|&byte| byte == 0));
    }
}
