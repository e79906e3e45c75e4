//! Phase-continuous tone synthesis with an optional sine lookup table.

use std::f64::consts::TAU;

const TONE_AMPLITUDE: f32 = 0.7;

/// Generates fixed-frequency tone bursts. Phase is carried across
/// successive calls so back-to-back tones join without clicks.
pub struct ToneGenerator {
    sample_rate: u32,
    lut: Option<Vec<f32>>,
    phase: f64, // in turns, [0.0, 1.0)
}

impl ToneGenerator {
    /// `lut_len` of 0 disables the lookup table in favor of direct
    /// `sin` evaluation.
    pub fn new(sample_rate: u32, lut_len: usize) -> Self {
        let lut = (lut_len > 0).then(|| {
            (0..lut_len)
                .map(|i| (TAU * i as f64 / lut_len as f64).sin() as f32 * TONE_AMPLITUDE)
                .collect()
        });
        Self {
            sample_rate,
            lut,
            phase: 0.0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// One tone burst. Frequency 0 yields silence and leaves the phase
    /// untouched.
    pub fn tone(&mut self, freq: f32, nsamples: usize) -> Vec<f32> {
        if freq == 0.0 {
            return vec![0.0; nsamples];
        }

        let phase_step = freq as f64 / self.sample_rate as f64;
        let mut samples = Vec::with_capacity(nsamples);
        for _ in 0..nsamples {
            let sample = match &self.lut {
                Some(lut) => lut[(self.phase * lut.len() as f64) as usize % lut.len()],
                None => (TAU * self.phase).sin() as f32 * TONE_AMPLITUDE,
            };
            samples.push(sample);
            self.phase += phase_step;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
        samples
    }
}
