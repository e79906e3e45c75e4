use std::f32::consts::PI;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::error::{ModemError, Result};

/// One frame position considered by [`FskPlan::find_frame`].
///
/// `bits` packs the whole analyzed frame: prev_stop at bit 0, start at
/// bit 1, data LSB-first from bit 2, stop at the top bit. Callers
/// extract the data word with `(bits >> 2) & plan.data_mask()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCandidate {
    pub bits: u32,
    pub confidence: f32,
    pub start_sample: usize,
}

/// Immutable per-session FSK analysis plan.
///
/// Binds the sample rate, the mark/space band indices, the data bit
/// count, and the DFT size. Tones are addressed by integer band
/// indices: band `b` is centered at `b * band_width` Hz.
pub struct FskPlan {
    sample_rate: u32,
    band_width: f32,
    b_mark: u32,
    b_space: u32,
    n_data_bits: u32,
    n_frame_bits: u32,
    fftsize: usize,
    fft: Arc<dyn RealToComplex<f32>>,
}

impl FskPlan {
    /// Create a plan for the given tone pair.
    ///
    /// Rounds `mark_hz` and `space_hz` to the nearest multiple of
    /// `band_width` and sizes the DFT as the smallest power of two
    /// covering one band per bin.
    pub fn new(
        sample_rate: u32,
        mark_hz: f32,
        space_hz: f32,
        band_width: f32,
        n_data_bits: u32,
    ) -> Result<Self> {
        if !(n_data_bits == 5 || n_data_bits == 8) {
            return Err(ModemError::UnsupportedDataBits(n_data_bits));
        }
        if !(band_width > 0.0) {
            return Err(ModemError::InvalidConfig(format!(
                "band width must be positive, got {band_width}"
            )));
        }

        let b_mark = check_band((mark_hz / band_width).round() as i64, band_width, sample_rate)?;
        let b_space = check_band((space_hz / band_width).round() as i64, band_width, sample_rate)?;
        if b_mark == b_space {
            return Err(ModemError::TonesCoincide);
        }

        let fftsize = ((sample_rate as f32 / band_width).ceil() as usize).next_power_of_two();
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(fftsize);

        Ok(Self {
            sample_rate,
            band_width,
            b_mark,
            b_space,
            n_data_bits,
            // prev_stop + start + data + stop; the stop doubles as the
            // next frame's prev_stop, so only n_data_bits + 2 of these
            // advance the stream.
            n_frame_bits: n_data_bits + 3,
            fftsize,
            fft,
        })
    }

    /// Rebind mark to `b_mark` and space to `b_mark + b_shift`.
    ///
    /// Used by carrier auto-detection before any frame result is
    /// committed.
    pub fn set_tones_by_bandshift(&mut self, b_mark: u32, b_shift: i32) -> Result<()> {
        let mark = check_band(b_mark as i64, self.band_width, self.sample_rate)?;
        let space = check_band(
            b_mark as i64 + b_shift as i64,
            self.band_width,
            self.sample_rate,
        )?;
        if mark == space {
            return Err(ModemError::TonesCoincide);
        }
        self.b_mark = mark;
        self.b_space = space;
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn band_width(&self) -> f32 {
        self.band_width
    }

    pub fn b_mark(&self) -> u32 {
        self.b_mark
    }

    pub fn b_space(&self) -> u32 {
        self.b_space
    }

    pub fn n_data_bits(&self) -> u32 {
        self.n_data_bits
    }

    pub fn n_frame_bits(&self) -> u32 {
        self.n_frame_bits
    }

    pub fn fftsize(&self) -> usize {
        self.fftsize
    }

    /// Center frequency of a band in Hz.
    pub fn band_freq(&self, band: u32) -> f32 {
        band as f32 * self.band_width
    }

    /// Mask extracting the data word from packed frame bits.
    pub fn data_mask(&self) -> u32 {
        (1 << self.n_data_bits) - 1
    }

    /// Tone analyzer: magnitudes of the mark and space bands over one
    /// window of at most `fftsize` samples.
    ///
    /// Magnitudes are not normalized; downstream confidence works on
    /// ratios only.
    pub fn analyze(&self, samples: &[f32]) -> (f32, f32) {
        (
            self.band_mag(samples, self.b_mark),
            self.band_mag(samples, self.b_space),
        )
    }

    /// Single-bin DFT magnitude at a band's center frequency (Goertzel
    /// recurrence). The window is capped at `fftsize` samples.
    fn band_mag(&self, samples: &[f32], band: u32) -> f32 {
        let omega = 2.0 * PI * self.band_freq(band) / self.sample_rate as f32;
        let coeff = 2.0 * omega.cos();

        let mut q1 = 0.0f32;
        let mut q2 = 0.0f32;
        for &sample in samples.iter().take(self.fftsize) {
            let q0 = coeff * q1 - q2 + sample;
            q2 = q1;
            q1 = q0;
        }

        let real = q1 - q2 * omega.cos();
        let imag = q2 * omega.sin();
        (real * real + imag * imag).sqrt()
    }

    /// Spectrum bin read for a band index in the full-spectrum scan.
    fn bin_for_band(&self, band: u32) -> usize {
        let bin = (self.fftsize as f32 * self.band_freq(band) / self.sample_rate as f32).round()
            as usize;
        bin.min(self.fftsize / 2)
    }

    /// Highest band index with a center at or below Nyquist.
    fn max_band(&self) -> u32 {
        (self.sample_rate as f32 / 2.0 / self.band_width) as u32
    }

    /// Full-spectrum carrier scan over one window.
    ///
    /// Returns the strongest band iff its magnitude strictly exceeds
    /// `threshold` times the mean band magnitude. Used only in
    /// auto-carrier mode before the tones are pinned.
    pub fn detect_carrier(&self, samples: &[f32], threshold: f32) -> Result<Option<u32>> {
        let mut input = vec![0.0f32; self.fftsize];
        let n = samples.len().min(self.fftsize);
        input[..n].copy_from_slice(&samples[..n]);

        let mut spectrum = vec![Complex::new(0.0f32, 0.0f32); self.fftsize / 2 + 1];
        self.fft
            .process(&mut input, &mut spectrum)
            .map_err(|e| ModemError::Fft(e.to_string()))?;

        let mut max_mag = 0.0f32;
        let mut max_band = None;
        let mut mag_sum = 0.0f32;
        let nbands = self.max_band();
        for band in 1..=nbands {
            let mag = spectrum[self.bin_for_band(band)].norm();
            mag_sum += mag;
            if mag > max_mag {
                max_mag = mag;
                max_band = Some(band);
            }
        }
        if nbands == 0 {
            return Ok(None);
        }

        let mean_mag = mag_sum / nbands as f32;
        match max_band {
            Some(band) if max_mag > threshold * mean_mag && max_mag > 0.0 => Ok(Some(band)),
            _ => Ok(None),
        }
    }

    /// Search a candidate region for the best-scoring frame.
    ///
    /// Examines offsets `first_sample, first_sample + step, ...` below
    /// `first_sample + max_try`, clamped to positions where a whole
    /// frame fits in `buf`. A `search_limit` of `None` forces an
    /// exhaustive search; otherwise the search returns as soon as the
    /// best confidence reaches the limit. Ties keep the earliest
    /// offset.
    pub fn find_frame(
        &self,
        buf: &[f32],
        frame_nsamples: usize,
        first_sample: usize,
        max_try: usize,
        step: usize,
        search_limit: Option<f32>,
    ) -> FrameCandidate {
        let step = step.max(1);
        let samples_per_bit = frame_nsamples as f32 / self.n_frame_bits as f32;

        let mut best = FrameCandidate {
            bits: 0,
            confidence: 0.0,
            start_sample: 0,
        };

        let mut s = first_sample;
        while s < first_sample + max_try {
            if s + frame_nsamples > buf.len() {
                break;
            }
            if let Some((bits, confidence)) = self.analyze_frame(&buf[s..], samples_per_bit) {
                if confidence > best.confidence {
                    best = FrameCandidate {
                        bits,
                        confidence,
                        start_sample: s,
                    };
                }
            }
            if let Some(limit) = search_limit {
                if best.confidence >= limit {
                    break;
                }
            }
            s += step;
        }
        best
    }

    /// Classify one frame at a fixed position.
    ///
    /// Returns `None` when the framing bits (prev_stop=1, start=0,
    /// stop=1) do not hold. Otherwise returns the packed bits and the
    /// frame confidence: the data bits' SNR (summed power of each
    /// bit's classified tone over the summed power of the
    /// alternatives), penalized by the amplitude consistency of the
    /// classified tones. The penalty keeps broadband noise from
    /// scoring as signal: noise classifications always "win" their
    /// bit, but their magnitudes are wildly uneven.
    fn analyze_frame(&self, samples: &[f32], samples_per_bit: f32) -> Option<(u32, f32)> {
        let bit_nsamples = (samples_per_bit + 0.5) as usize;

        let mut bits = 0u32;
        let mut mags = Vec::with_capacity(self.n_frame_bits as usize);
        for i in 0..self.n_frame_bits {
            let begin = (samples_per_bit * i as f32 + 0.5) as usize;
            if begin >= samples.len() {
                return None;
            }
            let window = bit_nsamples.min(samples.len() - begin);
            let (mark_mag, space_mag) = self.analyze(&samples[begin..begin + window]);
            bits |= u32::from(mark_mag > space_mag) << i;
            mags.push((mark_mag, space_mag));
        }

        // Framing: prev_stop must be mark, start space, stop mark.
        if bits & 1 == 0 || bits & 2 != 0 || (bits >> (self.n_frame_bits - 1)) & 1 == 0 {
            return None;
        }

        let mut sig_power = 0.0f32;
        let mut noise_power = 0.0f32;
        let mut sig_min = f32::INFINITY;
        let mut sig_max = 0.0f32;
        for &(mark_mag, space_mag) in &mags[2..(self.n_frame_bits - 1) as usize] {
            let (sig, noise) = if mark_mag >= space_mag {
                (mark_mag, space_mag)
            } else {
                (space_mag, mark_mag)
            };
            sig_power += sig * sig;
            noise_power += noise * noise;
            sig_min = sig_min.min(sig);
            sig_max = sig_max.max(sig);
        }
        if sig_max <= 0.0 {
            return Some((bits, 0.0));
        }
        let snr = sig_power / noise_power.max(f32::EPSILON);
        let consistency = sig_min / sig_max;
        Some((bits, snr * consistency))
    }
}

fn check_band(band: i64, band_width: f32, sample_rate: u32) -> Result<u32> {
    let freq_hz = band as f32 * band_width;
    if band < 1 || freq_hz > sample_rate as f32 / 2.0 {
        return Err(ModemError::BandOutOfRange { band, freq_hz });
    }
    Ok(band as u32)
}
