//! The receive state machine: sliding sample buffer, carrier
//! acquisition and loss, frame-by-frame decode.

use std::fmt;
use std::io::Write;

use tracing::debug;

use crate::audio::SampleSource;
use crate::error::{ModemError, Result};
use crate::framebits::Framebits;
use crate::fsk::FskPlan;
use crate::{
    DEFAULT_CONFIDENCE_SEARCH_LIMIT, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_FRAME_OVERSCAN,
    MAX_NOCONFIDENCE_BITS,
};

/// Sub-bit analysis granularity: candidates per bit width searched by
/// the frame locator (accuracy vs. performance).
const ANALYZE_NSTEPS: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct RxConfig {
    pub data_rate: f32,
    /// Squelch: minimum SNR confidence for a frame to count as signal.
    pub confidence_threshold: f32,
    /// Early-exit confidence once carrier is held.
    pub confidence_search_limit: f32,
    /// Auto-carrier magnitude threshold; `None` disables detection.
    pub carrier_autodetect_threshold: Option<f32>,
    /// Mark-to-space distance assumed by auto-carrier, in Hz.
    pub autodetect_shift_hz: f32,
    /// Fraction of a bit width the frame search overscans; (0.0, 1.0).
    pub frame_overscan: f32,
}

impl RxConfig {
    pub fn new(data_rate: f32) -> Self {
        Self {
            data_rate,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            confidence_search_limit: DEFAULT_CONFIDENCE_SEARCH_LIMIT,
            carrier_autodetect_threshold: None,
            autodetect_shift_hz: 200.0,
            frame_overscan: DEFAULT_FRAME_OVERSCAN,
        }
    }
}

/// Summary of a carrier that just dropped (or ended with the stream).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoCarrierReport {
    pub nframes_decoded: u32,
    pub confidence_avg: f32,
    /// Measured bit rate over the carrier's lifetime.
    pub throughput: f32,
    /// Relative rate error; `None` when the rate came out sample-exact.
    pub skew: Option<f32>,
}

impl fmt::Display for NoCarrierReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "### NOCARRIER ndata={} confidence={:.3} throughput={:.2}",
            self.nframes_decoded, self.confidence_avg, self.throughput
        )?;
        match self.skew {
            None => write!(f, " (rate perfect) ###"),
            Some(skew) => write!(
                f,
                " ({:.1}% {}) ###",
                skew.abs() * 100.0,
                if skew.is_sign_negative() { "slow" } else { "fast" }
            ),
        }
    }
}

/// Carrier lifecycle notifications emitted by [`Receiver::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CarrierEvent {
    Acquired { data_rate: f32, mark_hz: f32 },
    Lost(NoCarrierReport),
}

impl fmt::Display for CarrierEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarrierEvent::Acquired { data_rate, mark_hz } => {
                if *data_rate >= 100.0 {
                    write!(
                        f,
                        "### CARRIER {} @ {:.1} Hz ###",
                        (data_rate + 0.5) as u32,
                        mark_hz
                    )
                } else {
                    write!(f, "### CARRIER {:.2} @ {:.1} Hz ###", data_rate, mark_hz)
                }
            }
            CarrierEvent::Lost(report) => report.fmt(f),
        }
    }
}

/// Owns the sliding sample buffer and drives carrier acquisition,
/// frame location, and decoding until the source is exhausted.
pub struct Receiver {
    plan: FskPlan,
    config: RxConfig,
    codec: Framebits,
    nsamples_per_bit: f32,
    nsamples_overscan: usize,
    samplebuf: Vec<f32>,
    nvalid: usize,
    carrier: bool,
    carrier_band: Option<u32>,
    carrier_nsamples: u64,
    confidence_total: f32,
    nframes_decoded: u32,
    noconfidence: u32,
}

impl Receiver {
    pub fn new(plan: FskPlan, codec: Framebits, mut config: RxConfig) -> Result<Self> {
        if !(config.data_rate > 0.0) {
            return Err(ModemError::InvalidConfig(format!(
                "data rate must be positive, got {}",
                config.data_rate
            )));
        }
        if !(config.frame_overscan > 0.0 && config.frame_overscan < 1.0) {
            return Err(ModemError::InvalidConfig(format!(
                "frame overscan must lie within (0.0, 1.0), got {}",
                config.frame_overscan
            )));
        }
        if codec.n_data_bits() != plan.n_data_bits() {
            return Err(ModemError::InvalidConfig(format!(
                "codec is {}-bit but the plan carries {} data bits",
                codec.n_data_bits(),
                plan.n_data_bits()
            )));
        }
        if config.confidence_search_limit < config.confidence_threshold {
            config.confidence_search_limit = config.confidence_threshold;
        }

        let nsamples_per_bit = plan.sample_rate() as f32 / config.data_rate;
        let nsamples_overscan =
            ((nsamples_per_bit * config.frame_overscan + 0.5) as usize).max(1);

        // Conservative: a whole frame plus the scan range, with slack
        // for non-integer bit widths.
        let capacity = nsamples_per_bit.ceil() as usize * (plan.n_frame_bits() as usize + 2);

        Ok(Self {
            plan,
            config,
            codec,
            nsamples_per_bit,
            nsamples_overscan,
            samplebuf: vec![0.0; capacity],
            nvalid: 0,
            carrier: false,
            carrier_band: None,
            carrier_nsamples: 0,
            confidence_total: 0.0,
            nframes_decoded: 0,
            noconfidence: 0,
        })
    }

    /// Run to end of stream, writing decoded bytes to `out` (with
    /// non-printable, non-whitespace bytes shown as `.`) and passing
    /// carrier transitions to `on_event`.
    pub fn run<S, W, F>(&mut self, source: &mut S, out: &mut W, mut on_event: F) -> Result<()>
    where
        S: SampleSource,
        W: Write,
        F: FnMut(&CarrierEvent),
    {
        let capacity = self.samplebuf.len();
        let frame_nsamples = (self.nsamples_per_bit * self.plan.n_frame_bits() as f32) as usize;
        let try_max = self.nsamples_per_bit as usize + self.nsamples_overscan;
        let try_step = ((self.nsamples_per_bit / ANALYZE_NSTEPS) as usize).max(1);

        let mut advance = 0usize;
        let mut eof = false;
        let mut result = Ok(());

        'rx: loop {
            // Shift the buffer left by the previous iteration's advance.
            if advance == capacity {
                self.nvalid = 0;
                advance = 0;
            }
            if advance > 0 {
                if advance > self.nvalid {
                    // Underflow: the stream ended inside the advance.
                    break;
                }
                self.samplebuf.copy_within(advance..self.nvalid, 0);
                self.nvalid -= advance;
                advance = 0;
            }

            // Fill the tail.
            if self.nvalid < capacity {
                let r = match source.read(&mut self.samplebuf[self.nvalid..]) {
                    Ok(r) => r,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                };
                self.nvalid += r;
                eof = r == 0;
            }
            if self.nvalid == 0 {
                break;
            }

            // Pin the carrier band before the tones are trusted.
            if let Some(threshold) = self.config.carrier_autodetect_threshold {
                if self.carrier_band.is_none() {
                    let scan = (self.nsamples_per_bit as usize)
                        .min(self.plan.fftsize())
                        .max(1);
                    let mut found = None;
                    let mut i = 0;
                    while i + scan <= self.nvalid {
                        match self.plan.detect_carrier(&self.samplebuf[i..i + scan], threshold) {
                            Ok(Some(band)) => {
                                found = Some(band);
                                break;
                            }
                            Ok(None) => {}
                            Err(e) => {
                                result = Err(e);
                                break 'rx;
                            }
                        }
                        i += scan;
                    }
                    let scanned = (i + scan).min(self.nvalid);

                    match found {
                        None => {
                            advance = scanned;
                            continue;
                        }
                        Some(band) => {
                            let width = self.plan.band_width();
                            let b_shift =
                                (-(self.config.autodetect_shift_hz + width / 2.0) / width) as i32;
                            if band as i64 + (b_shift as i64) < 1 {
                                debug!(band, "autodetected space band too low");
                                advance = scanned;
                                continue;
                            }
                            debug!(freq = band as f32 * width, "carrier tone detected");
                            if self.plan.set_tones_by_bandshift(band, b_shift).is_err() {
                                advance = scanned;
                                continue;
                            }
                            self.carrier_band = Some(band);
                        }
                    }
                }
            }

            // Whole frames only; a partial tail waits for the next fill.
            if self.nvalid < frame_nsamples {
                if eof {
                    break;
                }
                continue;
            }

            // While unlocked, search exhaustively so the decoder comes
            // out phase-aligned with the signal; locked searches start
            // at the overscan and may exit early.
            let (first_sample, search_limit) = if self.carrier {
                (
                    self.nsamples_overscan,
                    Some(self.config.confidence_search_limit),
                )
            } else {
                (0, None)
            };

            let cand = self.plan.find_frame(
                &self.samplebuf[..self.nvalid],
                frame_nsamples,
                first_sample,
                try_max,
                try_step,
                search_limit,
            );
            let data = (cand.bits >> 2) & self.plan.data_mask();

            if cand.confidence <= self.config.confidence_threshold {
                self.noconfidence += 1;
                debug!(noconfidence = self.noconfidence, "no confidence");
                if self.noconfidence > MAX_NOCONFIDENCE_BITS {
                    self.carrier_band = None;
                    if self.carrier {
                        on_event(&CarrierEvent::Lost(self.no_carrier_report()));
                        self.reset_carrier();
                    }
                }
                advance = try_max;
                continue;
            }

            // The stop bit doubles as the next frame's prev_stop, so a
            // frame accounts for n_data_bits + 2 bits of stream.
            self.carrier_nsamples +=
                (self.nsamples_per_bit * (self.plan.n_data_bits() + 2) as f32) as u64;
            if self.carrier {
                // Account for drift inside the overscan window.
                self.carrier_nsamples += (cand.start_sample - self.nsamples_overscan) as u64;
            } else {
                on_event(&CarrierEvent::Acquired {
                    data_rate: self.config.data_rate,
                    mark_hz: self.plan.band_freq(self.plan.b_mark()),
                });
                self.carrier = true;
                self.codec.reset();
            }
            self.confidence_total += cand.confidence;
            self.nframes_decoded += 1;
            self.noconfidence = 0;

            // Advance past the frame but not past its stop bit (it is
            // the next frame's prev_stop), minus the overscan so a
            // slightly fast signal can be tracked.
            advance = (cand.start_sample as f32
                + self.nsamples_per_bit * (self.plan.n_data_bits() + 2) as f32
                - self.nsamples_overscan as f32) as usize;
            debug!(
                confidence = cand.confidence,
                frame_start = cand.start_sample,
                advance,
                "frame accepted"
            );

            if let Some(byte) = self.codec.decode(data) {
                if let Err(e) = out
                    .write_all(&[printable(byte)])
                    .and_then(|()| out.flush())
                {
                    result = Err(e.into());
                    break;
                }
            }
        }

        if self.carrier {
            on_event(&CarrierEvent::Lost(self.no_carrier_report()));
            self.reset_carrier();
        }
        result
    }

    fn reset_carrier(&mut self) {
        self.carrier = false;
        self.carrier_nsamples = 0;
        self.confidence_total = 0.0;
        self.nframes_decoded = 0;
    }

    fn no_carrier_report(&self) -> NoCarrierReport {
        let nbits_total = self.nframes_decoded as u64 * (self.plan.n_data_bits() + 2) as u64;
        let throughput =
            nbits_total as f32 * self.plan.sample_rate() as f32 / self.carrier_nsamples as f32;
        let perfect =
            (nbits_total as f32 * self.nsamples_per_bit + 0.5) as u64 == self.carrier_nsamples;
        NoCarrierReport {
            nframes_decoded: self.nframes_decoded,
            confidence_avg: self.confidence_total / self.nframes_decoded as f32,
            throughput,
            skew: (!perfect).then(|| {
                (throughput - self.config.data_rate) / self.config.data_rate
            }),
        }
    }
}

/// Display mapping for decoded output: keep printable and whitespace
/// bytes, everything else becomes a dot.
fn printable(byte: u8) -> u8 {
    if byte.is_ascii_graphic() || byte.is_ascii_whitespace() || byte == 0x0B {
        byte
    } else {
        b'.'
    }
}
