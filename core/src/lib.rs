//! Software FSK modem engine for Bell-type and RTTY conventions
//!
//! Synthesizes two-tone audio on transmit and continuously searches a
//! stream of audio samples for FSK frames on receive, reporting each
//! decoded data word together with an SNR-style confidence measure.

pub mod audio;
pub mod baudot;
pub mod error;
pub mod framebits;
pub mod fsk;
pub mod rx;
pub mod tone;
pub mod tx;
pub mod wav;

pub use audio::{MemorySink, MemorySource, NullSink, SampleSink, SampleSource};
pub use error::{ModemError, Result};
pub use framebits::Framebits;
pub use fsk::{FrameCandidate, FskPlan};
pub use rx::{CarrierEvent, NoCarrierReport, Receiver, RxConfig};
pub use tone::ToneGenerator;
pub use tx::{Transmitter, TxConfig};

// Configuration defaults
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Minimum SNR confidence for a frame to count as signal (squelch).
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 2.0;

/// Early-exit confidence for the frame search once carrier is held.
/// Performance vs. quality: a high value forces longer searches but
/// better decode quality on hard-to-discern signals (Bell 103).
pub const DEFAULT_CONFIDENCE_SEARCH_LIMIT: f32 = 2.3;

/// Carrier auto-detection magnitude threshold enabled by `--auto-carrier`.
pub const CARRIER_AUTODETECT_THRESHOLD: f32 = 0.001;

/// Fraction of a bit width the frame search overscans; range (0.0, 1.0).
pub const DEFAULT_FRAME_OVERSCAN: f32 = 0.5;

/// Consecutive low-confidence frame attempts before carrier is declared lost.
pub const MAX_NOCONFIDENCE_BITS: u32 = 20;

// Transmit framing
pub const TX_LEADER_BITS: u32 = 2;
pub const TX_TRAILER_BITS: u32 = 2;

/// Default sine lookup table length for tone synthesis; 0 disables the LUT.
pub const DEFAULT_TX_SIN_TABLE_LEN: usize = 4096;
