use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModemError {
    #[error("mark and space tones fall into the same band")]
    TonesCoincide,

    #[error("band {band} ({freq_hz:.1} Hz) is outside the usable spectrum")]
    BandOutOfRange { band: i64, freq_hz: f32 },

    #[error("unsupported data bit count: {0} (expected 5 or 8)")]
    UnsupportedDataBits(u32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported audio layout: {0}")]
    UnsupportedAudio(String),

    #[error("FFT error: {0}")]
    Fft(String),

    #[error("audio file error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ModemError>;
