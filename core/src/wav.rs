//! WAV file audio backend.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::audio::{SampleSink, SampleSource};
use crate::error::{ModemError, Result};

/// On-disk sample format of a [`WavSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    S16,
    F32,
}

/// Reads mono WAV files, both 16-bit integer and 32-bit float.
/// Decoded samples are always delivered as f32 in [-1.0, 1.0].
pub struct WavSource {
    reader: hound::WavReader<BufReader<File>>,
    spec: hound::WavSpec,
}

impl WavSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels != 1 {
            return Err(ModemError::UnsupportedAudio(format!(
                "{} channels (only mono is supported)",
                spec.channels
            )));
        }
        match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) | (hound::SampleFormat::Float, 32) => {}
            (_, bits) => {
                return Err(ModemError::UnsupportedAudio(format!(
                    "unsupported bit depth: {bits}"
                )))
            }
        }
        Ok(Self { reader, spec })
    }
}

impl SampleSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
        let mut n = 0;
        match self.spec.sample_format {
            hound::SampleFormat::Int => {
                let mut samples = self.reader.samples::<i16>();
                for slot in buf.iter_mut() {
                    match samples.next() {
                        Some(sample) => *slot = sample? as f32 / 32768.0,
                        None => break,
                    }
                    n += 1;
                }
            }
            hound::SampleFormat::Float => {
                let mut samples = self.reader.samples::<f32>();
                for slot in buf.iter_mut() {
                    match samples.next() {
                        Some(sample) => *slot = sample?,
                        None => break,
                    }
                    n += 1;
                }
            }
        }
        Ok(n)
    }
}

/// Writes mono WAV files in the requested sample format.
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    sample_rate: u32,
    format: SampleFormat,
}

impl WavSink {
    pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32, format: SampleFormat) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: match format {
                SampleFormat::S16 => 16,
                SampleFormat::F32 => 32,
            },
            sample_format: match format {
                SampleFormat::S16 => hound::SampleFormat::Int,
                SampleFormat::F32 => hound::SampleFormat::Float,
            },
        };
        let writer = hound::WavWriter::create(path, spec)?;
        Ok(Self {
            writer: Some(writer),
            sample_rate,
            format,
        })
    }
}

impl SampleSink for WavSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ModemError::UnsupportedAudio("write after finalize".into()))?;
        for &sample in samples {
            match self.format {
                SampleFormat::S16 => {
                    let clamped = sample.clamp(-1.0, 1.0);
                    writer.write_sample((clamped * 32767.0) as i16)?;
                }
                SampleFormat::F32 => writer.write_sample(sample)?,
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.finalize();
        }
    }
}
