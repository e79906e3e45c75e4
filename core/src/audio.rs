//! Abstract audio backend: blocking mono f32 sample streams.

use crate::error::Result;

/// A blocking source of mono f32 samples at a fixed rate.
///
/// `read` fills as much of `buf` as it can and returns the number of
/// samples written; 0 means end of stream. Samples are delivered
/// monotonically, there is no seeking.
pub trait SampleSource {
    fn sample_rate(&self) -> u32;
    fn read(&mut self, buf: &mut [f32]) -> Result<usize>;
}

/// A blocking sink for mono f32 samples at a fixed rate.
pub trait SampleSink {
    fn sample_rate(&self) -> u32;
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Flush and close the underlying stream. A no-op by default.
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory source, mainly for loopback tests.
pub struct MemorySource {
    samples: Vec<f32>,
    pos: usize,
    sample_rate: u32,
}

impl MemorySource {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            pos: 0,
            sample_rate,
        }
    }
}

impl SampleSource for MemorySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
        let n = buf.len().min(self.samples.len() - self.pos);
        buf[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// In-memory sink collecting everything written to it.
pub struct MemorySink {
    pub samples: Vec<f32>,
    sample_rate: u32,
}

impl MemorySink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    /// Consume the sink and hand the collected samples back, e.g. to
    /// feed a [`MemorySource`].
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

impl SampleSink for MemorySink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        self.samples.extend_from_slice(samples);
        Ok(())
    }
}

/// Benchmark sink: discards samples, counts them.
pub struct NullSink {
    nsamples: u64,
    sample_rate: u32,
}

impl NullSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            nsamples: 0,
            sample_rate,
        }
    }

    pub fn nsamples(&self) -> u64 {
        self.nsamples
    }
}

impl SampleSink for NullSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        self.nsamples += samples.len() as u64;
        Ok(())
    }
}
