//! BFSK transmitter: leader, start/data/stop framing, idle trailer.

use std::io::Read;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::audio::SampleSink;
use crate::error::{ModemError, Result};
use crate::framebits::Framebits;
use crate::tone::ToneGenerator;
use crate::{DEFAULT_TX_SIN_TABLE_LEN, TX_LEADER_BITS, TX_TRAILER_BITS};

#[derive(Debug, Clone)]
pub struct TxConfig {
    pub data_rate: f32,
    pub mark_hz: f32,
    pub space_hz: f32,
    /// Stop bit length in bits; may be fractional (1.5 for RTTY).
    pub stop_bits: f32,
    /// Interactive mode flushes the trailer after a byte gap of more
    /// than one bit period.
    pub interactive: bool,
    pub sin_table_len: usize,
}

impl TxConfig {
    pub fn new(data_rate: f32, mark_hz: f32, space_hz: f32) -> Self {
        Self {
            data_rate,
            mark_hz,
            space_hz,
            stop_bits: 1.0,
            interactive: false,
            sin_table_len: DEFAULT_TX_SIN_TABLE_LEN,
        }
    }
}

/// Blocking transmit loop over a byte stream.
pub struct Transmitter {
    config: TxConfig,
    codec: Framebits,
    tone: ToneGenerator,
    bit_nsamples: usize,
    transmitting: bool,
    last_byte: Option<Instant>,
}

impl Transmitter {
    pub fn new(codec: Framebits, config: TxConfig, sample_rate: u32) -> Result<Self> {
        if !(config.data_rate > 0.0) {
            return Err(ModemError::InvalidConfig(format!(
                "data rate must be positive, got {}",
                config.data_rate
            )));
        }
        if !(config.stop_bits > 0.0) {
            return Err(ModemError::InvalidConfig(format!(
                "stop bit length must be positive, got {}",
                config.stop_bits
            )));
        }
        let bit_nsamples = (sample_rate as f32 / config.data_rate + 0.5) as usize;
        let tone = ToneGenerator::new(sample_rate, config.sin_table_len);
        Ok(Self {
            config,
            codec,
            tone,
            bit_nsamples,
            transmitting: false,
            last_byte: None,
        })
    }

    /// Read bytes until EOF, framing each encoded data word as one
    /// space start bit, the data bits LSB-first, and `stop_bits` of
    /// mark. A leader of mark precedes the first word after idle; the
    /// trailer plus flush silence closes the stream at EOF and, in
    /// interactive mode, after any sufficiently long byte gap.
    pub fn run<R: Read, S: SampleSink>(&mut self, input: R, sink: &mut S) -> Result<()> {
        let idle_gap = Duration::from_secs_f64(1.03 / self.config.data_rate as f64);

        for byte in input.bytes() {
            let byte = byte?;

            if self.config.interactive && self.transmitting {
                if let Some(last) = self.last_byte {
                    if last.elapsed() > idle_gap {
                        self.stop_transmit(sink)?;
                    }
                }
            }

            let words = self.codec.encode(byte);
            if words.is_empty() {
                continue;
            }

            if !self.transmitting {
                self.transmitting = true;
                for _ in 0..TX_LEADER_BITS {
                    self.send_bit(sink, true)?;
                }
            }
            for word in words {
                debug!(word, "transmit data word");
                self.send_bit(sink, false)?; // start
                for i in 0..self.codec.n_data_bits() {
                    self.send_bit(sink, (word >> i) & 1 == 1)?;
                }
                let stop_nsamples = (self.bit_nsamples as f32 * self.config.stop_bits) as usize;
                self.send_tone(sink, self.config.mark_hz, stop_nsamples)?;
            }
            self.last_byte = Some(Instant::now());
        }

        if self.transmitting {
            self.stop_transmit(sink)?;
        }
        Ok(())
    }

    /// Trailer bits plus half a second of silence to flush the stream.
    fn stop_transmit<S: SampleSink>(&mut self, sink: &mut S) -> Result<()> {
        for _ in 0..TX_TRAILER_BITS {
            self.send_bit(sink, true)?;
        }
        let flush_nsamples = self.tone.sample_rate() as usize / 2;
        self.send_tone(sink, 0.0, flush_nsamples)?;
        self.transmitting = false;
        Ok(())
    }

    fn send_bit<S: SampleSink>(&mut self, sink: &mut S, bit: bool) -> Result<()> {
        let freq = if bit {
            self.config.mark_hz
        } else {
            self.config.space_hz
        };
        self.send_tone(sink, freq, self.bit_nsamples)
    }

    fn send_tone<S: SampleSink>(&mut self, sink: &mut S, freq: f32, nsamples: usize) -> Result<()> {
        let samples = self.tone.tone(freq, nsamples);
        sink.write(&samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemorySink;

    fn transmit_bytes(config: TxConfig, codec: Framebits, data: &[u8]) -> Vec<f32> {
        let mut tx = Transmitter::new(codec, config, 48000).unwrap();
        let mut sink = MemorySink::new(48000);
        tx.run(data, &mut sink).unwrap();
        sink.into_samples()
    }

    #[test]
    fn test_single_byte_stream_length() {
        let config = TxConfig::new(300.0, 1270.0, 1070.0);
        let samples = transmit_bytes(config, Framebits::Ascii8, b"A");
        // leader(2) + start(1) + data(8) + stop(1) + trailer(2) bits,
        // then 0.5 s of flush silence
        let bit = 160;
        assert_eq!(samples.len(), 14 * bit + 24000);
        assert!(samples[24000..].iter().rev().take(100).all(|&s| s == 0.0));
    }

    #[test]
    fn test_fractional_stop_bits_length() {
        let mut config = TxConfig::new(300.0, 1585.0, 1415.0);
        config.stop_bits = 1.5;
        let samples = transmit_bytes(config, Framebits::for_data_bits(5), b"R");
        // leader(2) + start(1) + data(5) bits + 1.5-bit stop + trailer(2)
        let bit = 160;
        assert_eq!(samples.len(), 10 * bit + 240 + 24000);
    }

    #[test]
    fn test_baudot_shift_expands_to_two_words() {
        let config = TxConfig::new(300.0, 1585.0, 1415.0);
        let with_shift = transmit_bytes(config.clone(), Framebits::for_data_bits(5), b"1");
        let without = transmit_bytes(config, Framebits::for_data_bits(5), b"R");
        let bit = 160;
        // the figure needs a FIGS word in front: one extra 7-bit frame
        assert_eq!(with_shift.len() - without.len(), 7 * bit);
    }

    #[test]
    fn test_unrepresentable_byte_transmits_nothing() {
        let config = TxConfig::new(300.0, 1585.0, 1415.0);
        let samples = transmit_bytes(config, Framebits::for_data_bits(5), b"~");
        assert!(samples.is_empty());
    }

    #[test]
    fn test_interactive_gap_inserts_trailer() {
        struct SlowPair {
            sent: usize,
        }
        impl Read for SlowPair {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.sent >= 2 {
                    return Ok(0);
                }
                if self.sent == 1 {
                    std::thread::sleep(Duration::from_millis(30));
                }
                buf[0] = b'U';
                self.sent += 1;
                Ok(1)
            }
        }

        // 4800 bps: one bit is 10 samples / ~0.2 ms, so a 30 ms gap
        // re-idles the transmitter and a second leader is emitted.
        let mut config = TxConfig::new(4800.0, 3000.0, 1000.0);
        config.interactive = true;
        let mut tx = Transmitter::new(Framebits::Ascii8, config, 48000).unwrap();
        let mut sink = MemorySink::new(48000);
        tx.run(SlowPair { sent: 0 }, &mut sink).unwrap();

        let bit = 10;
        let one_burst = 14 * bit + 24000;
        assert_eq!(sink.into_samples().len(), 2 * one_burst);
    }
}
