//! Output transport seam used by the drain task.
//!
//! A transport accepts one chunk of little-endian 16-bit PCM at a time and may block until the
//! device has room; that blocking is what paces the drain loop.

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use crossbeam_channel::Sender;

/// Destination for processed sample chunks.
pub trait OutputTransport: Send {
    /// Write one chunk. An error drops the chunk; the caller does not retry.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

impl<T: OutputTransport + ?Sized> OutputTransport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }
}

/// Discards everything while counting bytes.
#[derive(Debug, Default)]
pub struct NullTransport {
    written: u64,
}

impl NullTransport {
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl OutputTransport for NullTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.written += bytes.len() as u64;
        Ok(())
    }
}

/// Discards audio at real-time speed, emulating a DMA-paced device.
///
/// Each write sleeps until the device clock would have consumed the previous chunks. The clock
/// restarts after an idle gap so a paused stream does not build up credit.
pub struct PacedTransport {
    bytes_per_sec: f64,
    next_due: Option<Instant>,
}

impl PacedTransport {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let bytes_per_sec = sample_rate as f64 * channels.max(1) as f64 * 2.0;
        Self {
            bytes_per_sec: bytes_per_sec.max(1.0),
            next_due: None,
        }
    }

    fn chunk_duration(&self, len: usize) -> Duration {
        Duration::from_secs_f64(len as f64 / self.bytes_per_sec)
    }
}

impl OutputTransport for PacedTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let now = Instant::now();
        let start = match self.next_due {
            Some(due) if due > now => {
                std::thread::sleep(due - now);
                due
            }
            _ => now,
        };
        self.next_due = Some(start + self.chunk_duration(bytes.len()));
        Ok(())
    }
}

/// Forwards a copy of every chunk into a channel.
///
/// With a bounded channel the write blocks while the receiver lags, like a real device.
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
}

impl ChannelTransport {
    pub fn new(tx: Sender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl OutputTransport for ChannelTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| anyhow!("output channel disconnected"))
    }
}
