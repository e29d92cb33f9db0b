//! CPAL output stage.
//!
//! Builds the CPAL output stream and the matching [`CpalTransport`]. The drain task writes
//! 16-bit blocks into a small bounded channel (the "DMA ring"); the real-time callback:
//! - pulls the next block without blocking
//! - converts `i16` samples to the device sample format
//! - fills silence on underrun and counts it
//!
//! Because the channel is bounded, [`CpalTransport::write`] blocks while the device is busy,
//! which is what paces the drain task. Played-out blocks travel back on a second channel and
//! are refilled, so steady-state playback does not allocate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};

use crate::transport::OutputTransport;

/// Configuration for the output stage.
#[derive(Clone, Debug)]
pub struct OutputConfig {
    /// Blocks the device-side channel can hold before `write` blocks.
    pub dma_blocks: usize,
    /// Longest a single `write` may wait for the device.
    pub write_timeout: Duration,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dma_blocks: 4,
            write_timeout: Duration::from_millis(500),
        }
    }
}

/// Counters updated by the output callback.
#[derive(Debug, Default)]
pub struct OutputCounters {
    /// Frames written to the device.
    pub played_frames: AtomicU64,
    /// Frames of silence emitted because no block was ready.
    pub underrun_frames: AtomicU64,
    /// Callbacks that ran out of audio.
    pub underrun_events: AtomicU64,
}

/// Owns the CPAL stream. Keep it alive (on the thread that created it) while playing.
pub struct CpalOutput {
    stream: cpal::Stream,
    counters: Arc<OutputCounters>,
}

impl CpalOutput {
    pub fn play(&self) -> Result<()> {
        self.stream.play()?;
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.stream.pause()?;
        Ok(())
    }

    pub fn counters(&self) -> Arc<OutputCounters> {
        self.counters.clone()
    }
}

/// Transport half handed to the sink's drain task.
pub struct CpalTransport {
    tx: Sender<Vec<i16>>,
    recycled: Receiver<Vec<i16>>,
    write_timeout: Duration,
}

impl OutputTransport for CpalTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut block = self.recycled.try_recv().unwrap_or_default();
        fill_from_le_bytes(&mut block, bytes);
        match self.tx.send_timeout(block, self.write_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(anyhow!(
                "output device did not accept block within {:?}",
                self.write_timeout
            )),
            Err(SendTimeoutError::Disconnected(_)) => Err(anyhow!("output stream closed")),
        }
    }
}

/// Build a CPAL output stream and its transport.
///
/// The sink's interleaved channel count must equal `config.channels`.
pub fn open_output(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    out: OutputConfig,
) -> Result<(CpalOutput, CpalTransport)> {
    let (transport, feed) = block_channel(&out);
    let counters = Arc::new(OutputCounters::default());
    let stream = match sample_format {
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, feed, counters.clone()),
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, feed, counters.clone()),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, feed, counters.clone()),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, feed, counters.clone()),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }?;
    Ok((CpalOutput { stream, counters }, transport))
}

/// Connect a transport to a callback-side feed.
///
/// Every block in circulation is either queued for the device, held by one side, or waiting in
/// the recycle channel, so that channel never fills and the callback never frees a block.
fn block_channel(out: &OutputConfig) -> (CpalTransport, BlockFeed) {
    let depth = out.dma_blocks.max(1);
    let (tx, rx) = bounded::<Vec<i16>>(depth);
    let (recycle_tx, recycled) = bounded::<Vec<i16>>(depth + 2);
    (
        CpalTransport {
            tx,
            recycled,
            write_timeout: out.write_timeout,
        },
        BlockFeed::new(rx, recycle_tx),
    )
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut feed: BlockFeed,
    counters: Arc<OutputCounters>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<i16>,
{
    let channels = (config.channels as usize).max(1);
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let filled = feed.fill(data, |s| <T as cpal::Sample>::from_sample::<i16>(s));
            if filled < data.len() {
                counters.underrun_events.fetch_add(1, Ordering::Relaxed);
                counters
                    .underrun_frames
                    .fetch_add(((data.len() - filled) / channels) as u64, Ordering::Relaxed);
            }
            counters
                .played_frames
                .fetch_add((filled / channels) as u64, Ordering::Relaxed);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Callback-side cursor over blocks arriving from the transport.
struct BlockFeed {
    rx: Receiver<Vec<i16>>,
    recycle: Sender<Vec<i16>>,
    block: Vec<i16>,
    pos: usize,
}

impl BlockFeed {
    fn new(rx: Receiver<Vec<i16>>, recycle: Sender<Vec<i16>>) -> Self {
        Self {
            rx,
            recycle,
            block: Vec::new(),
            pos: 0,
        }
    }

    /// Fill `out` from queued blocks, padding with silence once they run out.
    ///
    /// Returns how many slots received real samples. Never blocks.
    fn fill<T: Copy>(&mut self, out: &mut [T], convert: impl Fn(i16) -> T) -> usize {
        let mut written = 0;
        while written < out.len() {
            if self.pos >= self.block.len() {
                if self.block.capacity() > 0 {
                    let _ = self.recycle.try_send(std::mem::take(&mut self.block));
                }
                match self.rx.try_recv() {
                    Ok(block) => {
                        self.block = block;
                        self.pos = 0;
                        continue;
                    }
                    Err(_) => break,
                }
            }
            let n = (self.block.len() - self.pos).min(out.len() - written);
            for (dst, src) in out[written..written + n]
                .iter_mut()
                .zip(&self.block[self.pos..self.pos + n])
            {
                *dst = convert(*src);
            }
            self.pos += n;
            written += n;
        }
        let silence = convert(0);
        out[written..].fill(silence);
        written
    }
}

/// Replace the contents of `block` with the samples in `bytes`, reusing its allocation.
fn fill_from_le_bytes(block: &mut Vec<i16>, bytes: &[u8]) {
    block.clear();
    block.extend(
        bytes
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]])),
    );
}
