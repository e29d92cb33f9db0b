//! Upstream PCM producers feeding the sink.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use audio_sink::AudioSink;

/// Totals for one producer run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub submitted: u64,
    pub accepted: u64,
}

impl PumpStats {
    fn record(&mut self, submitted: usize, accepted: usize) {
        self.submitted += submitted as u64;
        self.accepted += accepted as u64;
    }
}

/// Submit everything `reader` yields, in bursts of up to `burst_bytes`, until EOF or `stop`.
pub fn pump_reader<R: Read>(
    mut reader: R,
    sink: &AudioSink,
    burst_bytes: usize,
    stop: &AtomicBool,
) -> Result<PumpStats> {
    let mut buf = vec![0u8; burst_bytes.max(2)];
    let mut stats = PumpStats::default();
    while !stop.load(Ordering::Relaxed) {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("read pcm input"),
        };
        let accepted = sink.submit(&buf[..n]);
        stats.record(n, accepted);
    }
    Ok(stats)
}

/// Interleaved sine generator producing little-endian s16.
pub struct ToneSource {
    step: f32,
    phase: f32,
    amplitude: f32,
    channels: usize,
}

impl ToneSource {
    pub fn new(freq: f32, amplitude: f32, sample_rate: u32, channels: usize) -> Self {
        Self {
            step: std::f32::consts::TAU * freq / sample_rate.max(1) as f32,
            phase: 0.0,
            amplitude: amplitude.clamp(0.0, 1.0),
            channels: channels.max(1),
        }
    }

    /// Replace `out` with `frames` frames of audio.
    pub fn fill(&mut self, out: &mut Vec<u8>, frames: usize) {
        out.clear();
        for _ in 0..frames {
            let v = (self.phase.sin() * self.amplitude * i16::MAX as f32) as i16;
            for _ in 0..self.channels {
                out.extend_from_slice(&v.to_le_bytes());
            }
            self.phase = (self.phase + self.step) % std::f32::consts::TAU;
        }
    }
}

/// Submit `seconds` of tone in real time, one burst every `burst`.
pub fn pump_tone(
    mut tone: ToneSource,
    sink: &AudioSink,
    sample_rate: u32,
    seconds: f32,
    burst: Duration,
    stop: &AtomicBool,
) -> PumpStats {
    let burst = burst.max(Duration::from_millis(1));
    let frames_per_burst = ((sample_rate as f64 * burst.as_secs_f64()).round() as usize).max(1);
    let total_frames = (sample_rate as f64 * seconds.max(0.0) as f64) as usize;

    let mut stats = PumpStats::default();
    let mut buf = Vec::new();
    let mut sent = 0usize;
    let mut due = Instant::now();
    while sent < total_frames && !stop.load(Ordering::Relaxed) {
        let frames = frames_per_burst.min(total_frames - sent);
        tone.fill(&mut buf, frames);
        let accepted = sink.submit(&buf);
        stats.record(buf.len(), accepted);
        sent += frames;

        due += burst;
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }
    stats
}
