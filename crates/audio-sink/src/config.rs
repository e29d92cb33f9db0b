use std::time::Duration;

use crate::error::SinkError;

/// Bytes per 16-bit PCM sample.
pub const SAMPLE_BYTES: usize = 2;

/// Buffering and pacing parameters for the sink.
///
/// All sizes are in **bytes** of interleaved little-endian 16-bit PCM.
#[derive(Clone, Debug)]
pub struct SinkConfig {
    /// Ring buffer capacity.
    pub capacity_bytes: usize,
    /// Prefetch target; reaching it while prefetching wakes the drain task.
    pub high_watermark: usize,
    /// Dropping ends once occupancy falls to or below this.
    pub low_watermark: usize,
    /// Largest chunk pulled by the drain task per write (hardware transfer size).
    pub max_chunk_bytes: usize,
    /// Width of one sample. Only 16-bit PCM is supported.
    pub sample_bytes: usize,
    /// Interleaved channel count.
    pub channels: usize,
    /// How long `enqueue` may wait for free space before rejecting.
    pub enqueue_timeout: Duration,
    /// How long the drain task waits for data before declaring an underflow.
    pub dequeue_timeout: Duration,
}

impl Default for SinkConfig {
    /// 32 KiB ring with a 20 KiB prefetch target, sized for 44.1 kHz stereo.
    fn default() -> Self {
        Self {
            capacity_bytes: 32 * 1024,
            high_watermark: 20 * 1024,
            low_watermark: 10 * 1024,
            max_chunk_bytes: 240 * 6,
            sample_bytes: SAMPLE_BYTES,
            channels: 2,
            enqueue_timeout: Duration::ZERO,
            dequeue_timeout: Duration::from_millis(20),
        }
    }
}

impl SinkConfig {
    /// Size of one interleaved frame in bytes.
    pub fn frame_bytes(&self) -> usize {
        self.sample_bytes * self.channels
    }

    /// Largest number of samples the drain task handles at once.
    pub fn max_chunk_samples(&self) -> usize {
        self.max_chunk_bytes / self.sample_bytes.max(1)
    }

    /// Check construction-time invariants.
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.sample_bytes != SAMPLE_BYTES {
            return Err(SinkError::InvalidConfig(format!(
                "sample_bytes must be {SAMPLE_BYTES}, got {}",
                self.sample_bytes
            )));
        }
        if self.channels == 0 {
            return Err(SinkError::InvalidConfig("channels must be >= 1".into()));
        }
        if self.capacity_bytes == 0 {
            return Err(SinkError::InvalidConfig("capacity_bytes must be > 0".into()));
        }
        if self.low_watermark == 0 || self.low_watermark >= self.high_watermark {
            return Err(SinkError::InvalidConfig(format!(
                "low_watermark ({}) must be in 1..high_watermark ({})",
                self.low_watermark, self.high_watermark
            )));
        }
        if self.high_watermark > self.capacity_bytes {
            return Err(SinkError::InvalidConfig(format!(
                "high_watermark ({}) exceeds capacity ({})",
                self.high_watermark, self.capacity_bytes
            )));
        }
        let frame = self.frame_bytes();
        if self.max_chunk_bytes == 0
            || self.max_chunk_bytes > self.capacity_bytes
            || self.max_chunk_bytes % frame != 0
        {
            return Err(SinkError::InvalidConfig(format!(
                "max_chunk_bytes ({}) must be a non-zero multiple of the frame size ({frame}) \
                 no larger than capacity ({})",
                self.max_chunk_bytes, self.capacity_bytes
            )));
        }
        Ok(())
    }

    /// Derive capacity and watermarks that hold `seconds` of audio.
    ///
    /// Keeps the default proportions (high = 5/8, low = 5/16 of capacity) and rounds every
    /// threshold down to a whole frame. Non-finite or non-positive `seconds` falls back to 0.2s.
    pub fn scaled_to(mut self, sample_rate: u32, channels: usize, seconds: f32) -> Self {
        let secs = if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            0.2
        };
        self.channels = channels.max(1);
        let frame = self.frame_bytes();
        let frames = (sample_rate as f32 * secs).ceil() as usize;
        let capacity = frames.saturating_mul(frame).max(self.max_chunk_bytes);
        let align = |v: usize| (v / frame).max(1) * frame;
        self.capacity_bytes = align(capacity);
        self.high_watermark = align(self.capacity_bytes * 5 / 8);
        self.low_watermark = align(self.capacity_bytes * 5 / 16);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = SinkConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.capacity_bytes, 32_768);
        assert_eq!(cfg.high_watermark, 20_480);
        assert_eq!(cfg.low_watermark, 10_240);
        assert_eq!(cfg.max_chunk_samples(), 720);
    }

    #[test]
    fn odd_chunk_size_is_rejected() {
        let cfg = SinkConfig {
            max_chunk_bytes: 1441,
            ..SinkConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(SinkError::InvalidConfig(_))));
    }

    #[test]
    fn chunk_must_align_to_frames() {
        let cfg = SinkConfig {
            max_chunk_bytes: 1442,
            channels: 2,
            ..SinkConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn watermarks_must_have_hysteresis() {
        let cfg = SinkConfig {
            low_watermark: 20_480,
            ..SinkConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = SinkConfig {
            high_watermark: 40_000,
            ..SinkConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn only_16_bit_samples() {
        let cfg = SinkConfig {
            sample_bytes: 4,
            ..SinkConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn scaled_to_keeps_frame_alignment() {
        let cfg = SinkConfig::default().scaled_to(48_000, 2, 0.5);
        cfg.validate().unwrap();
        assert_eq!(cfg.capacity_bytes, 96_000);
        assert_eq!(cfg.high_watermark % 4, 0);
        assert_eq!(cfg.low_watermark % 4, 0);
        assert!(cfg.low_watermark < cfg.high_watermark);
    }

    #[test]
    fn scaled_to_falls_back_on_bad_seconds() {
        let a = SinkConfig::default().scaled_to(44_100, 2, f32::NAN);
        let b = SinkConfig::default().scaled_to(44_100, 2, 0.2);
        assert_eq!(a.capacity_bytes, b.capacity_bytes);
    }
}
