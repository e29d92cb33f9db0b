use std::time::Duration;

use audio_sink::SinkConfig;
use audio_sink::playback::OutputConfig;

use crate::cli::{Args, OutputKind};

/// Settings shared by every run mode, derived from the command line.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub sink: SinkConfig,
    pub output: OutputKind,
    pub output_config: OutputConfig,
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub gain_db: f32,
    pub status_interval: Option<Duration>,
}

impl BridgeConfig {
    pub fn from_args(args: &Args) -> Self {
        let sink = SinkConfig {
            capacity_bytes: args.capacity_bytes,
            high_watermark: args.high_watermark,
            low_watermark: args.low_watermark,
            max_chunk_bytes: args.chunk_bytes,
            channels: args.channels as usize,
            enqueue_timeout: Duration::from_millis(args.enqueue_timeout_ms),
            dequeue_timeout: Duration::from_millis(args.dequeue_timeout_ms),
            ..SinkConfig::default()
        };
        let sink = match args.buffer_seconds {
            Some(secs) => sink.scaled_to(args.sample_rate, args.channels as usize, secs),
            None => sink,
        };

        Self {
            sink,
            output: args.output,
            output_config: OutputConfig {
                dma_blocks: args.dma_blocks,
                write_timeout: Duration::from_millis(args.write_timeout_ms),
            },
            device: normalize_device_name(args.device.clone()),
            sample_rate: args.sample_rate,
            channels: args.channels,
            gain_db: args.gain_db,
            status_interval: match args.status_interval_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_match_sink_defaults() {
        let args = Args::parse_from(["sink-bridge", "tone"]);
        let cfg = BridgeConfig::from_args(&args);
        let def = SinkConfig::default();
        assert_eq!(cfg.sink.capacity_bytes, def.capacity_bytes);
        assert_eq!(cfg.sink.high_watermark, def.high_watermark);
        assert_eq!(cfg.sink.low_watermark, def.low_watermark);
        assert_eq!(cfg.sink.max_chunk_bytes, def.max_chunk_bytes);
        assert_eq!(cfg.sink.dequeue_timeout, def.dequeue_timeout);
        assert_eq!(cfg.output, OutputKind::Cpal);
        assert_eq!(cfg.status_interval, Some(Duration::from_secs(2)));
        cfg.sink.validate().unwrap();
    }

    #[test]
    fn buffer_seconds_overrides_sizes() {
        let args = Args::parse_from([
            "sink-bridge",
            "--buffer-seconds",
            "1",
            "--sample-rate",
            "48000",
            "stdin",
        ]);
        let cfg = BridgeConfig::from_args(&args);
        assert_eq!(cfg.sink.capacity_bytes, 192_000);
        cfg.sink.validate().unwrap();
    }

    #[test]
    fn negative_gain_and_null_output_parse() {
        let args = Args::parse_from([
            "sink-bridge",
            "--gain-db",
            "-12.5",
            "--output",
            "null",
            "--status-interval-ms",
            "0",
            "tone",
        ]);
        let cfg = BridgeConfig::from_args(&args);
        assert_eq!(cfg.gain_db, -12.5);
        assert_eq!(cfg.output, OutputKind::Null);
        assert_eq!(cfg.status_interval, None);
    }

    #[test]
    fn normalize_device_name_trims_and_drops_empty() {
        assert_eq!(normalize_device_name(None), None);
        assert_eq!(normalize_device_name(Some("  ".to_string())), None);
        assert_eq!(
            normalize_device_name(Some("  USB DAC ".to_string())),
            Some("USB DAC".to_string())
        );
    }
}
