//! Sink Bridge — feeds raw PCM (stdin or a generated tone) through the buffered audio sink and
//! plays it on a CPAL output device.
//!
//! ## Pipeline
//! 1. **Produce**: the main thread reads/generates PCM and calls `AudioSink::submit` in bursts.
//! 2. **Buffer**: the sink prefetches, then admits or drops according to its flow control.
//! 3. **Drain**: the sink's drain thread applies gain and writes hardware-sized blocks to the
//!    device callback's queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use clap::Parser;
use sink_bridge::{cli, config::BridgeConfig, runtime};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,sink_bridge=info,audio_sink=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }
    let Some(cmd) = args.cmd.as_ref() else {
        bail!("no input given; use `stdin` or `tone` (see --help)");
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            tracing::warn!("ctrl-c handler not installed: {e}");
        }
    }

    let config = BridgeConfig::from_args(&args);
    let status = runtime::run(&config, cmd, stop)?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
