//! Bridge runtime: wires a PCM source, the buffered sink, and an output together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use audio_sink::dispatch::{ControlEvent, SinkController, WorkDispatcher};
use audio_sink::notify::{LogNotifier, StatusNotifier};
use audio_sink::playback::{self, CpalOutput};
use audio_sink::transport::{NullTransport, PacedTransport};
use audio_sink::{AudioSink, FlowMode, GainSetting, device};
use audio_sink_types::SinkStatus;
use cpal::traits::DeviceTrait;
use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::cli::{Command, OutputKind};
use crate::config::BridgeConfig;
use crate::source::{self, ToneSource};

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Run one producer session to completion (or until `stop`) and return the final status.
pub fn run(config: &BridgeConfig, cmd: &Command, stop: Arc<AtomicBool>) -> Result<SinkStatus> {
    let notifier: Arc<dyn StatusNotifier> = Arc::new(LogNotifier);
    let gain = GainSetting::new(config.gain_db);
    let dispatcher = WorkDispatcher::start(SinkController::new(gain.clone(), notifier.clone()))?;
    dispatcher.dispatch(ControlEvent::Connecting);

    let (sink, output) = start_sink(config, gain, notifier)?;
    let sink = Arc::new(sink);
    let reporter = config
        .status_interval
        .map(|every| spawn_status_reporter(sink.clone(), every))
        .transpose()?;

    dispatcher.dispatch(ControlEvent::Connected);
    let result = feed(config, cmd, &sink, &dispatcher, &stop);
    wait_for_drain(&sink, config, &stop);
    dispatcher.dispatch(ControlEvent::Pause);
    if let Some(output) = &output {
        if let Err(e) = output.pause() {
            tracing::warn!("pause output stream: {e:#}");
        }
    }
    dispatcher.dispatch(ControlEvent::Disconnected);

    sink.stop();
    if let Some(reporter) = reporter {
        stop_status_reporter(reporter);
    }
    dispatcher.stop();

    if let Some(output) = &output {
        let counters = output.counters();
        tracing::info!(
            played_frames = counters.played_frames.load(Ordering::Relaxed),
            underrun_frames = counters.underrun_frames.load(Ordering::Relaxed),
            underrun_events = counters.underrun_events.load(Ordering::Relaxed),
            "output device totals"
        );
    }
    drop(output);

    result?;
    Ok(sink.status())
}

fn start_sink(
    config: &BridgeConfig,
    gain: GainSetting,
    notifier: Arc<dyn StatusNotifier>,
) -> Result<(AudioSink, Option<CpalOutput>)> {
    let sink_config = config.sink.clone();
    match config.output {
        OutputKind::Cpal => {
            let (output, transport) = open_cpal(config)?;
            let sink = AudioSink::start(sink_config, transport, gain, notifier)?;
            output.play().context("start output stream")?;
            Ok((sink, Some(output)))
        }
        OutputKind::Paced => {
            let transport = PacedTransport::new(config.sample_rate, config.channels as usize);
            Ok((AudioSink::start(sink_config, transport, gain, notifier)?, None))
        }
        OutputKind::Null => {
            let sink = AudioSink::start(sink_config, NullTransport::default(), gain, notifier)?;
            Ok((sink, None))
        }
    }
}

fn open_cpal(config: &BridgeConfig) -> Result<(CpalOutput, playback::CpalTransport)> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, config.device.as_deref())?;
    tracing::info!(device = %device.description()?, "output device");

    let supported = device::pick_output_config(&device, config.sample_rate, config.channels)?;
    let mut stream_config = supported.config();
    let chunk_frames = (config.sink.max_chunk_bytes / config.sink.frame_bytes()) as u32;
    if let Some(buf) = device::pick_buffer_size(&supported, chunk_frames) {
        stream_config.buffer_size = buf;
    }
    if stream_config.sample_rate != config.sample_rate {
        tracing::warn!(
            requested_hz = config.sample_rate,
            device_hz = stream_config.sample_rate,
            "device does not support the stream rate; playback speed will be off"
        );
    }
    tracing::info!(
        rate_hz = stream_config.sample_rate,
        channels = stream_config.channels,
        buffer_size = ?stream_config.buffer_size,
        sample_format = ?supported.sample_format(),
        "device output config"
    );

    playback::open_output(
        &device,
        &stream_config,
        supported.sample_format(),
        config.output_config.clone(),
    )
}

fn feed(
    config: &BridgeConfig,
    cmd: &Command,
    sink: &AudioSink,
    dispatcher: &WorkDispatcher,
    stop: &AtomicBool,
) -> Result<()> {
    let stats = match cmd {
        Command::Stdin { burst_bytes } => {
            dispatcher.dispatch(ControlEvent::SetTitle("stdin".to_string()));
            dispatcher.dispatch(ControlEvent::Play);
            source::pump_reader(std::io::stdin().lock(), sink, *burst_bytes, stop)?
        }
        Command::Tone {
            freq,
            seconds,
            amplitude,
            burst_ms,
        } => {
            dispatcher.dispatch(ControlEvent::SetTitle(format!("tone {freq} Hz")));
            dispatcher.dispatch(ControlEvent::Play);
            let tone = ToneSource::new(
                *freq,
                *amplitude,
                config.sample_rate,
                config.channels as usize,
            );
            source::pump_tone(
                tone,
                sink,
                config.sample_rate,
                *seconds,
                Duration::from_millis(*burst_ms),
                stop,
            )
        }
    };
    tracing::info!(
        submitted = stats.submitted,
        accepted = stats.accepted,
        lost = stats.submitted - stats.accepted,
        "input finished"
    );
    Ok(())
}

/// Let buffered audio play out. A tail shorter than the prefetch target never starts playing
/// and is discarded at stop.
fn wait_for_drain(sink: &AudioSink, config: &BridgeConfig, stop: &AtomicBool) {
    let bytes_per_sec = config.sample_rate as u64 * config.sink.frame_bytes() as u64;
    let budget_ms = (config.sink.capacity_bytes as u64 * 1000) / bytes_per_sec.max(1) + 1000;
    let deadline = Instant::now() + Duration::from_millis(budget_ms);
    while !stop.load(Ordering::Relaxed) && Instant::now() < deadline {
        if sink.mode() == FlowMode::Prefetching {
            let left = sink.occupied_bytes();
            if left > 0 {
                tracing::debug!(bytes = left, "discarding tail below prefetch target");
            }
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn spawn_status_reporter(
    sink: Arc<AudioSink>,
    every: Duration,
) -> Result<(Sender<()>, JoinHandle<()>)> {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
    let join = std::thread::Builder::new()
        .name("sink-status".to_string())
        .spawn(move || {
            loop {
                match stop_rx.recv_timeout(every) {
                    Err(RecvTimeoutError::Timeout) => {
                        let s = sink.status();
                        tracing::info!(
                            mode = %s.mode,
                            occupied = s.occupied_bytes,
                            delivered = s.delivered_bytes,
                            dropped = s.dropped_bytes,
                            underflows = s.underflow_events,
                            overflows = s.overflow_events,
                            gain_db = s.gain_db,
                            "sink status"
                        );
                    }
                    _ => break,
                }
            }
        })
        .context("spawn status reporter")?;
    Ok((stop_tx, join))
}

/// Stop and join the reporter. Returns `false` if it had panicked.
fn stop_status_reporter((stop_tx, join): (Sender<()>, JoinHandle<()>)) -> bool {
    drop(stop_tx);
    if join.join().is_err() {
        tracing::error!("status reporter panicked");
        return false;
    }
    true
}
