//! Drain task: paces buffered audio out to the transport.
//!
//! Runs on its own thread for the sink's lifetime:
//! 1. park on the resume signal
//! 2. pull up to `max_chunk_bytes`, apply gain, write to the transport
//! 3. on an empty dequeue, fall back to prefetching and park again
//!
//! The transport write is the only pacing; there is no sleep in this loop.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::config::SAMPLE_BYTES;
use crate::error::SinkError;
use crate::gain::{GainSetting, GainStage};
use crate::notify::{StatusNotifier, event_for};
use crate::queue::{SharedRing, UnderflowCheck};
use crate::signal::{ResumeSignal, Wake};
use crate::status::SinkStats;
use crate::transport::OutputTransport;

/// Everything the drain task shares with the rest of the sink.
pub(crate) struct DrainContext {
    pub shared: Arc<SharedRing>,
    pub resume: ResumeSignal,
    pub stop: Receiver<()>,
    pub gain: GainSetting,
    pub stats: Arc<SinkStats>,
    pub notifier: Arc<dyn StatusNotifier>,
    pub max_chunk_bytes: usize,
    pub dequeue_timeout: Duration,
}

pub(crate) fn spawn_drain<T>(ctx: DrainContext, transport: T) -> Result<JoinHandle<()>, SinkError>
where
    T: OutputTransport + 'static,
{
    let handle = std::thread::Builder::new()
        .name("sink-drain".to_string())
        .spawn(move || run_drain(ctx, transport))?;
    Ok(handle)
}

fn run_drain<T: OutputTransport>(ctx: DrainContext, mut transport: T) {
    // Allocated once; the loop below never allocates.
    let mut chunk = vec![0u8; ctx.max_chunk_bytes];
    let mut stage = GainStage::new(ctx.max_chunk_bytes / SAMPLE_BYTES);
    tracing::info!(max_chunk_bytes = ctx.max_chunk_bytes, "drain task started");

    loop {
        if ctx.resume.wait(&ctx.stop) == Wake::Stop || ctx.shared.is_closed() {
            break;
        }
        tracing::debug!(occupied = ctx.shared.occupied_bytes(), "drain resumed");
        if !drain_until_underflow(&ctx, &mut transport, &mut chunk, &mut stage) {
            break;
        }
    }

    tracing::info!("drain task stopped");
}

/// Drain until the ring runs dry. Returns `false` if the sink is shutting down.
fn drain_until_underflow<T: OutputTransport>(
    ctx: &DrainContext,
    transport: &mut T,
    chunk: &mut [u8],
    stage: &mut GainStage,
) -> bool {
    loop {
        if ctx.shared.is_closed() {
            return false;
        }

        let n = ctx.shared.dequeue_up_to(chunk, ctx.dequeue_timeout);
        if n == 0 {
            match ctx.shared.underflow() {
                UnderflowCheck::Refilled => continue,
                UnderflowCheck::Park { transition } => {
                    if let Some(t) = transition {
                        SinkStats::bump(&ctx.stats.underflow_events);
                        tracing::info!(from = %t.from, to = %t.to, "ring buffer underflow");
                        ctx.notifier.notify(&event_for(t));
                    }
                    return !ctx.shared.is_closed();
                }
            }
        }

        let data = &mut chunk[..n];
        let gain_db = ctx.gain.db();
        stage.process(data, gain_db);
        tracing::trace!(bytes = n, gain_db, "chunk out");

        match transport.write(data) {
            Ok(()) => SinkStats::add(&ctx.stats.delivered_bytes, n),
            Err(e) => {
                SinkStats::bump(&ctx.stats.transport_errors);
                tracing::warn!(bytes = n, "transport write failed; chunk dropped: {e:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowMode;
    use crate::notify::NoopNotifier;
    use anyhow::anyhow;
    use crossbeam_channel::bounded;
    use std::sync::atomic::Ordering;

    struct FailingTransport;

    impl OutputTransport for FailingTransport {
        fn write(&mut self, _bytes: &[u8]) -> anyhow::Result<()> {
            Err(anyhow!("device gone"))
        }
    }

    fn context(shared: Arc<SharedRing>, resume: ResumeSignal, stop: Receiver<()>) -> DrainContext {
        DrainContext {
            shared,
            resume,
            stop,
            gain: GainSetting::default(),
            stats: Arc::new(SinkStats::default()),
            notifier: Arc::new(NoopNotifier),
            max_chunk_bytes: 8,
            dequeue_timeout: Duration::from_millis(5),
        }
    }

    #[test]
    fn failed_writes_are_counted_and_dropped() {
        let shared = Arc::new(SharedRing::new(64, 32, 16, 2).unwrap());
        let resume = ResumeSignal::new();
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let ctx = context(shared.clone(), resume.clone(), stop_rx);
        let stats = ctx.stats.clone();

        let handle = spawn_drain(ctx, FailingTransport).unwrap();
        shared.admit(&[0u8; 32], Duration::ZERO);
        resume.give();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while shared.mode() != FlowMode::Prefetching || shared.occupied_bytes() != 0 {
            assert!(std::time::Instant::now() < deadline, "drain did not empty the ring");
            std::thread::sleep(Duration::from_millis(2));
        }
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(stats.transport_errors.load(Ordering::Relaxed), 4);
        assert_eq!(stats.delivered_bytes.load(Ordering::Relaxed), 0);
        assert_eq!(stats.underflow_events.load(Ordering::Relaxed), 1);

        shared.close();
        drop(stop_tx);
        handle.join().unwrap();
    }

    #[test]
    fn stops_while_parked() {
        let shared = Arc::new(SharedRing::new(64, 32, 16, 2).unwrap());
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = spawn_drain(context(shared, ResumeSignal::new(), stop_rx), FailingTransport)
            .unwrap();
        drop(stop_tx);
        handle.join().unwrap();
    }
}
