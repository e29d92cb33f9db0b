//! Fire-and-forget status notifications (display/logging collaborators).

use crossbeam_channel::{Sender, TrySendError};

pub use audio_sink_types::SinkEvent;

use crate::flow::{FlowMode, Transition};

/// Receiver of sink status events. Must not block.
pub trait StatusNotifier: Send + Sync {
    fn notify(&self, event: &SinkEvent);
}

/// Notifier that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl StatusNotifier for NoopNotifier {
    fn notify(&self, _event: &SinkEvent) {}
}

/// Writes every event to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl StatusNotifier for LogNotifier {
    fn notify(&self, event: &SinkEvent) {
        match event {
            SinkEvent::Underflow => tracing::info!("buffer underflow; prefetching"),
            SinkEvent::OverflowEntered => tracing::warn!("buffer overflow; dropping input"),
            SinkEvent::OverflowExited => tracing::info!("buffer drained; accepting input"),
            SinkEvent::Resumed => tracing::info!("prefetch complete; output resumed"),
            SinkEvent::Connecting => tracing::info!("connecting"),
            SinkEvent::Connected => tracing::info!("connected"),
            SinkEvent::Disconnected => tracing::info!("disconnected"),
            SinkEvent::Playing => tracing::info!("playing"),
            SinkEvent::Paused => tracing::info!("paused"),
            SinkEvent::VolumeChanged { gain_db } => tracing::info!(gain_db, "volume changed"),
            SinkEvent::TitleChanged { title } => tracing::info!(%title, "title changed"),
            SinkEvent::Error { message } => tracing::error!(%message, "sink error"),
        }
    }
}

/// Forwards events into a channel, dropping them when the channel is full.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: Sender<SinkEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<SinkEvent>) -> Self {
        Self { tx }
    }
}

impl StatusNotifier for ChannelNotifier {
    fn notify(&self, event: &SinkEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => tracing::trace!("status channel full; event dropped"),
        }
    }
}

/// Event announced for a flow-control transition.
pub fn event_for(transition: Transition) -> SinkEvent {
    match (transition.from, transition.to) {
        (_, FlowMode::Dropping) => SinkEvent::OverflowEntered,
        (FlowMode::Dropping, FlowMode::Processing) => SinkEvent::OverflowExited,
        (_, FlowMode::Prefetching) => SinkEvent::Underflow,
        (_, FlowMode::Processing) => SinkEvent::Resumed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(from: FlowMode, to: FlowMode) -> Transition {
        Transition { from, to }
    }

    #[test]
    fn transitions_map_to_events() {
        use FlowMode::*;
        assert_eq!(event_for(t(Processing, Dropping)), SinkEvent::OverflowEntered);
        assert_eq!(event_for(t(Dropping, Processing)), SinkEvent::OverflowExited);
        assert_eq!(event_for(t(Processing, Prefetching)), SinkEvent::Underflow);
        assert_eq!(event_for(t(Dropping, Prefetching)), SinkEvent::Underflow);
        assert_eq!(event_for(t(Prefetching, Processing)), SinkEvent::Resumed);
    }

    #[test]
    fn channel_notifier_never_blocks() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let n = ChannelNotifier::new(tx);
        n.notify(&SinkEvent::Connected);
        n.notify(&SinkEvent::Paused);
        assert_eq!(rx.try_recv().unwrap(), SinkEvent::Connected);
        assert!(rx.try_recv().is_err());
        drop(rx);
        n.notify(&SinkEvent::Underflow);
    }
}
