use serde::{Deserialize, Serialize};

/// Flow-control mode of the buffered sink.
///
/// Exactly one mode is active at a time. The sink starts in [`FlowMode::Prefetching`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlowMode {
    /// Producer admits data and the drain task is writing to the output.
    Processing,
    /// Drain task is paused while the producer builds up a cushion.
    Prefetching,
    /// Producer discards new data while the drain task empties the buffer.
    Dropping,
}

impl FlowMode {
    /// Short label used in logs and status output.
    pub fn as_str(self) -> &'static str {
        match self {
            FlowMode::Processing => "processing",
            FlowMode::Prefetching => "prefetching",
            FlowMode::Dropping => "dropping",
        }
    }
}

impl std::fmt::Display for FlowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-way notification emitted by the sink or its controller.
///
/// Delivery is best effort; nothing in the sink waits on a consumer of these.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkEvent {
    /// The drain task found the buffer empty and went back to prefetching.
    Underflow,
    /// An enqueue failed; the producer is now dropping audio.
    OverflowEntered,
    /// Occupancy fell to the low watermark; the producer admits audio again.
    OverflowExited,
    /// The prefetch target was reached and the drain task was woken.
    Resumed,
    /// Upstream source is connecting.
    Connecting,
    /// Upstream source connected.
    Connected,
    /// Upstream source went away.
    Disconnected,
    /// Upstream reported playback started.
    Playing,
    /// Upstream reported playback paused.
    Paused,
    /// Gain setting changed.
    VolumeChanged { gain_db: f32 },
    /// Track title changed.
    TitleChanged { title: String },
    /// Something failed in a collaborator (transport, dispatcher).
    Error { message: String },
}

/// Point-in-time status of the buffered sink.
///
/// Counters are cumulative since the sink was started. Values are read without a global
/// lock, so fields may be mutually inconsistent by a chunk or two.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SinkStatus {
    /// Current flow-control mode.
    pub mode: FlowMode,
    /// Bytes buffered right now.
    pub occupied_bytes: usize,
    /// Ring buffer capacity in bytes.
    pub capacity_bytes: usize,
    /// Prefetch target in bytes.
    pub high_watermark: usize,
    /// Occupancy at which dropping ends.
    pub low_watermark: usize,
    /// Gain applied by the drain task, in dB.
    pub gain_db: f32,
    /// Bytes admitted by `submit`.
    pub accepted_bytes: u64,
    /// Bytes rejected by `submit`.
    pub dropped_bytes: u64,
    /// Bytes handed to the output transport successfully.
    pub delivered_bytes: u64,
    /// Times the drain task ran dry.
    pub underflow_events: u64,
    /// Times the producer entered dropping mode.
    pub overflow_events: u64,
    /// Times the drain task was woken after prefetching.
    pub resume_events: u64,
    /// Output writes that failed (chunk dropped).
    pub transport_errors: u64,
    /// `true` once the sink has been stopped.
    pub stopped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_mode_serializes_snake_case() {
        let json = serde_json::to_string(&FlowMode::Prefetching).unwrap();
        assert_eq!(json, "\"prefetching\"");
        let back: FlowMode = serde_json::from_str("\"dropping\"").unwrap();
        assert_eq!(back, FlowMode::Dropping);
    }

    #[test]
    fn sink_event_is_internally_tagged() {
        let json = serde_json::to_value(SinkEvent::VolumeChanged { gain_db: -6.0 }).unwrap();
        assert_eq!(json["kind"], "volume_changed");
        assert_eq!(json["gain_db"], -6.0);

        let json = serde_json::to_value(SinkEvent::Underflow).unwrap();
        assert_eq!(json["kind"], "underflow");
    }

    #[test]
    fn display_matches_label() {
        assert_eq!(FlowMode::Processing.to_string(), "processing");
        assert_eq!(FlowMode::Dropping.as_str(), "dropping");
    }
}
