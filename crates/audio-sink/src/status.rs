use std::sync::atomic::{AtomicU64, Ordering};

use audio_sink_types::SinkStatus;

use crate::flow::FlowMode;

/// Cumulative counters updated by the producer entry point and the drain task.
#[derive(Debug, Default)]
pub struct SinkStats {
    /// Bytes admitted by `submit`.
    pub accepted_bytes: AtomicU64,
    /// Bytes rejected by `submit` (dropping, overflow, or stopped).
    pub dropped_bytes: AtomicU64,
    /// Bytes the transport accepted.
    pub delivered_bytes: AtomicU64,
    /// Drain task ran dry and went back to prefetching.
    pub underflow_events: AtomicU64,
    /// Producer entered dropping mode.
    pub overflow_events: AtomicU64,
    /// Drain task woken after prefetching.
    pub resume_events: AtomicU64,
    /// Transport writes that failed.
    pub transport_errors: AtomicU64,
}

/// Buffer-side values sampled for a status snapshot.
#[derive(Clone, Copy, Debug)]
pub struct BufferGauge {
    pub mode: FlowMode,
    pub occupied_bytes: usize,
    pub capacity_bytes: usize,
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub stopped: bool,
}

impl SinkStats {
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot suitable for logs and JSON output.
    pub fn snapshot(&self, gauge: BufferGauge, gain_db: f32) -> SinkStatus {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SinkStatus {
            mode: gauge.mode,
            occupied_bytes: gauge.occupied_bytes,
            capacity_bytes: gauge.capacity_bytes,
            high_watermark: gauge.high_watermark,
            low_watermark: gauge.low_watermark,
            gain_db,
            accepted_bytes: load(&self.accepted_bytes),
            dropped_bytes: load(&self.dropped_bytes),
            delivered_bytes: load(&self.delivered_bytes),
            underflow_events: load(&self.underflow_events),
            overflow_events: load(&self.overflow_events),
            resume_events: load(&self.resume_events),
            transport_errors: load(&self.transport_errors),
            stopped: gauge.stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge() -> BufferGauge {
        BufferGauge {
            mode: FlowMode::Processing,
            occupied_bytes: 4096,
            capacity_bytes: 32_768,
            high_watermark: 20_480,
            low_watermark: 10_240,
            stopped: false,
        }
    }

    #[test]
    fn snapshot_reports_counters() {
        let stats = SinkStats::default();
        SinkStats::add(&stats.accepted_bytes, 1000);
        SinkStats::add(&stats.accepted_bytes, 24);
        SinkStats::add(&stats.dropped_bytes, 12);
        SinkStats::bump(&stats.underflow_events);
        SinkStats::bump(&stats.transport_errors);

        let snap = stats.snapshot(gauge(), -3.0);
        assert_eq!(snap.accepted_bytes, 1024);
        assert_eq!(snap.dropped_bytes, 12);
        assert_eq!(snap.underflow_events, 1);
        assert_eq!(snap.transport_errors, 1);
        assert_eq!(snap.overflow_events, 0);
        assert_eq!(snap.gain_db, -3.0);
    }

    #[test]
    fn snapshot_includes_buffer_gauge() {
        let snap = SinkStats::default().snapshot(gauge(), 0.0);
        assert_eq!(snap.mode, FlowMode::Processing);
        assert_eq!(snap.occupied_bytes, 4096);
        assert_eq!(snap.capacity_bytes, 32_768);
        assert_eq!(snap.high_watermark, 20_480);
        assert_eq!(snap.low_watermark, 10_240);
        assert!(!snap.stopped);
    }
}
