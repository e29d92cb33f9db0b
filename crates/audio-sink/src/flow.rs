//! Three-mode backpressure state machine.
//!
//! ```text
//!              enqueue fails                 occupancy <= low
//! Processing ────────────────▶ Dropping ─────────────────────▶ Processing
//! Processing ────────────────▶ Prefetching ──────────────────▶ Processing (+ resume drain)
//!              dequeue empty                 occupancy >= high
//!
//! Prefetching ── enqueue fails ──▶ Dropping (+ resume drain)
//! ```
//!
//! The machine is pure: callers pass in occupancy snapshots taken under the same lock that
//! guards the mode.

pub use audio_sink_types::FlowMode;

/// A mode change produced by one of the `on_*` hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: FlowMode,
    pub to: FlowMode,
}

impl Transition {
    /// Whether this transition must wake the drain task.
    ///
    /// Leaving prefetching for dropping counts too: the ring filled before the prefetch target
    /// was met, and only the drain task can bring occupancy back down.
    pub fn resumes_drain(&self) -> bool {
        self.from == FlowMode::Prefetching && self.to != FlowMode::Prefetching
    }
}

#[derive(Debug)]
pub struct FlowControl {
    mode: FlowMode,
    high_watermark: usize,
    low_watermark: usize,
}

impl FlowControl {
    /// Start in [`FlowMode::Prefetching`]: nothing drains until a cushion exists.
    pub fn new(high_watermark: usize, low_watermark: usize) -> Self {
        debug_assert!(low_watermark < high_watermark);
        Self {
            mode: FlowMode::Prefetching,
            high_watermark,
            low_watermark,
        }
    }

    pub fn mode(&self) -> FlowMode {
        self.mode
    }

    pub fn high_watermark(&self) -> usize {
        self.high_watermark
    }

    pub fn low_watermark(&self) -> usize {
        self.low_watermark
    }

    /// Whether the producer should attempt to enqueue at all.
    pub fn admits(&self) -> bool {
        self.mode != FlowMode::Dropping
    }

    /// Producer side: an enqueue did not fit.
    pub fn on_enqueue_failed(&mut self) -> Option<Transition> {
        match self.mode {
            FlowMode::Dropping => None,
            _ => self.set(FlowMode::Dropping),
        }
    }

    /// Producer side: an enqueue succeeded and the buffer now holds `occupied` bytes.
    pub fn on_enqueued(&mut self, occupied: usize) -> Option<Transition> {
        if self.mode == FlowMode::Prefetching && occupied >= self.high_watermark {
            return self.set(FlowMode::Processing);
        }
        None
    }

    /// Producer side: data was rejected while dropping; buffer holds `occupied` bytes.
    pub fn on_rejected(&mut self, occupied: usize) -> Option<Transition> {
        if self.mode == FlowMode::Dropping && occupied <= self.low_watermark {
            return self.set(FlowMode::Processing);
        }
        None
    }

    /// Consumer side: a dequeue came back empty.
    pub fn on_underflow(&mut self) -> Option<Transition> {
        match self.mode {
            FlowMode::Prefetching => None,
            _ => self.set(FlowMode::Prefetching),
        }
    }

    fn set(&mut self, to: FlowMode) -> Option<Transition> {
        let from = self.mode;
        if from == to {
            return None;
        }
        self.mode = to;
        Some(Transition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> FlowControl {
        FlowControl::new(20_480, 10_240)
    }

    #[test]
    fn starts_prefetching() {
        let f = flow();
        assert_eq!(f.mode(), FlowMode::Prefetching);
        assert!(f.admits());
    }

    #[test]
    fn prefetch_ends_at_high_watermark() {
        let mut f = flow();
        assert_eq!(f.on_enqueued(20_479), None);
        let t = f.on_enqueued(20_480).unwrap();
        assert_eq!(t.from, FlowMode::Prefetching);
        assert_eq!(t.to, FlowMode::Processing);
        assert!(t.resumes_drain());
        assert_eq!(f.on_enqueued(30_000), None);
    }

    #[test]
    fn overflow_enters_dropping_until_low_watermark() {
        let mut f = flow();
        f.on_enqueued(20_480);
        let t = f.on_enqueue_failed().unwrap();
        assert_eq!(t.to, FlowMode::Dropping);
        assert!(!t.resumes_drain());
        assert!(!f.admits());

        assert_eq!(f.on_rejected(10_241), None);
        assert_eq!(f.mode(), FlowMode::Dropping);
        let t = f.on_rejected(10_240).unwrap();
        assert_eq!(t.from, FlowMode::Dropping);
        assert_eq!(t.to, FlowMode::Processing);
        assert!(!t.resumes_drain());
    }

    #[test]
    fn overflow_while_prefetching_wakes_drain() {
        let mut f = flow();
        f.on_enqueued(20_000);
        let t = f.on_enqueue_failed().unwrap();
        assert_eq!(t.from, FlowMode::Prefetching);
        assert_eq!(t.to, FlowMode::Dropping);
        assert!(t.resumes_drain());
    }

    #[test]
    fn repeated_overflow_is_idempotent() {
        let mut f = flow();
        f.on_enqueue_failed();
        assert_eq!(f.on_enqueue_failed(), None);
        assert_eq!(f.mode(), FlowMode::Dropping);
    }

    #[test]
    fn underflow_returns_to_prefetching() {
        let mut f = flow();
        f.on_enqueued(20_480);
        let t = f.on_underflow().unwrap();
        assert_eq!(t.from, FlowMode::Processing);
        assert_eq!(t.to, FlowMode::Prefetching);
        assert_eq!(f.on_underflow(), None);
    }

    #[test]
    fn rejected_is_ignored_outside_dropping() {
        let mut f = flow();
        assert_eq!(f.on_rejected(0), None);
        assert_eq!(f.mode(), FlowMode::Prefetching);
    }
}
