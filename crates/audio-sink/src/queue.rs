//! Synchronized byte ring shared by the producer and the drain task.
//!
//! [`SharedRing`] is the only state touched by both execution contexts:
//! - producer → [`SharedRing::admit`] (enqueue + flow-control decision, atomically)
//! - drain task → [`SharedRing::dequeue_up_to`] and [`SharedRing::underflow`]
//!
//! Occupancy and the flow-control mode live under the **same mutex**, so a mode transition is
//! always decided from an occupancy value that cannot change underneath it.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::SinkError;
use crate::flow::{FlowControl, FlowMode, Transition};
use crate::ring::ByteRing;

/// Bounded byte FIFO plus flow-control state behind one lock.
///
/// ## Design
/// - A single [`Condvar`] is used as a general "state changed" signal (space freed, data added,
///   closed).
/// - A `closed` flag is stored under the same mutex as the ring to avoid teardown races.
/// - Reads are aligned to `align` bytes so a sample is never split across chunks.
pub struct SharedRing {
    inner: Mutex<RingState>,
    cv: Condvar,
    align: usize,
}

struct RingState {
    ring: ByteRing,
    flow: FlowControl,
    closed: bool,
}

impl RingState {
    fn reject_while_dropping(&mut self) -> Admission {
        let occupied = self.ring.len();
        let transition = self.flow.on_rejected(occupied);
        Admission::Rejected { transition }
    }
}

/// Outcome of a producer admission attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Every byte was enqueued.
    Accepted { transition: Option<Transition> },
    /// Nothing was enqueued: either already dropping, or the bytes did not fit.
    Rejected { transition: Option<Transition> },
    /// The ring is closed; the sink is shutting down.
    Closed,
}

/// Result of re-checking an empty dequeue under the lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnderflowCheck {
    /// The ring is really empty; the drain task must park until resumed.
    Park { transition: Option<Transition> },
    /// Data arrived since the empty dequeue; keep draining.
    Refilled,
}

impl SharedRing {
    /// Create an empty ring in [`FlowMode::Prefetching`].
    ///
    /// Fails with [`SinkError::Alloc`] if the backing store cannot be allocated.
    pub fn new(
        capacity: usize,
        high_watermark: usize,
        low_watermark: usize,
        align: usize,
    ) -> Result<Self, SinkError> {
        let ring = ByteRing::try_new(capacity).map_err(|source| SinkError::Alloc {
            bytes: capacity,
            source,
        })?;
        Ok(Self {
            inner: Mutex::new(RingState {
                ring,
                flow: FlowControl::new(high_watermark, low_watermark),
                closed: false,
            }),
            cv: Condvar::new(),
            align: align.max(1),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.lock().ring.capacity()
    }

    /// Bytes buffered right now (best-effort snapshot).
    ///
    /// This value can change immediately after the call returns.
    pub fn occupied_bytes(&self) -> usize {
        self.lock().ring.len()
    }

    pub fn mode(&self) -> FlowMode {
        self.lock().flow.mode()
    }

    /// `(high, low)` watermarks.
    pub fn watermarks(&self) -> (usize, usize) {
        let g = self.lock();
        (g.flow.high_watermark(), g.flow.low_watermark())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Mark the ring as closed and wake all waiters.
    ///
    /// After this every enqueue is rejected and blocked dequeues return empty.
    /// Idempotent.
    pub fn close(&self) {
        let mut g = self.lock();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Append `bytes` all-or-nothing, waiting up to `timeout` for enough free space.
    ///
    /// Returns `false` without writing anything if the bytes still do not fit (or the ring is
    /// closed). No flow-control state is touched.
    pub fn enqueue(&self, bytes: &[u8], timeout: Duration) -> bool {
        let mut g = self.wait_for_space(self.lock(), bytes.len(), timeout);
        let pushed = !g.closed && g.ring.push_all(bytes);
        drop(g);
        if pushed {
            self.cv.notify_all();
        }
        pushed
    }

    /// Producer entry: apply the admission policy for `bytes` atomically.
    ///
    /// - dropping → reject, then re-check the low watermark
    /// - otherwise → enqueue (bounded wait); on failure enter dropping; on success re-check
    ///   the high watermark if prefetching
    pub fn admit(&self, bytes: &[u8], timeout: Duration) -> Admission {
        let mut g = self.lock();
        if g.closed {
            return Admission::Closed;
        }

        if !g.flow.admits() {
            return g.reject_while_dropping();
        }

        let mut g = self.wait_for_space(g, bytes.len(), timeout);
        if g.closed {
            return Admission::Closed;
        }
        // Another producer may have started dropping while this one waited.
        if !g.flow.admits() {
            return g.reject_while_dropping();
        }
        if !g.ring.push_all(bytes) {
            let transition = g.flow.on_enqueue_failed();
            return Admission::Rejected { transition };
        }

        let occupied = g.ring.len();
        let transition = g.flow.on_enqueued(occupied);
        drop(g);
        self.cv.notify_all();
        Admission::Accepted { transition }
    }

    /// Wait up to `timeout` until `len` bytes fit. Skips the wait when they never can.
    fn wait_for_space<'a>(
        &self,
        mut g: MutexGuard<'a, RingState>,
        len: usize,
        timeout: Duration,
    ) -> MutexGuard<'a, RingState> {
        if len > g.ring.capacity() || timeout.is_zero() {
            return g;
        }
        let deadline = Instant::now() + timeout;
        while len > g.ring.free() && !g.closed {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            g = ng;
        }
        g
    }

    /// Move up to `out.len()` bytes into `out`, waiting up to `timeout` for data.
    ///
    /// The count returned is always a multiple of the sample alignment. `0` means the wait
    /// timed out (or the ring was closed); callers treat it as an underflow, not an error.
    pub fn dequeue_up_to(&self, out: &mut [u8], timeout: Duration) -> usize {
        let want = out.len() - out.len() % self.align;
        if want == 0 {
            return 0;
        }

        let mut g = self.lock();
        let deadline = Instant::now() + timeout;
        while g.ring.len() < self.align && !g.closed {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            g = ng;
        }

        let available = g.ring.len() - g.ring.len() % self.align;
        let take = available.min(want);
        if take == 0 {
            return 0;
        }
        let n = g.ring.pop_into(&mut out[..take]);
        drop(g);
        self.cv.notify_all();
        n
    }

    /// Consumer side: confirm an empty dequeue and move to prefetching if still empty.
    pub fn underflow(&self) -> UnderflowCheck {
        let mut g = self.lock();
        if g.ring.len() >= self.align && !g.closed {
            return UnderflowCheck::Refilled;
        }
        UnderflowCheck::Park {
            transition: g.flow.on_underflow(),
        }
    }
}
