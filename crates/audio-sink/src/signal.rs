//! Single-slot wake-up for the parked drain task.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};

/// Binary signal: at most one wake-up is ever pending.
///
/// Giving an already-given signal is a no-op, so a burst of producer calls that all cross the
/// prefetch target wakes the drain task exactly once.
#[derive(Clone)]
pub struct ResumeSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

/// Why [`ResumeSignal::wait`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    Resume,
    Stop,
}

impl Default for ResumeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ResumeSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Raise the signal. Returns `false` if a wake-up was already pending.
    pub fn give(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => false,
        }
    }

    /// Block until the signal is given or `stop` disconnects.
    pub fn wait(&self, stop: &Receiver<()>) -> Wake {
        select! {
            recv(stop) -> _ => Wake::Stop,
            recv(self.rx) -> msg => match msg {
                Ok(()) => Wake::Resume,
                Err(_) => Wake::Stop,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn give_is_single_slot() {
        let sig = ResumeSignal::new();
        assert!(sig.give());
        assert!(!sig.give());
        assert_eq!(sig.rx.len(), 1);

        let (_stop_tx, stop_rx) = bounded::<()>(0);
        assert_eq!(sig.wait(&stop_rx), Wake::Resume);
        assert!(sig.rx.is_empty());
    }

    #[test]
    fn wait_wakes_on_give_from_other_thread() {
        let sig = ResumeSignal::new();
        let giver = sig.clone();
        let (_stop_tx, stop_rx) = bounded::<()>(0);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            giver.give()
        });
        assert_eq!(sig.wait(&stop_rx), Wake::Resume);
        assert!(handle.join().unwrap());
    }

    #[test]
    fn dropping_stop_sender_unblocks_wait() {
        let sig = ResumeSignal::new();
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = thread::spawn(move || sig.wait(&stop_rx));
        thread::sleep(Duration::from_millis(10));
        drop(stop_tx);
        assert_eq!(handle.join().unwrap(), Wake::Stop);
    }
}
