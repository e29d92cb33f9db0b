//! Control-event work queue.
//!
//! Upstream session code (connection state, transport control, volume changes) hands events to
//! a [`WorkDispatcher`], which runs them one at a time on its own thread so the caller never
//! waits on the handler.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, Sender, bounded};

use crate::error::SinkError;
use crate::gain::GainSetting;
use crate::notify::{SinkEvent, StatusNotifier};

/// Pending events the queue holds before `dispatch` starts failing.
pub const DISPATCH_QUEUE_DEPTH: usize = 10;

/// How long `dispatch` waits for queue space.
pub const DISPATCH_SEND_TIMEOUT: Duration = Duration::from_millis(10);

/// Events accepted by the dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlEvent {
    Connecting,
    Connected,
    Disconnected,
    Play,
    Pause,
    SetVolume { gain_db: f32 },
    SetTitle(String),
}

/// Runs dispatched events on the dispatcher thread.
pub trait ControlHandler: Send + 'static {
    fn handle(&mut self, event: ControlEvent);
}

/// Handle for queueing control events to the worker thread.
pub struct WorkDispatcher {
    tx: Mutex<Option<Sender<ControlEvent>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl WorkDispatcher {
    /// Spawn the worker thread that feeds events to `handler`.
    pub fn start<H: ControlHandler>(mut handler: H) -> Result<Self, SinkError> {
        let (tx, rx) = bounded::<ControlEvent>(DISPATCH_QUEUE_DEPTH);
        let join = std::thread::Builder::new()
            .name("sink-ctl".to_string())
            .spawn(move || {
                for event in rx.iter() {
                    tracing::debug!(?event, "control event");
                    handler.handle(event);
                }
                tracing::debug!("control dispatcher stopped");
            })?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            join: Mutex::new(Some(join)),
        })
    }

    /// Queue `event`. Returns `false` if the queue stayed full or the dispatcher is stopped.
    pub fn dispatch(&self, event: ControlEvent) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            tracing::error!(?event, "dispatch after stop");
            return false;
        };
        match tx.send_timeout(event, DISPATCH_SEND_TIMEOUT) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(event)) => {
                tracing::error!(?event, "control queue full; event dropped");
                false
            }
            Err(SendTimeoutError::Disconnected(event)) => {
                tracing::error!(?event, "control worker gone; event dropped");
                false
            }
        }
    }

    /// Close the queue, let the worker finish what is queued, and join it. Idempotent.
    pub fn stop(&self) {
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());
        let join = self.join.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(join) = join {
            if join.join().is_err() {
                tracing::error!("control dispatcher panicked");
            }
        }
    }
}

impl Drop for WorkDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Stock handler: applies volume changes to the sink gain and reports everything to the
/// status notifier.
pub struct SinkController {
    gain: GainSetting,
    notifier: Arc<dyn StatusNotifier>,
    title: Option<String>,
    playing: bool,
}

impl SinkController {
    pub fn new(gain: GainSetting, notifier: Arc<dyn StatusNotifier>) -> Self {
        Self {
            gain,
            notifier,
            title: None,
            playing: false,
        }
    }
}

impl ControlHandler for SinkController {
    fn handle(&mut self, event: ControlEvent) {
        let out = match event {
            ControlEvent::Connecting => SinkEvent::Connecting,
            ControlEvent::Connected => SinkEvent::Connected,
            ControlEvent::Disconnected => {
                self.playing = false;
                SinkEvent::Disconnected
            }
            ControlEvent::Play => {
                if !self.playing {
                    tracing::debug!(title = self.title.as_deref().unwrap_or("-"), "play");
                }
                self.playing = true;
                SinkEvent::Playing
            }
            ControlEvent::Pause => {
                self.playing = false;
                SinkEvent::Paused
            }
            ControlEvent::SetVolume { gain_db } => {
                if !gain_db.is_finite() {
                    SinkEvent::Error {
                        message: format!("invalid gain {gain_db}"),
                    }
                } else {
                    self.gain.set_db(gain_db);
                    SinkEvent::VolumeChanged { gain_db }
                }
            }
            ControlEvent::SetTitle(title) => {
                self.title = Some(title.clone());
                SinkEvent::TitleChanged { title }
            }
        };
        self.notifier.notify(&out);
    }
}
