//! Buffered audio sink: the subsystem object tying the ring, flow control, resume signal and
//! drain task together.
//!
//! Upstream code pushes PCM with [`AudioSink::submit`] from any thread; a dedicated drain thread
//! writes it to the [`OutputTransport`]. Everything is created in [`AudioSink::start`] and torn
//! down in [`AudioSink::stop`] (or on drop).

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use audio_sink_types::SinkStatus;
use crossbeam_channel::{Sender, bounded};

use crate::config::SinkConfig;
use crate::drain::{DrainContext, spawn_drain};
use crate::error::SinkError;
use crate::flow::{FlowMode, Transition};
use crate::gain::GainSetting;
use crate::notify::{StatusNotifier, event_for};
use crate::queue::{Admission, SharedRing};
use crate::signal::ResumeSignal;
use crate::status::{BufferGauge, SinkStats};
use crate::transport::OutputTransport;

pub struct AudioSink {
    config: SinkConfig,
    shared: Arc<SharedRing>,
    resume: ResumeSignal,
    gain: GainSetting,
    stats: Arc<SinkStats>,
    notifier: Arc<dyn StatusNotifier>,
    stop_tx: Mutex<Option<Sender<()>>>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl AudioSink {
    /// Validate `config`, create the buffer in prefetching mode, and spawn the drain task.
    ///
    /// Nothing runs if this returns an error.
    pub fn start<T>(
        config: SinkConfig,
        transport: T,
        gain: GainSetting,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Result<Self, SinkError>
    where
        T: OutputTransport + 'static,
    {
        config.validate()?;

        let shared = Arc::new(SharedRing::new(
            config.capacity_bytes,
            config.high_watermark,
            config.low_watermark,
            config.sample_bytes,
        )?);
        let resume = ResumeSignal::new();
        let stats = Arc::new(SinkStats::default());
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let drain = spawn_drain(
            DrainContext {
                shared: shared.clone(),
                resume: resume.clone(),
                stop: stop_rx,
                gain: gain.clone(),
                stats: stats.clone(),
                notifier: notifier.clone(),
                max_chunk_bytes: config.max_chunk_bytes,
                dequeue_timeout: config.dequeue_timeout,
            },
            transport,
        )?;

        tracing::info!(
            capacity = config.capacity_bytes,
            high_watermark = config.high_watermark,
            low_watermark = config.low_watermark,
            max_chunk_bytes = config.max_chunk_bytes,
            mode = %FlowMode::Prefetching,
            "audio sink started"
        );

        Ok(Self {
            config,
            shared,
            resume,
            gain,
            stats,
            notifier,
            stop_tx: Mutex::new(Some(stop_tx)),
            drain: Mutex::new(Some(drain)),
        })
    }

    /// Push PCM bytes into the sink. Returns how many were accepted: all of them or none.
    ///
    /// A short return is data loss; callers are not expected to retry.
    pub fn submit(&self, bytes: &[u8]) -> usize {
        match self.shared.admit(bytes, self.config.enqueue_timeout) {
            Admission::Accepted { transition } => {
                SinkStats::add(&self.stats.accepted_bytes, bytes.len());
                if let Some(t) = transition {
                    self.on_transition(t);
                }
                bytes.len()
            }
            Admission::Rejected { transition } => {
                SinkStats::add(&self.stats.dropped_bytes, bytes.len());
                tracing::trace!(bytes = bytes.len(), "packet dropped");
                if let Some(t) = transition {
                    self.on_transition(t);
                }
                0
            }
            Admission::Closed => {
                SinkStats::add(&self.stats.dropped_bytes, bytes.len());
                tracing::debug!(bytes = bytes.len(), "submit after stop; dropped");
                0
            }
        }
    }

    fn on_transition(&self, t: Transition) {
        match t.to {
            FlowMode::Dropping => {
                SinkStats::bump(&self.stats.overflow_events);
                tracing::warn!(from = %t.from, "ring buffer overflow; dropping input");
            }
            _ => tracing::info!(from = %t.from, to = %t.to, "ring buffer mode changed"),
        }
        if t.resumes_drain() {
            SinkStats::bump(&self.stats.resume_events);
            if !self.resume.give() {
                tracing::debug!("resume already pending");
            }
        }
        self.notifier.notify(&event_for(t));
    }

    pub fn mode(&self) -> FlowMode {
        self.shared.mode()
    }

    pub fn occupied_bytes(&self) -> usize {
        self.shared.occupied_bytes()
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Shared handle to the gain applied by the drain task.
    pub fn gain(&self) -> GainSetting {
        self.gain.clone()
    }

    pub fn status(&self) -> SinkStatus {
        let (high_watermark, low_watermark) = self.shared.watermarks();
        let gauge = BufferGauge {
            mode: self.shared.mode(),
            occupied_bytes: self.shared.occupied_bytes(),
            capacity_bytes: self.config.capacity_bytes,
            high_watermark,
            low_watermark,
            stopped: self.shared.is_closed(),
        };
        self.stats.snapshot(gauge, self.gain.db())
    }

    /// Stop the drain task and reject all further input.
    ///
    /// Blocks until the drain thread exits, which includes any transport write already in
    /// flight. Idempotent.
    pub fn stop(&self) {
        self.shared.close();
        let stop_tx = self
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(stop_tx);

        let handle = self
            .drain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("drain task panicked");
            }
            tracing::info!("audio sink stopped");
        }
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        self.stop();
    }
}
