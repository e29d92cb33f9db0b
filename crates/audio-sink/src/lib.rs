//! Buffered PCM sink: absorbs bursty upstream audio in a bounded ring, applies gain, and drains
//! it at hardware pace to an output transport.
//!
//! ## Pipeline
//! 1. **Submit**: upstream calls [`AudioSink::submit`]; the flow-control policy admits or drops.
//! 2. **Buffer**: bytes sit in [`queue::SharedRing`] until the prefetch target is reached.
//! 3. **Drain**: a dedicated thread pulls hardware-sized chunks, applies [`gain`], and writes to
//!    an [`transport::OutputTransport`] (CPAL, paced, or a channel).

pub mod config;
pub mod device;
pub mod dispatch;
mod drain;
pub mod error;
pub mod flow;
pub mod gain;
pub mod notify;
pub mod playback;
pub mod queue;
pub mod ring;
pub mod signal;
pub mod sink;
pub mod status;
pub mod transport;

pub use config::SinkConfig;
pub use error::SinkError;
pub use flow::FlowMode;
pub use gain::GainSetting;
pub use sink::AudioSink;
