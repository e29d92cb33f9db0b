/// Failures that prevent the sink (or its control dispatcher) from starting.
///
/// Flow-control outcomes such as a full buffer or an underflow are not errors and never
/// surface here.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("invalid sink config: {0}")]
    InvalidConfig(String),

    #[error("failed to allocate a {bytes}-byte ring buffer")]
    Alloc {
        bytes: usize,
        #[source]
        source: std::collections::TryReserveError,
    },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
