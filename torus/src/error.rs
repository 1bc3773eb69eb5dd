//! Error types for torus.

/// Result type for torus operations.
pub type Result<T> = std::result::Result<T, TorusError>;

/// Errors surfaced by the ring, sequencers and barriers.
///
/// Handler failures are not represented here; they are delegated to the
/// [`ErrorHandler`](crate::handler::ErrorHandler) wired into the processor
/// and never escape the event loop.
#[derive(Debug, thiserror::Error)]
pub enum TorusError {
    /// Invalid construction parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A claim was requested for a batch the ring can never satisfy.
    #[error("invalid claim of {requested} slot(s) on a ring of {buffer_size}")]
    InvalidClaim { requested: i64, buffer_size: i64 },

    /// A `try_next` style claim could not be satisfied right now.
    #[error("insufficient capacity for {0} slot(s)")]
    InsufficientCapacity(i64),

    /// A wait was interrupted by a barrier alert (shutdown signal).
    #[error("alerted while waiting")]
    Alerted,
}

impl TorusError {
    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        TorusError::Config(msg.into())
    }
}
