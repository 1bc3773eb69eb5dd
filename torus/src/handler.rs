//! Contracts between processors and user code.
//!
//! An [`EventHandler`] receives each published event in sequence order. The
//! lifecycle, timeout and sequence-callback hooks are optional; the defaults
//! do nothing. Failures returned from any hook are routed to the
//! [`ErrorHandler`] wired into the processor and the stream keeps moving.

use std::sync::Arc;

use crate::sequence::{AtomicSequence, Sequence};

/// Failure raised by a handler hook.
pub type EventError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer-side callback invoked by an event processor.
pub trait EventHandler<T>: Send {
    /// Handle one published event. `end_of_batch` marks the last event of
    /// the contiguous range the processor obtained from its barrier.
    fn on_event(
        &mut self,
        event: &T,
        sequence: Sequence,
        end_of_batch: bool,
    ) -> std::result::Result<(), EventError>;

    /// Called once before the first wait.
    fn on_start(&mut self) -> std::result::Result<(), EventError> {
        Ok(())
    }

    /// Called once after the event loop exits.
    fn on_shutdown(&mut self) -> std::result::Result<(), EventError> {
        Ok(())
    }

    /// Called when a timeout-capable wait strategy elapsed without new
    /// events. `sequence` is the last sequence this consumer processed.
    fn on_timeout(&mut self, sequence: Sequence) -> std::result::Result<(), EventError> {
        let _ = sequence;
        Ok(())
    }

    /// Receives the processor's own sequence at startup. Handlers that
    /// process large batches may advance it mid-batch to release slots
    /// early.
    fn set_sequence_callback(&mut self, sequence: Arc<AtomicSequence>) {
        let _ = sequence;
    }
}

/// Receives handler failures from a processor. Implementations decide
/// whether to log, count or escalate; the processor always advances past
/// the faulting sequence.
pub trait ErrorHandler<T>: Send {
    fn handle_event_error(&mut self, error: EventError, sequence: Sequence, event: &T);

    fn handle_start_error(&mut self, error: EventError) {
        tracing::error!("start hook failed: {}", error);
    }

    fn handle_shutdown_error(&mut self, error: EventError) {
        tracing::error!("shutdown hook failed: {}", error);
    }

    fn handle_timeout_error(&mut self, error: EventError, sequence: Sequence) {
        tracing::error!("timeout hook failed at sequence {}: {}", sequence, error);
    }
}

/// Default error handler: logs and moves on.
#[derive(Debug, Default)]
pub struct LogErrorHandler;

impl<T> ErrorHandler<T> for LogErrorHandler {
    fn handle_event_error(&mut self, error: EventError, sequence: Sequence, _event: &T) {
        tracing::error!("event handler failed at sequence {}: {}", sequence, error);
    }
}
