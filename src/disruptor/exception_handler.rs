//! Exception Handlers
//!
//! Errors raised by handlers inside a processor loop never propagate out of
//! the loop. They are handed to the processor's exception handler, which
//! decides whether to carry on or to take the consumer thread down.

use std::marker::PhantomData;
use tracing::{error, warn};

use crate::disruptor::DisruptorError;

/// Receives errors raised by handlers inside a processor loop
///
/// # Type Parameters
/// * `T` - The event type being processed
pub trait ExceptionHandler<T>: Send + Sync {
    /// A handler failed on `event`
    ///
    /// The processor moves past `sequence` after this returns, so a poison
    /// event is never retried.
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, event: &T);

    /// A handler failed in its start hook
    fn handle_on_start_exception(&self, error: DisruptorError);

    /// A handler failed in its shutdown hook
    fn handle_on_shutdown_exception(&self, error: DisruptorError);

    /// A handler failed in its timeout hook
    fn handle_on_timeout_exception(&self, error: DisruptorError, sequence: i64);
}

/// Fails loud: logs, then panics the consumer thread on event and start errors
///
/// Shutdown and timeout errors are only logged, so a processor that is already
/// stopping still finishes cleanly. This is the processors' default.
#[derive(Debug)]
pub struct FatalExceptionHandler<T> {
    _phantom: PhantomData<fn(&T)>,
}

impl<T> FatalExceptionHandler<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for FatalExceptionHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExceptionHandler<T> for FatalExceptionHandler<T> {
    fn handle_event_exception(&self, err: DisruptorError, sequence: i64, _event: &T) {
        error!(sequence, error = %err, "fatal exception processing event");
        panic!("fatal exception processing event at sequence {sequence}: {err}");
    }

    fn handle_on_start_exception(&self, err: DisruptorError) {
        error!(error = %err, "fatal exception during processor start");
        panic!("fatal exception during processor start: {err}");
    }

    fn handle_on_shutdown_exception(&self, err: DisruptorError) {
        error!(error = %err, "exception during processor shutdown");
    }

    fn handle_on_timeout_exception(&self, err: DisruptorError, sequence: i64) {
        error!(sequence, error = %err, "exception in timeout handler");
    }
}

/// Logs every error at `warn` and keeps processing
#[derive(Debug)]
pub struct IgnoreExceptionHandler<T> {
    _phantom: PhantomData<fn(&T)>,
}

impl<T> IgnoreExceptionHandler<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for IgnoreExceptionHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExceptionHandler<T> for IgnoreExceptionHandler<T> {
    fn handle_event_exception(&self, err: DisruptorError, sequence: i64, _event: &T) {
        warn!(sequence, error = %err, "exception processing event");
    }

    fn handle_on_start_exception(&self, err: DisruptorError) {
        warn!(error = %err, "exception during processor start");
    }

    fn handle_on_shutdown_exception(&self, err: DisruptorError) {
        warn!(error = %err, "exception during processor shutdown");
    }

    fn handle_on_timeout_exception(&self, err: DisruptorError, sequence: i64) {
        warn!(sequence, error = %err, "exception in timeout handler");
    }
}
