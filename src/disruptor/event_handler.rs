//! Event Handlers
//!
//! Callbacks that consumers implement. [`EventHandler`] is driven by a
//! [`BatchEventProcessor`](crate::disruptor::BatchEventProcessor) and sees every
//! event; [`WorkHandler`] is driven by a
//! [`WorkProcessor`](crate::disruptor::WorkProcessor) and sees only the events
//! its worker won. The optional capabilities (lifecycle, batch start, timeout,
//! early release) are default methods, so handlers implement only what they use.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use crate::disruptor::sequence::Sequence;
use crate::disruptor::Result;

/// Handler for every event published to a ring buffer
///
/// Events are shared with other consumers, so handlers only get `&T`. State
/// that a handler needs to write per event belongs in the handler itself or
/// behind interior mutability in the event.
///
/// # Examples
/// ```
/// use batchring::disruptor::{EventHandler, Result};
///
/// struct Summer {
///     total: i64,
/// }
///
/// impl EventHandler<i64> for Summer {
///     fn on_event(&mut self, event: &i64, _sequence: i64, _end_of_batch: bool) -> Result<()> {
///         self.total += *event;
///         Ok(())
///     }
/// }
/// ```
pub trait EventHandler<T>: Send {
    /// Process one event
    ///
    /// `end_of_batch` is true for the last event of the batch the processor
    /// received from its barrier, which is the natural point to flush work
    /// deferred across the batch.
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()>;

    /// Called once on the processor thread before the first event
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once on the processor thread after the last event
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called before each batch with the number of events in it
    fn on_batch_start(&mut self, _batch_size: i64) {}

    /// Called when the barrier's wait timed out, with the processor's current sequence
    fn on_timeout(&mut self, _sequence: i64) -> Result<()> {
        Ok(())
    }

    /// Receive the processor's own sequence
    ///
    /// A handler that finishes with events before the end of a batch may set
    /// this sequence itself to release them to downstream consumers early.
    fn set_sequence_callback(&mut self, _sequence_callback: Arc<Sequence>) {}
}

impl<T, H> EventHandler<T> for Box<H>
where
    H: EventHandler<T> + ?Sized,
{
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()> {
        (**self).on_event(event, sequence, end_of_batch)
    }

    fn on_start(&mut self) -> Result<()> {
        (**self).on_start()
    }

    fn on_shutdown(&mut self) -> Result<()> {
        (**self).on_shutdown()
    }

    fn on_batch_start(&mut self, batch_size: i64) {
        (**self).on_batch_start(batch_size)
    }

    fn on_timeout(&mut self, sequence: i64) -> Result<()> {
        (**self).on_timeout(sequence)
    }

    fn set_sequence_callback(&mut self, sequence_callback: Arc<Sequence>) {
        (**self).set_sequence_callback(sequence_callback)
    }
}

/// Event handler built from a closure
pub struct ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    handler: F,
    sequence_callback: Option<Arc<Sequence>>,
    _phantom: PhantomData<fn(&T)>,
}

impl<T, F> ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            sequence_callback: None,
            _phantom: PhantomData,
        }
    }

    /// The processor sequence handed over by
    /// [`set_sequence_callback`](EventHandler::set_sequence_callback), once running
    pub fn sequence_callback(&self) -> Option<&Arc<Sequence>> {
        self.sequence_callback.as_ref()
    }
}

impl<T, F> EventHandler<T> for ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()> {
        (self.handler)(event, sequence, end_of_batch)
    }

    fn set_sequence_callback(&mut self, sequence_callback: Arc<Sequence>) {
        self.sequence_callback = Some(sequence_callback);
    }
}

/// Handler that ignores every event
///
/// Useful as a gating placeholder and for measuring the processor itself.
pub struct NoOpEventHandler<T> {
    _phantom: PhantomData<fn(&T)>,
}

impl<T> NoOpEventHandler<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for NoOpEventHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventHandler<T> for NoOpEventHandler<T> {
    fn on_event(&mut self, _event: &T, _sequence: i64, _end_of_batch: bool) -> Result<()> {
        Ok(())
    }
}

/// Lets a work handler give up its claim on the ring buffer early
///
/// Holds only a weak reference to the worker's sequence, so it never keeps a
/// finished worker alive.
#[derive(Debug, Clone)]
pub struct EventReleaser {
    sequence: Weak<Sequence>,
}

impl EventReleaser {
    pub fn new(sequence: &Arc<Sequence>) -> Self {
        Self {
            sequence: Arc::downgrade(sequence),
        }
    }

    /// Stop the worker from gating producers until it claims its next event
    ///
    /// Does nothing once the worker has been dropped.
    pub fn release(&self) {
        if let Some(sequence) = self.sequence.upgrade() {
            sequence.set(i64::MAX);
        }
    }
}

/// Handler for a worker in a [`WorkerPool`](crate::disruptor::WorkerPool)
///
/// Each event is handed to exactly one worker of the pool.
pub trait WorkHandler<T>: Send {
    /// Process one event won by this worker
    fn on_event(&mut self, event: &T, sequence: i64) -> Result<()>;

    /// Called once on the worker thread before the first event
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once on the worker thread after the last event
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when the barrier's wait timed out, with the worker's current sequence
    fn on_timeout(&mut self, _sequence: i64) -> Result<()> {
        Ok(())
    }

    /// Receive a releaser for the worker's sequence
    fn set_event_releaser(&mut self, _event_releaser: EventReleaser) {}
}

impl<T, H> WorkHandler<T> for Box<H>
where
    H: WorkHandler<T> + ?Sized,
{
    fn on_event(&mut self, event: &T, sequence: i64) -> Result<()> {
        (**self).on_event(event, sequence)
    }

    fn on_start(&mut self) -> Result<()> {
        (**self).on_start()
    }

    fn on_shutdown(&mut self) -> Result<()> {
        (**self).on_shutdown()
    }

    fn on_timeout(&mut self, sequence: i64) -> Result<()> {
        (**self).on_timeout(sequence)
    }

    fn set_event_releaser(&mut self, event_releaser: EventReleaser) {
        (**self).set_event_releaser(event_releaser)
    }
}
