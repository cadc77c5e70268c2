//! Competing-consumer run loop
//!
//! Workers of a pool share one work sequence. Each worker claims the next
//! sequence number with a compare-and-set on it, so every event is handled by
//! exactly one worker.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

use crate::disruptor::core_interfaces::DataProvider;
use crate::disruptor::event_handler::{EventReleaser, WorkHandler};
use crate::disruptor::event_processor::{EventProcessor, IdleOnDrop, RunState, StartOutcome};
use crate::disruptor::exception_handler::ExceptionHandler;
use crate::disruptor::sequence::Sequence;
use crate::disruptor::sequence_barrier::SequenceBarrier;
use crate::disruptor::{DisruptorError, Result, WaitError};

/// One worker of a [`WorkerPool`](crate::disruptor::WorkerPool)
///
/// The worker's own sequence trails the sequence it is working on by one, so
/// producers never overwrite an event a worker has claimed but not finished.
pub struct WorkProcessor<T, H> {
    data_provider: Arc<dyn DataProvider<T> + Send + Sync>,
    sequence_barrier: Arc<dyn SequenceBarrier>,
    handler: Mutex<H>,
    exception_handler: RwLock<Arc<dyn ExceptionHandler<T>>>,
    work_sequence: Arc<Sequence>,
    sequence: Arc<Sequence>,
    running: RunState,
}

impl<T, H> WorkProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: WorkHandler<T>,
{
    /// Create a worker that claims from `work_sequence`
    ///
    /// The handler receives an [`EventReleaser`] for the worker's sequence.
    pub fn new(
        data_provider: Arc<dyn DataProvider<T> + Send + Sync>,
        sequence_barrier: Arc<dyn SequenceBarrier>,
        mut handler: H,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        work_sequence: Arc<Sequence>,
    ) -> Self {
        let sequence = Arc::new(Sequence::default());
        handler.set_event_releaser(EventReleaser::new(&sequence));

        Self {
            data_provider,
            sequence_barrier,
            handler: Mutex::new(handler),
            exception_handler: RwLock::new(exception_handler),
            work_sequence,
            sequence,
            running: RunState::new(),
        }
    }

    pub fn set_exception_handler(&self, exception_handler: Arc<dyn ExceptionHandler<T>>) {
        *self.exception_handler.write() = exception_handler;
    }

    fn exception_handler(&self) -> Arc<dyn ExceptionHandler<T>> {
        Arc::clone(&self.exception_handler.read())
    }

    fn notify_start(&self, handler: &mut H) {
        if let Err(e) = handler.on_start() {
            self.exception_handler().handle_on_start_exception(e);
        }
    }

    fn notify_shutdown(&self, handler: &mut H) {
        if let Err(e) = handler.on_shutdown() {
            self.exception_handler().handle_on_shutdown_exception(e);
        }
    }

    /// Claim the next unclaimed sequence of the pool
    fn claim_next(&self) -> i64 {
        loop {
            let next_sequence = self.work_sequence.get() + 1;
            self.sequence.set(next_sequence - 1);
            if self
                .work_sequence
                .compare_and_set(next_sequence - 1, next_sequence)
            {
                return next_sequence;
            }
        }
    }

    fn process_events(&self, handler: &mut H) {
        let mut processed = true;
        let mut cached_available_sequence = i64::MIN;
        let mut next_sequence = self.sequence.get();

        loop {
            if processed {
                processed = false;
                next_sequence = self.claim_next();
            }

            if cached_available_sequence >= next_sequence {
                let event = self.data_provider.get(next_sequence);
                if let Err(e) = handler.on_event(event, next_sequence) {
                    self.exception_handler()
                        .handle_event_exception(e, next_sequence, event);
                }
                processed = true;
                continue;
            }

            match self.sequence_barrier.wait_for(next_sequence) {
                Ok(available_sequence) => cached_available_sequence = available_sequence,
                Err(WaitError::TimedOut) => {
                    let sequence = self.sequence.get();
                    if let Err(e) = handler.on_timeout(sequence) {
                        self.exception_handler()
                            .handle_on_timeout_exception(e, sequence);
                    }
                }
                Err(WaitError::Alerted) => {
                    if !self.running.keep_running() {
                        break;
                    }
                }
            }
        }
    }
}

impl<T, H> EventProcessor for WorkProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: WorkHandler<T>,
{
    fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    fn halt(&self) {
        self.running.halt();
        self.sequence_barrier.alert();
    }

    fn is_running(&self) -> bool {
        self.running.is_running()
    }

    fn run(&self) -> Result<()> {
        match self.running.try_start() {
            StartOutcome::Started => {}
            StartOutcome::AlreadyRunning => {
                return Err(DisruptorError::InvalidOperation(
                    "work processor is already running",
                ))
            }
            StartOutcome::HaltedBeforeStart => {
                let _idle = IdleOnDrop(&self.running);
                let mut handler = self.handler.lock();
                self.notify_start(&mut handler);
                self.notify_shutdown(&mut handler);
                return Ok(());
            }
        }

        let _idle = IdleOnDrop(&self.running);
        let mut handler = self.handler.lock();
        // The barrier is shared with the other workers of a pool. If a halt
        // raced with this clear, raise the alert again for them.
        self.sequence_barrier.clear_alert();
        if !self.running.keep_running() {
            self.sequence_barrier.alert();
        }

        debug!(sequence = self.sequence.get(), "work processor started");
        self.notify_start(&mut handler);

        if self.running.keep_running() {
            self.process_events(&mut handler);
        }

        self.notify_shutdown(&mut handler);
        debug!(sequence = self.sequence.get(), "work processor stopped");
        Ok(())
    }
}

impl<T, H> std::fmt::Debug for WorkProcessor<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkProcessor")
            .field("sequence", &self.sequence)
            .field("work_sequence", &self.work_sequence)
            .field("running", &self.running)
            .finish()
    }
}
