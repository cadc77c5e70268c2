//! Event Processor implementation for the Disruptor
//!
//! Event processors are the consumer run loops. A processor owns a sequence
//! recording how far it has processed, waits on a barrier for more events,
//! and hands them to its handler. Its sequence is what producers gate on.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::disruptor::core_interfaces::DataProvider;
use crate::disruptor::event_handler::EventHandler;
use crate::disruptor::exception_handler::{ExceptionHandler, FatalExceptionHandler};
use crate::disruptor::sequence::Sequence;
use crate::disruptor::sequence_barrier::SequenceBarrier;
use crate::disruptor::{DisruptorError, Result, WaitError};

/// A consumer run loop that can be executed on its own thread
pub trait EventProcessor: Send + Sync {
    /// The sequence of the last event this processor finished with
    fn sequence(&self) -> &Arc<Sequence>;

    /// Ask the run loop to stop
    ///
    /// The loop finishes the batch it is processing, runs the shutdown hook and
    /// returns from [`run`](Self::run).
    fn halt(&self);

    /// True from the moment `run` starts until it returns, and after a `halt`
    /// that has not been observed by `run` yet
    fn is_running(&self) -> bool;

    /// Run the loop on the calling thread until halted
    ///
    /// # Errors
    /// `InvalidOperation` if the loop is already running
    fn run(&self) -> Result<()>;
}

const IDLE: u8 = 0;
const HALTED: u8 = 1;
const RUNNING: u8 = 2;

pub(crate) enum StartOutcome {
    Started,
    AlreadyRunning,
    HaltedBeforeStart,
}

/// `Idle -> Running -> Halted -> Idle` state shared by the processor loops
#[derive(Debug)]
pub(crate) struct RunState(AtomicU8);

impl RunState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(IDLE))
    }

    pub(crate) fn try_start(&self) -> StartOutcome {
        match self
            .0
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => StartOutcome::Started,
            Err(RUNNING) => StartOutcome::AlreadyRunning,
            Err(_) => StartOutcome::HaltedBeforeStart,
        }
    }

    pub(crate) fn halt(&self) {
        self.0.store(HALTED, Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire) != IDLE
    }

    /// False once a halt has been requested
    pub(crate) fn keep_running(&self) -> bool {
        self.0.load(Ordering::Acquire) == RUNNING
    }

    pub(crate) fn reset(&self) {
        self.0.store(IDLE, Ordering::Release);
    }
}

/// Returns the state to idle when dropped, so a loop that panics is never
/// reported as running
pub(crate) struct IdleOnDrop<'a>(pub(crate) &'a RunState);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.reset();
    }
}

/// The standard consumer: delivers every published event, batch by batch, to
/// one [`EventHandler`]
///
/// Each call to the barrier yields a contiguous run of available events. They
/// are delivered in sequence order with `end_of_batch` set on the last one,
/// and the processor's sequence moves to the end of the run afterwards.
///
/// A handler error is passed to the exception handler and the processor moves
/// past the failed event, so one poison event never stalls consumption.
pub struct BatchEventProcessor<T, H> {
    data_provider: Arc<dyn DataProvider<T> + Send + Sync>,
    sequence_barrier: Arc<dyn SequenceBarrier>,
    handler: Mutex<H>,
    sequence: Arc<Sequence>,
    exception_handler: RwLock<Arc<dyn ExceptionHandler<T>>>,
    running: RunState,
}

impl<T, H> BatchEventProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: EventHandler<T>,
{
    /// Create a processor reading from `data_provider` as far as
    /// `sequence_barrier` allows
    ///
    /// The handler receives the processor's sequence through
    /// [`EventHandler::set_sequence_callback`].
    pub fn new(
        data_provider: Arc<dyn DataProvider<T> + Send + Sync>,
        sequence_barrier: Arc<dyn SequenceBarrier>,
        mut handler: H,
    ) -> Self {
        let sequence = Arc::new(Sequence::default());
        handler.set_sequence_callback(Arc::clone(&sequence));
        let exception_handler: Arc<dyn ExceptionHandler<T>> =
            Arc::new(FatalExceptionHandler::new());

        Self {
            data_provider,
            sequence_barrier,
            handler: Mutex::new(handler),
            sequence,
            exception_handler: RwLock::new(exception_handler),
            running: RunState::new(),
        }
    }

    /// Replace the exception handler
    ///
    /// Takes effect from the next error, including while running.
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

    fn notify_timeout(&self, handler: &mut H, available_sequence: i64) {
        if let Err(e) = handler.on_timeout(available_sequence) {
            self.exception_handler()
                .handle_on_timeout_exception(e, available_sequence);
        }
    }

    fn process_events(&self, handler: &mut H) {
        let mut next_sequence = self.sequence.get() + 1;

        loop {
            match self.sequence_barrier.wait_for(next_sequence) {
                Ok(available_sequence) => {
                    if available_sequence < next_sequence {
                        continue;
                    }

                    handler.on_batch_start(available_sequence - next_sequence + 1);

                    let mut failure = None;
                    while next_sequence <= available_sequence {
                        let event = self.data_provider.get(next_sequence);
                        let end_of_batch = next_sequence == available_sequence;
                        if let Err(e) = handler.on_event(event, next_sequence, end_of_batch) {
                            failure = Some(e);
                            break;
                        }
                        next_sequence += 1;
                    }

                    match failure {
                        None => self.sequence.set(available_sequence),
                        Some(e) => {
                            let event = self.data_provider.get(next_sequence);
                            self.exception_handler()
                                .handle_event_exception(e, next_sequence, event);
                            self.sequence.set(next_sequence);
                            next_sequence += 1;
                        }
                    }
                }
                Err(WaitError::TimedOut) => self.notify_timeout(handler, self.sequence.get()),
                Err(WaitError::Alerted) => {
                    if !self.running.keep_running() {
                        break;
                    }
                }
            }
        }
    }
}

impl<T, H> EventProcessor for BatchEventProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: EventHandler<T>,
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
                    "event processor is already running",
                ))
            }
            StartOutcome::HaltedBeforeStart => {
                let _idle = IdleOnDrop(&self.running);
                let mut handler = self.handler.lock();
                debug!("event processor halted before start");
                self.notify_start(&mut handler);
                self.notify_shutdown(&mut handler);
                return Ok(());
            }
        }

        let _idle = IdleOnDrop(&self.running);
        let mut handler = self.handler.lock();
        self.sequence_barrier.clear_alert();

        debug!(sequence = self.sequence.get(), "event processor started");
        self.notify_start(&mut handler);

        if self.running.keep_running() {
            self.process_events(&mut handler);
        }

        self.notify_shutdown(&mut handler);
        debug!(sequence = self.sequence.get(), "event processor stopped");
        Ok(())
    }
}

impl<T, H> std::fmt::Debug for BatchEventProcessor<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEventProcessor")
            .field("sequence", &self.sequence)
            .field("running", &self.running)
            .finish()
    }
}
