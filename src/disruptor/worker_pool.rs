//! Worker Pool
//!
//! A pool of [`WorkProcessor`]s sharing one work sequence. Events are
//! partitioned across the workers, not replicated: each event is handled by
//! exactly one of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use crate::disruptor::core_interfaces::DataProvider;
use crate::disruptor::event_factory::EventFactory;
use crate::disruptor::event_handler::WorkHandler;
use crate::disruptor::event_processor::EventProcessor;
use crate::disruptor::exception_handler::ExceptionHandler;
use crate::disruptor::executor::Executor;
use crate::disruptor::ring_buffer::RingBuffer;
use crate::disruptor::sequence::{get_minimum_sequence, Sequence};
use crate::disruptor::sequence_barrier::SequenceBarrier;
use crate::disruptor::wait_strategy::WaitStrategy;
use crate::disruptor::work_processor::WorkProcessor;
use crate::disruptor::{DisruptorError, Result};

/// Competing consumers over one ring buffer
///
/// # Examples
/// ```
/// use batchring::disruptor::{
///     BlockingWaitStrategy, DefaultEventFactory, EventSink, IgnoreExceptionHandler, Result,
///     ThreadExecutor, WorkHandler, WorkerPool,
/// };
/// use std::sync::Arc;
///
/// struct Printer;
///
/// impl WorkHandler<i64> for Printer {
///     fn on_event(&mut self, event: &i64, _sequence: i64) -> Result<()> {
///         println!("{event}");
///         Ok(())
///     }
/// }
///
/// let pool = WorkerPool::with_new_ring_buffer(
///     DefaultEventFactory::<i64>::new(),
///     64,
///     Arc::new(BlockingWaitStrategy::new()),
///     Arc::new(IgnoreExceptionHandler::new()),
///     vec![Printer, Printer],
/// )
/// .unwrap();
///
/// let handles = pool.start(&ThreadExecutor::new("printer")).unwrap();
/// pool.ring_buffer().publish_event(|event, seq| *event = seq).unwrap();
/// pool.drain_and_halt();
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// ```
pub struct WorkerPool<T> {
    started: AtomicBool,
    work_sequence: Arc<Sequence>,
    ring_buffer: Arc<RingBuffer<T>>,
    work_processors: Vec<Arc<dyn EventProcessor>>,
}

impl<T> WorkerPool<T>
where
    T: Send + Sync + 'static,
{
    /// Create a pool with one worker per handler
    ///
    /// The worker sequences are not registered with the ring buffer; add
    /// [`get_worker_sequences`](Self::get_worker_sequences) as gating sequences
    /// before publishing.
    pub fn new<H>(
        ring_buffer: Arc<RingBuffer<T>>,
        sequence_barrier: Arc<dyn SequenceBarrier>,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        work_handlers: Vec<H>,
    ) -> Self
    where
        H: WorkHandler<T> + 'static,
    {
        let work_sequence = Arc::new(Sequence::default());
        let work_processors = work_handlers
            .into_iter()
            .map(|handler| {
                Arc::new(WorkProcessor::new(
                    Arc::clone(&ring_buffer) as Arc<dyn DataProvider<T> + Send + Sync>,
                    Arc::clone(&sequence_barrier),
                    handler,
                    Arc::clone(&exception_handler),
                    Arc::clone(&work_sequence),
                )) as Arc<dyn EventProcessor>
            })
            .collect();

        Self {
            started: AtomicBool::new(false),
            work_sequence,
            ring_buffer,
            work_processors,
        }
    }

    /// Create a pool over a new multi-producer ring buffer that is already gated
    /// on the workers
    pub fn with_new_ring_buffer<F, H>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        work_handlers: Vec<H>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
        H: WorkHandler<T> + 'static,
    {
        let ring_buffer = Arc::new(RingBuffer::create_multi_producer(
            event_factory,
            buffer_size,
            wait_strategy,
        )?);
        let barrier = ring_buffer.new_barrier(&[]);
        let pool = Self::new(ring_buffer, barrier, exception_handler, work_handlers);
        pool.ring_buffer
            .add_gating_sequences(&pool.get_worker_sequences());
        Ok(pool)
    }

    /// The sequence of every worker, followed by the shared work sequence
    pub fn get_worker_sequences(&self) -> Vec<Arc<Sequence>> {
        self.work_processors
            .iter()
            .map(|processor| Arc::clone(processor.sequence()))
            .chain(std::iter::once(Arc::clone(&self.work_sequence)))
            .collect()
    }

    /// Start every worker on `executor`
    ///
    /// Workers begin at the ring buffer's current cursor, so events published
    /// before the start are not processed.
    ///
    /// # Errors
    /// `InvalidOperation` if the pool is already running; any error from the
    /// executor. In that case the workers already handed to the executor are
    /// halted, the rest stay idle, and the pool can be started again once the
    /// returned handles have been dropped or joined.
    pub fn start<E: Executor>(&self, executor: &E) -> Result<Vec<E::Handle>> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(DisruptorError::InvalidOperation(
                "worker pool has already been started and cannot be restarted until halted",
            ));
        }

        let cursor = self.ring_buffer.cursor();
        self.work_sequence.set(cursor);
        for processor in &self.work_processors {
            processor.sequence().set(cursor);
        }

        let mut handles = Vec::with_capacity(self.work_processors.len());
        for (scheduled, processor) in self.work_processors.iter().enumerate() {
            let processor = Arc::clone(processor);
            let task = Box::new(move || {
                if let Err(e) = processor.run() {
                    warn!(error = %e, "worker did not run");
                }
            });

            match executor.execute(task) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(error = %e, scheduled, "executor rejected worker, halting pool");
                    for processor in &self.work_processors[..scheduled] {
                        processor.halt();
                    }
                    self.started.store(false, Ordering::Release);
                    return Err(e);
                }
            }
        }

        debug!(workers = handles.len(), cursor, "worker pool started");
        Ok(handles)
    }

    /// Wait until every published event has been processed, then halt
    ///
    /// Producers must have stopped publishing, or this may never return.
    pub fn drain_and_halt(&self) {
        let worker_sequences = self.get_worker_sequences();
        while self.ring_buffer.cursor() > get_minimum_sequence(&worker_sequences, i64::MAX) {
            thread::yield_now();
        }

        debug!(cursor = self.ring_buffer.cursor(), "worker pool drained");
        self.halt();
    }

    /// Halt every worker immediately
    ///
    /// Events published but not yet claimed are left unprocessed.
    pub fn halt(&self) {
        for processor in &self.work_processors {
            processor.halt();
        }
        self.started.store(false, Ordering::Release);
        debug!("worker pool halted");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn ring_buffer(&self) -> &Arc<RingBuffer<T>> {
        &self.ring_buffer
    }
}

impl<T> std::fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("started", &self.started)
            .field("work_sequence", &self.work_sequence)
            .field("workers", &self.work_processors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{
        BlockingWaitStrategy, DefaultEventFactory, EventSink, IgnoreExceptionHandler,
        ManagedThread, SpinWait, ThreadExecutor, YieldingWaitStrategy,
    };
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Hands tasks to threads until the `fail_at`th call, which is refused
    struct FlakyExecutor {
        threads: ThreadExecutor,
        calls: AtomicUsize,
        fail_at: usize,
    }

    impl Executor for FlakyExecutor {
        type Handle = ManagedThread;

        fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) -> Result<ManagedThread> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                return Err(DisruptorError::InvalidOperation("no thread available"));
            }
            self.threads.execute(task)
        }
    }

    struct Tally {
        count: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<i64>>>,
    }

    impl WorkHandler<i64> for Tally {
        fn on_event(&mut self, event: &i64, _sequence: i64) -> Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(*event);
            Ok(())
        }
    }

    fn pool(
        workers: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> (WorkerPool<i64>, Vec<Arc<AtomicUsize>>, Arc<Mutex<Vec<i64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let counts: Vec<_> = (0..workers).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let handlers = counts
            .iter()
            .map(|count| Tally {
                count: Arc::clone(count),
                seen: Arc::clone(&seen),
            })
            .collect();

        let pool = WorkerPool::with_new_ring_buffer(
            DefaultEventFactory::new(),
            32,
            wait_strategy,
            Arc::new(IgnoreExceptionHandler::new()),
            handlers,
        )
        .unwrap();
        (pool, counts, seen)
    }

    #[test]
    fn test_worker_sequences_include_work_sequence() {
        let (pool, _, _) = pool(3, Arc::new(BlockingWaitStrategy::new()));
        let sequences = pool.get_worker_sequences();

        assert_eq!(sequences.len(), 4);
        assert!(Arc::ptr_eq(&sequences[3], &pool.work_sequence));
        assert_eq!(pool.ring_buffer().sequencer().get_minimum_sequence(), -1);
    }

    #[test]
    fn test_each_event_handled_once() {
        let (pool, counts, seen) = pool(3, Arc::new(YieldingWaitStrategy::new()));
        let handles = pool.start(&ThreadExecutor::new("tally")).unwrap();
        assert!(pool.is_running());

        for value in 0..500 {
            pool.ring_buffer()
                .publish_event(|event, _| *event = value)
                .unwrap();
        }

        pool.drain_and_halt();
        for handle in handles {
            handle.join().unwrap();
        }

        let total: usize = counts.iter().map(|c| c.load(Ordering::SeqCst)).sum();
        assert_eq!(total, 500);

        let mut seen = seen.lock().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
        assert!(!pool.is_running());
    }

    #[test]
    fn test_start_twice_fails() {
        let (pool, _, _) = pool(2, Arc::new(BlockingWaitStrategy::new()));
        let executor = ThreadExecutor::new("twice");
        let handles = pool.start(&executor).unwrap();

        assert!(matches!(
            pool.start(&executor),
            Err(DisruptorError::InvalidOperation(_))
        ));

        pool.halt();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_start_skips_events_published_before() {
        let (pool, counts, _) = pool(1, Arc::new(BlockingWaitStrategy::new()));
        for value in 0..5 {
            pool.ring_buffer()
                .publish_event(|event, _| *event = value)
                .unwrap();
        }

        let handles = pool.start(&ThreadExecutor::new("late")).unwrap();
        assert_eq!(pool.get_worker_sequences()[0].get(), 4);

        pool.drain_and_halt();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counts[0].load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_restart_after_executor_failure() {
        let (pool, counts, seen) = pool(3, Arc::new(YieldingWaitStrategy::new()));
        let flaky = FlakyExecutor {
            threads: ThreadExecutor::new("flaky"),
            calls: AtomicUsize::new(0),
            fail_at: 1,
        };

        assert!(matches!(
            pool.start(&flaky),
            Err(DisruptorError::InvalidOperation(_))
        ));
        assert!(!pool.is_running());
        assert!(pool.work_processors.iter().all(|p| !p.is_running()));

        let handles = pool.start(&ThreadExecutor::new("retry")).unwrap();
        assert!(SpinWait::spin_until(
            || pool.work_processors.iter().all(|p| p.is_running()),
            Some(Duration::from_secs(5))
        ));

        for value in 0..40 {
            pool.ring_buffer()
                .publish_event(|event, _| *event = value)
                .unwrap();
        }

        let cursor = pool.ring_buffer().cursor();
        let sequences = pool.get_worker_sequences();
        assert!(SpinWait::spin_until(
            || get_minimum_sequence(&sequences, i64::MAX) >= cursor,
            Some(Duration::from_secs(5))
        ));

        pool.drain_and_halt();
        for handle in handles {
            handle.join().unwrap();
        }

        let total: usize = counts.iter().map(|c| c.load(Ordering::SeqCst)).sum();
        assert_eq!(total, 40);
        assert_eq!(seen.lock().len(), 40);
    }

    #[test]
    fn test_halt_right_after_start_stops_every_worker() {
        for round in 0..50 {
            let (pool, _, _) = pool(4, Arc::new(BlockingWaitStrategy::new()));
            let handles = pool.start(&ThreadExecutor::new("brief")).unwrap();
            pool.halt();

            let (sender, receiver) = mpsc::channel();
            std::thread::spawn(move || {
                for handle in handles {
                    handle.join().unwrap();
                }
                let _ = sender.send(());
            });
            assert!(
                receiver.recv_timeout(Duration::from_secs(10)).is_ok(),
                "a worker kept waiting after halt in round {round}"
            );
        }
    }
}
