//! Integration tests for the consumer side: batch processors, worker pools,
//! pollers and barrier alerts across every wait strategy

use batchring::disruptor::{
    BatchEventProcessor, DataProvider, DefaultEventFactory, DisruptorError, EventHandler,
    EventProcessor, EventSink, Executor, IgnoreExceptionHandler, PollState, Result, RingBuffer,
    Sequence, SpinWait, ThreadExecutor, WaitError, WaitStrategy, WaitStrategyConfig, WorkHandler,
    WorkerPool, YieldingWaitStrategy,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Debug, Default)]
struct PriceEvent {
    value: i64,
}

fn price_buffer(
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
) -> Arc<RingBuffer<PriceEvent>> {
    Arc::new(
        RingBuffer::create_multi_producer(
            DefaultEventFactory::<PriceEvent>::new(),
            buffer_size,
            wait_strategy,
        )
        .unwrap(),
    )
}

fn data_provider(
    ring_buffer: &Arc<RingBuffer<PriceEvent>>,
) -> Arc<dyn DataProvider<PriceEvent> + Send + Sync> {
    Arc::clone(ring_buffer) as Arc<dyn DataProvider<PriceEvent> + Send + Sync>
}

/// Records what a batch processor delivered
#[derive(Default, Clone)]
struct Trace {
    deliveries: Arc<Mutex<Vec<(i64, i64, bool)>>>,
    batch_sizes: Arc<Mutex<Vec<i64>>>,
}

struct TracingHandler {
    trace: Trace,
    upstream: Option<Arc<Sequence>>,
    fail_every: Option<i64>,
}

impl EventHandler<PriceEvent> for TracingHandler {
    fn on_event(&mut self, event: &PriceEvent, sequence: i64, end_of_batch: bool) -> Result<()> {
        if let Some(upstream) = &self.upstream {
            assert!(upstream.get() >= sequence, "consumed {sequence} before upstream");
        }
        if let Some(every) = self.fail_every {
            if sequence % every == 0 {
                return Err(DisruptorError::handler(format!("rejected {sequence}")));
            }
        }
        self.trace
            .deliveries
            .lock()
            .push((event.value, sequence, end_of_batch));
        Ok(())
    }

    fn on_batch_start(&mut self, batch_size: i64) {
        self.trace.batch_sizes.lock().push(batch_size);
    }
}

fn wait_until(condition: impl FnMut() -> bool) {
    assert!(
        SpinWait::spin_until(condition, Some(TIMEOUT)),
        "condition not reached in time"
    );
}

#[test]
fn test_dependent_processors_follow_in_order() {
    init_tracing();
    const EVENTS: i64 = 2_000;

    let ring_buffer = price_buffer(64, Arc::new(YieldingWaitStrategy::new()));
    let first_trace = Trace::default();
    let second_trace = Trace::default();

    let first = Arc::new(BatchEventProcessor::new(
        data_provider(&ring_buffer),
        ring_buffer.new_barrier(&[]),
        TracingHandler {
            trace: first_trace.clone(),
            upstream: None,
            fail_every: None,
        },
    ));
    let second = Arc::new(BatchEventProcessor::new(
        data_provider(&ring_buffer),
        ring_buffer.new_barrier(&[Arc::clone(first.sequence())]),
        TracingHandler {
            trace: second_trace.clone(),
            upstream: Some(Arc::clone(first.sequence())),
            fail_every: None,
        },
    ));
    ring_buffer.add_gating_sequences(&[Arc::clone(second.sequence())]);

    let executor = ThreadExecutor::new("pipeline");
    let handles: Vec<_> = [
        Arc::clone(&first) as Arc<dyn EventProcessor>,
        Arc::clone(&second) as Arc<dyn EventProcessor>,
    ]
    .into_iter()
    .map(|processor| {
        executor
            .execute(Box::new(move || processor.run().unwrap()))
            .unwrap()
    })
    .collect();

    let producers: Vec<_> = (0..2)
        .map(|_| {
            let ring_buffer = Arc::clone(&ring_buffer);
            thread::spawn(move || {
                for _ in 0..EVENTS / 2 {
                    ring_buffer
                        .publish_event(|event, sequence| event.value = sequence * 3)
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    wait_until(|| second.sequence().get() == EVENTS - 1);
    first.halt();
    second.halt();
    for handle in handles {
        handle.join().unwrap();
    }

    for trace in [&first_trace, &second_trace] {
        let deliveries = trace.deliveries.lock();
        let sequences: Vec<i64> = deliveries.iter().map(|d| d.1).collect();
        assert_eq!(sequences, (0..EVENTS).collect::<Vec<_>>());
        assert!(deliveries.iter().all(|(value, seq, _)| *value == seq * 3));

        // end_of_batch marks exactly the last event of each announced batch
        let batch_sizes = trace.batch_sizes.lock();
        assert_eq!(batch_sizes.iter().sum::<i64>(), EVENTS);
        let mut position = 0usize;
        for size in batch_sizes.iter() {
            let batch = &deliveries[position..position + *size as usize];
            let (last, rest) = batch.split_last().unwrap();
            assert!(last.2);
            assert!(rest.iter().all(|d| !d.2));
            position += *size as usize;
        }
    }
}

#[test]
fn test_failing_events_do_not_stall_processor() {
    init_tracing();
    let ring_buffer = price_buffer(16, Arc::new(YieldingWaitStrategy::new()));
    let trace = Trace::default();
    let processor = Arc::new(BatchEventProcessor::new(
        data_provider(&ring_buffer),
        ring_buffer.new_barrier(&[]),
        TracingHandler {
            trace: trace.clone(),
            upstream: None,
            fail_every: Some(10),
        },
    ));
    processor.set_exception_handler(Arc::new(IgnoreExceptionHandler::new()));
    ring_buffer.add_gating_sequences(&[Arc::clone(processor.sequence())]);

    let handle = {
        let processor = Arc::clone(&processor);
        ThreadExecutor::new("failing")
            .execute(Box::new(move || processor.run().unwrap()))
            .unwrap()
    };

    for _ in 0..100 {
        ring_buffer.publish_event(|event, seq| event.value = seq).unwrap();
    }

    wait_until(|| processor.sequence().get() == 99);
    processor.halt();
    handle.join().unwrap();

    let delivered: Vec<i64> = trace.deliveries.lock().iter().map(|d| d.1).collect();
    let expected: Vec<i64> = (0..100).filter(|s| s % 10 != 0).collect();
    assert_eq!(delivered, expected);
}

struct CountingWorker {
    processed: Arc<AtomicUsize>,
    values: Arc<Mutex<Vec<i64>>>,
}

impl WorkHandler<PriceEvent> for CountingWorker {
    fn on_event(&mut self, event: &PriceEvent, _sequence: i64) -> Result<()> {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.values.lock().push(event.value);
        Ok(())
    }
}

#[test]
fn test_worker_pool_delivers_each_event_once() {
    init_tracing();
    const PRODUCERS: i64 = 3;
    const EVENTS_PER_PRODUCER: i64 = 1_000;
    const WORKERS: usize = 4;

    let values = Arc::new(Mutex::new(Vec::new()));
    let counters: Vec<_> = (0..WORKERS).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let workers = counters
        .iter()
        .map(|processed| CountingWorker {
            processed: Arc::clone(processed),
            values: Arc::clone(&values),
        })
        .collect();

    let pool = WorkerPool::with_new_ring_buffer(
        DefaultEventFactory::<PriceEvent>::new(),
        128,
        Arc::new(YieldingWaitStrategy::new()),
        Arc::new(IgnoreExceptionHandler::new()),
        workers,
    )
    .unwrap();
    let handles = pool.start(&ThreadExecutor::new("worker")).unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let ring_buffer = Arc::clone(pool.ring_buffer());
            thread::spawn(move || {
                for i in 0..EVENTS_PER_PRODUCER {
                    ring_buffer
                        .publish_event(|event, _| event.value = producer * EVENTS_PER_PRODUCER + i)
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    pool.drain_and_halt();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = PRODUCERS * EVENTS_PER_PRODUCER;
    let processed: usize = counters.iter().map(|c| c.load(Ordering::Relaxed)).sum();
    assert_eq!(processed as i64, total);

    let mut values = values.lock().clone();
    values.sort_unstable();
    assert_eq!(values, (0..total).collect::<Vec<_>>());
}

#[test]
fn test_poller_idle_processing_gating() {
    let ring_buffer = price_buffer(8, Arc::new(YieldingWaitStrategy::new()));
    let poller = ring_buffer.new_poller(&[]);
    ring_buffer.add_gating_sequences(&[Arc::clone(poller.sequence())]);

    let mut seen = Vec::new();
    let poll = |seen: &mut Vec<i64>| {
        poller
            .poll(|event, _, _| {
                seen.push(event.value);
                Ok(true)
            })
            .unwrap()
    };

    assert_eq!(poll(&mut seen), PollState::Idle);

    ring_buffer.publish_event(|event, _| event.value = 42).unwrap();
    assert_eq!(poll(&mut seen), PollState::Processing);
    assert_eq!(seen, vec![42]);
    assert_eq!(poll(&mut seen), PollState::Idle);

    // A second poller gated on a consumer that has not caught up
    let upstream = Arc::new(Sequence::default());
    let gated = ring_buffer.new_poller(&[Arc::clone(&upstream)]);
    let state = gated.poll(|_, _, _| Ok(true)).unwrap();
    assert_eq!(state, PollState::Gating);

    upstream.set(0);
    assert_eq!(gated.poll(|_, _, _| Ok(true)).unwrap(), PollState::Processing);
}

#[test]
fn test_alert_interrupts_wait_for_every_strategy() {
    init_tracing();
    let strategies = [
        WaitStrategyConfig::Blocking,
        WaitStrategyConfig::BusySpin,
        WaitStrategyConfig::Yielding { spin_tries: 100 },
        WaitStrategyConfig::Sleeping {
            retries: 200,
            sleep_nanos: 100,
        },
        WaitStrategyConfig::SpinWait,
        WaitStrategyConfig::TimeoutBlocking { timeout_ms: 60_000 },
    ];

    for config in strategies {
        let ring_buffer = price_buffer(8, config.build());
        let barrier = ring_buffer.new_barrier(&[]);
        let (sender, receiver) = mpsc::channel();

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                sender.send(barrier.wait_for(0)).unwrap();
            })
        };

        // Give the waiter time to block before alerting
        thread::sleep(Duration::from_millis(20));
        barrier.alert();

        let outcome = receiver
            .recv_timeout(TIMEOUT)
            .unwrap_or_else(|_| panic!("{config:?} did not wake on alert"));
        assert_eq!(outcome, Err(WaitError::Alerted), "{config:?}");
        waiter.join().unwrap();
    }
}
