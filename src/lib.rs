//! `BatchRing` - Sequence-Coordinated Ring Buffer
//!
//! A Rust implementation of the LMAX Disruptor core for low latency
//! inter-thread messaging: a pre-allocated ring of events, producers that
//! claim and publish sequence numbers, and consumers that follow those
//! sequences through barriers.
//!
//! The design follows <https://github.com/LMAX-Exchange/disruptor>.
//!
//! ## Features
//!
//! - **Lock-free publishing**: claims are atomic operations on padded sequences
//! - **Zero-allocation**: every event slot is created once, up front
//! - **Batching**: consumers take every available event in one step
//! - **Pluggable waiting**: blocking, spinning, yielding, sleeping and timeout strategies
//! - **Competing consumers**: a worker pool hands each event to exactly one worker
//! - **Polling**: non-blocking consumption for callers that own their loop
//!
//! ## Quick Start
//!
//! ```rust
//! use batchring::disruptor::{
//!     BatchEventProcessor, BlockingWaitStrategy, DataProvider, DefaultEventFactory,
//!     EventHandler, EventProcessor, EventSink, Result, RingBuffer,
//! };
//! use std::sync::Arc;
//! use std::thread;
//!
//! #[derive(Debug, Default)]
//! struct Trade {
//!     price: i64,
//! }
//!
//! struct Printer;
//!
//! impl EventHandler<Trade> for Printer {
//!     fn on_event(&mut self, event: &Trade, sequence: i64, _end_of_batch: bool) -> Result<()> {
//!         println!("trade {sequence} at {}", event.price);
//!         Ok(())
//!     }
//! }
//!
//! let ring_buffer = Arc::new(
//!     RingBuffer::create_single_producer(
//!         DefaultEventFactory::<Trade>::new(),
//!         1024,
//!         Arc::new(BlockingWaitStrategy::new()),
//!     )
//!     .unwrap(),
//! );
//!
//! let processor = Arc::new(BatchEventProcessor::new(
//!     Arc::clone(&ring_buffer) as Arc<dyn DataProvider<Trade> + Send + Sync>,
//!     ring_buffer.new_barrier(&[]),
//!     Printer,
//! ));
//! ring_buffer.add_gating_sequences(&[Arc::clone(processor.sequence())]);
//!
//! let consumer = {
//!     let processor = Arc::clone(&processor);
//!     thread::spawn(move || processor.run())
//! };
//!
//! for price in [100, 101, 99] {
//!     ring_buffer.publish_event(|trade, _sequence| trade.price = price).unwrap();
//! }
//!
//! while processor.sequence().get() < ring_buffer.cursor() {
//!     thread::yield_now();
//! }
//! processor.halt();
//! consumer.join().unwrap().unwrap();
//! ```
//!
//! ## Architecture
//!
//! - **`RingBuffer`**: pre-allocated circular buffer of events
//! - **`Sequence`**: padded atomic counter recording progress
//! - **`Sequencer`**: hands out sequences to one or many producers
//! - **`SequenceBarrier`**: lets a consumer wait for producers and upstream consumers
//! - **`WaitStrategy`**: how a consumer waits
//! - **`BatchEventProcessor`**: runs an `EventHandler` over every event
//! - **`WorkerPool`**: runs `WorkHandler`s that share the events between them
//! - **`EventPoller`**: consumes on the caller's thread without blocking

pub mod disruptor;

// Re-export the main types for convenience
pub use disruptor::{
    // Utility functions
    is_power_of_two,
    // Event processing
    BatchEventProcessor,
    // Wait strategies
    BlockingWaitStrategy,
    BusySpinWaitStrategy,
    DataProvider,
    DefaultEventFactory,
    DisruptorConfig,
    // Error types
    DisruptorError,
    EventFactory,
    EventHandler,
    EventPoller,
    EventProcessor,
    EventSink,
    ExceptionHandler,
    MultiProducerSequencer,
    PollState,
    ProducerType,
    Result,
    // Core types
    RingBuffer,
    Sequence,
    SequenceBarrier,
    Sequenced,
    Sequencer,
    SingleProducerSequencer,
    SleepingWaitStrategy,
    TimeoutBlockingWaitStrategy,
    WaitError,
    WaitStrategy,
    WorkHandler,
    WorkerPool,
    YieldingWaitStrategy,
    // Constants
    INITIAL_CURSOR_VALUE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the `BatchRing` library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}
