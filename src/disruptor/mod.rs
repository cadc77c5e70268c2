//! BatchRing Disruptor Core
//!
//! This module provides the sequence-coordinated ring buffer: the sequences,
//! sequencers, barriers, wait strategies and consumer loops that together
//! implement lock-free inter-thread messaging.

pub mod config;
pub mod core_interfaces;
pub mod event_factory;
pub mod event_handler;
pub mod event_poller;
pub mod event_processor;
pub mod exception_handler;
pub mod executor;
pub mod fixed_sequence_group;
pub mod producer_type;
pub mod ring_buffer;
pub mod sequence;
pub mod sequence_barrier;
pub mod sequence_group;
pub mod sequencer;
pub mod spin_wait;
pub mod thread_management;
pub mod wait_strategy;
pub mod work_processor;
pub mod worker_pool;


pub use config::{DisruptorConfig, WaitStrategyConfig};
pub use core_interfaces::{Cursored, DataProvider, EventSink, Sequenced};
pub use event_factory::{event_factory, ClosureEventFactory, DefaultEventFactory, EventFactory};
pub use event_handler::{
    ClosureEventHandler, EventHandler, EventReleaser, NoOpEventHandler, WorkHandler,
};
pub use event_poller::{EventPoller, PollState};
pub use event_processor::{BatchEventProcessor, EventProcessor};
pub use exception_handler::{ExceptionHandler, FatalExceptionHandler, IgnoreExceptionHandler};
pub use executor::{Executor, TaskHandle};
pub use fixed_sequence_group::{DependentSequence, FixedSequenceGroup};
pub use producer_type::ProducerType;
pub use ring_buffer::RingBuffer;
pub use sequence::{get_minimum_sequence, Sequence};
pub use sequence_barrier::{ProcessingSequenceBarrier, SequenceBarrier};
pub use sequence_group::SequenceGroup;
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
pub use spin_wait::SpinWait;
pub use thread_management::{ManagedThread, ThreadBuilder, ThreadExecutor};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy, SpinWaitWaitStrategy,
    TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};
pub use work_processor::WorkProcessor;
pub use worker_pool::WorkerPool;

/// The initial cursor value for sequences
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Errors that can occur in the Disruptor
#[derive(Debug, thiserror::Error)]
pub enum DisruptorError {
    #[error("Buffer size must be a power of 2 and at least 1, got: {0}")]
    InvalidBufferSize(usize),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient capacity in the ring buffer")]
    InsufficientCapacity,

    #[error("Invalid operation: {0}")]
    InvalidOperation(&'static str),

    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("Barrier alerted")]
    Alert,

    #[error("Timeout waiting for sequence")]
    Timeout,

    #[error("Event handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DisruptorError {
    /// Wrap an arbitrary user error raised from a handler callback
    pub fn handler<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Handler(error.into())
    }
}

pub type Result<T> = std::result::Result<T, DisruptorError>;

/// Outcome of a wait that did not reach the requested sequence
///
/// Waiting is the one place where control flow is interrupted on purpose, so
/// it gets its own narrow error type: a wait either yields an available
/// sequence, or it was alerted, or its deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("Barrier alerted")]
    Alerted,

    #[error("Timeout waiting for sequence")]
    TimedOut,
}

impl From<WaitError> for DisruptorError {
    fn from(error: WaitError) -> Self {
        match error {
            WaitError::Alerted => DisruptorError::Alert,
            WaitError::TimedOut => DisruptorError::Timeout,
        }
    }
}

/// Utility function to check if a number is a power of 2
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Base-2 logarithm of a power-of-two buffer size
pub(crate) fn log2(n: usize) -> u32 {
    n.trailing_zeros()
}
