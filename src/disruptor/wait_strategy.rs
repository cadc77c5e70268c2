//! Wait Strategy Implementation
//!
//! Wait strategies decide how a consumer behaves while the sequence it needs
//! has not been published yet, and how producers wake consumers that went to
//! sleep. Every strategy checks the barrier's alert on each iteration so that
//! halting a processor interrupts the wait promptly.

use parking_lot::{Condvar, Mutex};
use std::hint;
use std::thread;
use std::time::{Duration, Instant};

use crate::disruptor::fixed_sequence_group::DependentSequence;
use crate::disruptor::sequence::Sequence;
use crate::disruptor::sequence_barrier::SequenceBarrier;
use crate::disruptor::spin_wait::SpinWait;
use crate::disruptor::WaitError;

const DEFAULT_SPIN_TRIES: u32 = 100;
const DEFAULT_RETRIES: u32 = 200;
const DEFAULT_SLEEP: Duration = Duration::ZERO;

/// Strategy for waiting for events to become available
///
/// This trait defines how consumers wait for new events in the ring buffer.
/// Different strategies provide different trade-offs between CPU usage,
/// latency, and throughput.
pub trait WaitStrategy: Send + Sync + std::fmt::Debug {
    /// Wait until `dependent` reaches `sequence`
    ///
    /// # Arguments
    /// * `sequence` - The sequence to wait for
    /// * `cursor` - The producer cursor, which blocking strategies sleep on
    /// * `dependent` - The sequence the consumer actually depends on
    /// * `barrier` - Checked for alerts on every iteration
    ///
    /// # Returns
    /// The observed value of `dependent`, which may be higher than requested
    ///
    /// # Errors
    /// [`WaitError::Alerted`] when the barrier is alerted, and
    /// [`WaitError::TimedOut`] for strategies with a deadline
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64, WaitError>;

    /// Wake every thread sleeping inside [`wait_for`](Self::wait_for)
    ///
    /// Producers call this after each publish. Strategies that never sleep
    /// implement it as a no-op.
    fn signal_all_when_blocking(&self);
}

/// Mutex and condition variable
///
/// Waiters sleep on the condition variable until the producer cursor reaches
/// the requested sequence, then spin until the dependent sequence catches up.
/// Lowest CPU usage, highest latency. Producers must signal on every publish.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    /// Create a new blocking wait strategy
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64, WaitError> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                barrier.check_alert()?;
                self.condvar.wait(&mut guard);
            }
        }

        let mut available_sequence;
        while {
            available_sequence = dependent.get();
            available_sequence < sequence
        } {
            barrier.check_alert()?;
            hint::spin_loop();
        }

        Ok(available_sequence)
    }

    fn signal_all_when_blocking(&self) {
        // Taking the lock orders the notify after any waiter's alert check.
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Blocking wait with a deadline
///
/// Behaves like [`BlockingWaitStrategy`] but gives up with
/// [`WaitError::TimedOut`] once the configured timeout elapses without the
/// cursor reaching the requested sequence.
#[derive(Debug)]
pub struct TimeoutBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64, WaitError> {
        if cursor.get() < sequence {
            let deadline = Instant::now() + self.timeout;
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                barrier.check_alert()?;
                if self.condvar.wait_until(&mut guard, deadline).timed_out()
                    && cursor.get() < sequence
                {
                    return Err(WaitError::TimedOut);
                }
            }
        }

        let mut available_sequence;
        while {
            available_sequence = dependent.get();
            available_sequence < sequence
        } {
            barrier.check_alert()?;
            hint::spin_loop();
        }

        Ok(available_sequence)
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Tight loop on the dependent sequence
///
/// Lowest latency, but burns the waiting core at 100%. Only use it when
/// consumer threads have dedicated cores.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64, WaitError> {
        let mut available_sequence;
        while {
            available_sequence = dependent.get();
            available_sequence < sequence
        } {
            barrier.check_alert()?;
            hint::spin_loop();
        }
        Ok(available_sequence)
    }

    fn signal_all_when_blocking(&self) {}
}

/// Spin for a fixed number of tries, then yield the thread on every iteration
#[derive(Debug, Clone, Copy)]
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    /// Spin 100 times before yielding
    pub fn new() -> Self {
        Self::with_spin_tries(DEFAULT_SPIN_TRIES)
    }

    pub fn with_spin_tries(spin_tries: u32) -> Self {
        Self { spin_tries }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64, WaitError> {
        let mut counter = self.spin_tries;
        let mut available_sequence;

        while {
            available_sequence = dependent.get();
            available_sequence < sequence
        } {
            barrier.check_alert()?;
            if counter == 0 {
                thread::yield_now();
            } else {
                counter -= 1;
            }
        }

        Ok(available_sequence)
    }

    fn signal_all_when_blocking(&self) {}
}

/// Spin, then yield, then sleep
///
/// A retry counter starts at `retries`. Above 100 the waiter spins, from
/// 100 down to 1 it yields, and once exhausted it sleeps for `sleep` on every
/// iteration. A good compromise for consumers that can tolerate latency
/// spikes in exchange for idle CPU.
#[derive(Debug, Clone, Copy)]
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep: Duration,
}

impl SleepingWaitStrategy {
    pub fn new() -> Self {
        Self::with_retries_and_sleep(DEFAULT_RETRIES, DEFAULT_SLEEP)
    }

    pub fn with_retries(retries: u32) -> Self {
        Self::with_retries_and_sleep(retries, DEFAULT_SLEEP)
    }

    pub fn with_retries_and_sleep(retries: u32, sleep: Duration) -> Self {
        Self { retries, sleep }
    }

    fn apply_wait_method(
        &self,
        barrier: &dyn SequenceBarrier,
        counter: u32,
    ) -> Result<u32, WaitError> {
        barrier.check_alert()?;

        if counter > 100 {
            Ok(counter - 1)
        } else if counter > 0 {
            thread::yield_now();
            Ok(counter - 1)
        } else {
            thread::sleep(self.sleep);
            Ok(counter)
        }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64, WaitError> {
        let mut counter = self.retries;
        let mut available_sequence;

        while {
            available_sequence = dependent.get();
            available_sequence < sequence
        } {
            counter = self.apply_wait_method(barrier, counter)?;
        }

        Ok(available_sequence)
    }

    fn signal_all_when_blocking(&self) {}
}

/// Exponential backoff through [`SpinWait`] between checks
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinWaitWaitStrategy;

impl SpinWaitWaitStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for SpinWaitWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &DependentSequence,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64, WaitError> {
        let mut spinner = SpinWait::new();
        let mut available_sequence;

        while {
            available_sequence = dependent.get();
            available_sequence < sequence
        } {
            barrier.check_alert()?;
            spinner.spin_once();
        }

        Ok(available_sequence)
    }

    fn signal_all_when_blocking(&self) {}
}
