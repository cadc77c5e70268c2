//! Exponential backoff for short waits
//!
//! [`SpinWait`] is not a wait strategy on its own. Sequencers use it while
//! waiting for consumers to free capacity, and [`SpinWaitWaitStrategy`] uses it
//! between checks of the dependent sequence.
//!
//! [`SpinWaitWaitStrategy`]: crate::disruptor::SpinWaitWaitStrategy

use std::hint;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

const YIELD_THRESHOLD: u32 = 10;
const SLEEP_0_EVERY_HOW_MANY_TIMES: u32 = 5;
const SLEEP_1_EVERY_HOW_MANY_TIMES: u32 = 20;

fn is_single_processor() -> bool {
    static SINGLE: OnceLock<bool> = OnceLock::new();
    *SINGLE.get_or_init(|| {
        thread::available_parallelism()
            .map(|n| n.get() == 1)
            .unwrap_or(false)
    })
}

/// Backoff state for one waiting episode
///
/// The first [`YIELD_THRESHOLD`] calls to [`spin_once`](Self::spin_once) busy-spin
/// for `4 << count` pause hints. After that every call gives up the CPU:
/// every 20th call sleeps for 1ms, every 5th sleeps for 0ms, and the rest
/// yield. On a single-processor machine spinning is pointless, so it yields
/// from the first call.
#[derive(Debug, Default, Clone)]
pub struct SpinWait {
    count: u32,
}

impl SpinWait {
    /// Create a fresh backoff
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times [`spin_once`](Self::spin_once) has been called since the last reset
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Whether the next call to [`spin_once`](Self::spin_once) gives up the CPU
    pub fn next_spin_will_yield(&self) -> bool {
        self.count > YIELD_THRESHOLD || is_single_processor()
    }

    /// Perform one backoff step
    pub fn spin_once(&mut self) {
        if self.next_spin_will_yield() {
            let yields_so_far = if self.count >= YIELD_THRESHOLD {
                self.count - YIELD_THRESHOLD
            } else {
                self.count
            };

            if yields_so_far % SLEEP_1_EVERY_HOW_MANY_TIMES == SLEEP_1_EVERY_HOW_MANY_TIMES - 1 {
                thread::sleep(Duration::from_millis(1));
            } else if yields_so_far % SLEEP_0_EVERY_HOW_MANY_TIMES
                == SLEEP_0_EVERY_HOW_MANY_TIMES - 1
            {
                thread::sleep(Duration::ZERO);
            } else {
                thread::yield_now();
            }
        } else {
            for _ in 0..(4u32 << self.count) {
                hint::spin_loop();
            }
        }

        self.count = if self.count == u32::MAX {
            YIELD_THRESHOLD
        } else {
            self.count + 1
        };
    }

    /// Start a new waiting episode
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Spin until `condition` holds or `timeout` elapses
    ///
    /// With `timeout == None` this spins until the condition holds.
    ///
    /// # Returns
    /// True if the condition was satisfied, false on timeout
    pub fn spin_until<F>(mut condition: F, timeout: Option<Duration>) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut spinner = SpinWait::new();

        while !condition() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
            spinner.spin_once();
        }
        true
    }
}
