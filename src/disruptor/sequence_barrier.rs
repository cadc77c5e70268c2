//! Sequence Barrier Implementation
//!
//! A barrier is what a consumer waits on: it combines the producer cursor, the
//! wait strategy and the consumer's upstream dependencies into a single
//! "how far may I read" query, plus the alert flag used to stop the consumer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::disruptor::fixed_sequence_group::DependentSequence;
use crate::disruptor::sequence::Sequence;
use crate::disruptor::sequencer::Sequencer;
use crate::disruptor::wait_strategy::WaitStrategy;
use crate::disruptor::WaitError;

/// Coordination barrier for consumers
pub trait SequenceBarrier: Send + Sync {
    /// Wait for the given sequence to become available
    ///
    /// # Returns
    /// The highest sequence that may be read, which may be higher than
    /// requested. It may also be lower than requested if the wait strategy
    /// returned early; callers then wait again.
    ///
    /// # Errors
    /// [`WaitError::Alerted`] if the barrier is alerted before or during the
    /// wait, [`WaitError::TimedOut`] if the wait strategy has a deadline
    fn wait_for(&self, sequence: i64) -> Result<i64, WaitError>;

    /// Current value of the sequence this barrier depends on
    fn cursor(&self) -> i64;

    /// Check if this barrier has been alerted
    fn is_alerted(&self) -> bool;

    /// Raise the alert and wake any thread blocked in [`wait_for`](Self::wait_for)
    fn alert(&self);

    /// Clear the alert status
    fn clear_alert(&self);

    /// Fail with [`WaitError::Alerted`] if the alert is raised
    fn check_alert(&self) -> Result<(), WaitError>;
}

/// Barrier over a sequencer and an optional set of upstream consumers
///
/// With no dependencies the barrier tracks the producer cursor. Otherwise it
/// tracks the slowest dependency, so a consumer never overtakes the consumers
/// it follows.
#[derive(Debug)]
pub struct ProcessingSequenceBarrier {
    sequencer: Arc<dyn Sequencer>,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    dependent: DependentSequence,
    alerted: AtomicBool,
}

impl ProcessingSequenceBarrier {
    /// Create a barrier gating on `dependent_sequences`, or on the cursor of
    /// `sequencer` if there are none
    pub fn new(sequencer: Arc<dyn Sequencer>, dependent_sequences: &[Arc<Sequence>]) -> Self {
        let cursor = Arc::clone(sequencer.cursor_sequence());
        let wait_strategy = Arc::clone(sequencer.wait_strategy());
        let dependent = DependentSequence::from_dependencies(&cursor, dependent_sequences);

        Self {
            sequencer,
            wait_strategy,
            cursor,
            dependent,
            alerted: AtomicBool::new(false),
        }
    }
}

impl SequenceBarrier for ProcessingSequenceBarrier {
    fn wait_for(&self, sequence: i64) -> Result<i64, WaitError> {
        self.check_alert()?;

        let available_sequence =
            self.wait_strategy
                .wait_for(sequence, &self.cursor, &self.dependent, self)?;

        if available_sequence < sequence {
            return Ok(available_sequence);
        }

        Ok(self
            .sequencer
            .get_highest_published_sequence(sequence, available_sequence))
    }

    fn cursor(&self) -> i64 {
        self.dependent.get()
    }

    fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn clear_alert(&self) {
        // Acquire pairs with the release in `alert`, so whatever the alerting
        // thread wrote first is visible to the clearing one
        self.alerted.swap(false, Ordering::AcqRel);
    }

    fn check_alert(&self) -> Result<(), WaitError> {
        if self.is_alerted() {
            Err(WaitError::Alerted)
        } else {
            Ok(())
        }
    }
}
