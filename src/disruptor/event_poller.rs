//! Event Poller
//!
//! Pull-style consumption: instead of a processor thread waiting on a barrier,
//! the caller asks the poller to handle whatever is available right now.

use std::sync::Arc;

use crate::disruptor::core_interfaces::DataProvider;
use crate::disruptor::fixed_sequence_group::DependentSequence;
use crate::disruptor::sequence::Sequence;
use crate::disruptor::sequencer::Sequencer;
use crate::disruptor::Result;

/// Outcome of one [`EventPoller::poll`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Events were handed to the handler
    Processing,
    /// Events are published but a gating sequence holds them back
    Gating,
    /// Nothing has been published past the poller's sequence
    Idle,
}

/// Non-blocking consumer over a ring buffer
///
/// # Examples
/// ```
/// use batchring::disruptor::{BusySpinWaitStrategy, DefaultEventFactory, EventSink, PollState, RingBuffer};
/// use std::sync::Arc;
///
/// let ring_buffer = Arc::new(
///     RingBuffer::create_single_producer(
///         DefaultEventFactory::<i64>::new(),
///         8,
///         Arc::new(BusySpinWaitStrategy::new()),
///     )
///     .unwrap(),
/// );
/// let poller = ring_buffer.new_poller(&[]);
/// ring_buffer.add_gating_sequences(&[Arc::clone(poller.sequence())]);
///
/// ring_buffer.publish_event(|event, _| *event = 7).unwrap();
///
/// let mut total = 0;
/// let state = poller
///     .poll(|event, _sequence, _end_of_batch| {
///         total += *event;
///         Ok(true)
///     })
///     .unwrap();
/// assert_eq!(state, PollState::Processing);
/// assert_eq!(total, 7);
/// ```
pub struct EventPoller<T> {
    data_provider: Arc<dyn DataProvider<T> + Send + Sync>,
    sequencer: Arc<dyn Sequencer>,
    sequence: Arc<Sequence>,
    gating_sequence: DependentSequence,
}

/// Stores the last handled sequence when the poll returns or unwinds
struct ProgressGuard<'a> {
    sequence: &'a Sequence,
    processed: i64,
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.sequence.set(self.processed);
    }
}

impl<T> EventPoller<T> {
    pub fn new(
        data_provider: Arc<dyn DataProvider<T> + Send + Sync>,
        sequencer: Arc<dyn Sequencer>,
        sequence: Arc<Sequence>,
        gating_sequence: DependentSequence,
    ) -> Self {
        Self {
            data_provider,
            sequencer,
            sequence,
            gating_sequence,
        }
    }

    /// The poller's progress sequence
    ///
    /// Register it as a gating sequence so producers do not overwrite events
    /// the poller has not handled.
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    /// Hand every event available right now to `handler`
    ///
    /// The handler returns `Ok(true)` to keep going or `Ok(false)` to stop
    /// after the current event. Progress is recorded up to the last event the
    /// handler completed, even when a later event fails or panics. A failed
    /// event is handed out again by the next poll.
    ///
    /// # Errors
    /// The first error returned by `handler`
    pub fn poll<F>(&self, mut handler: F) -> Result<PollState>
    where
        F: FnMut(&T, i64, bool) -> Result<bool>,
    {
        let current_sequence = self.sequence.get();
        let mut next_sequence = current_sequence + 1;
        let available_sequence = self
            .sequencer
            .get_highest_published_sequence(next_sequence, self.gating_sequence.get());

        if next_sequence <= available_sequence {
            let mut progress = ProgressGuard {
                sequence: &self.sequence,
                processed: current_sequence,
            };

            loop {
                let event = self.data_provider.get(next_sequence);
                let process_next =
                    handler(event, next_sequence, next_sequence == available_sequence)?;
                progress.processed = next_sequence;
                next_sequence += 1;
                if !process_next || next_sequence > available_sequence {
                    break;
                }
            }

            Ok(PollState::Processing)
        } else if self.sequencer.get_cursor() >= next_sequence {
            Ok(PollState::Gating)
        } else {
            Ok(PollState::Idle)
        }
    }
}

impl<T> std::fmt::Debug for EventPoller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPoller")
            .field("sequence", &self.sequence)
            .field("gating_sequence", &self.gating_sequence)
            .finish()
    }
}
