//! Ring Buffer Implementation
//!
//! The ring buffer owns the pre-allocated event slots and the sequencer that
//! coordinates access to them. Slots are shared by producers and consumers
//! without locks: a slot is written only by the producer that claimed its
//! sequence, and read only after a barrier has confirmed it was published.

use std::cell::UnsafeCell;
use std::sync::Arc;

use crate::disruptor::config::DisruptorConfig;
use crate::disruptor::core_interfaces::{Cursored, DataProvider, EventSink, Sequenced};
use crate::disruptor::event_poller::EventPoller;
use crate::disruptor::fixed_sequence_group::DependentSequence;
use crate::disruptor::sequence::Sequence;
use crate::disruptor::sequence_barrier::{ProcessingSequenceBarrier, SequenceBarrier};
use crate::disruptor::sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
use crate::disruptor::wait_strategy::WaitStrategy;
use crate::disruptor::{DisruptorError, EventFactory, ProducerType, Result};

/// Publishes the claimed range when dropped, including during unwinding
struct PublishOnDrop<'a> {
    sequencer: &'a dyn Sequencer,
    lo: i64,
    hi: i64,
}

impl Drop for PublishOnDrop<'_> {
    fn drop(&mut self) {
        if self.lo == self.hi {
            self.sequencer.publish(self.hi);
        } else {
            self.sequencer.publish_range(self.lo, self.hi);
        }
    }
}

/// Pre-allocated circular buffer of events
///
/// `index = sequence & (buffer_size - 1)`, so every sequence maps to a slot
/// and no bounds check can fail.
///
/// # Type Parameters
/// * `T` - The event type stored in the buffer
pub struct RingBuffer<T> {
    slots: Box<[UnsafeCell<T>]>,
    index_mask: i64,
    sequencer: Arc<dyn Sequencer>,
}

impl<T> RingBuffer<T> {
    /// Create a ring buffer over an existing sequencer
    ///
    /// The buffer has `sequencer.buffer_size()` slots, each filled by `event_factory`.
    pub fn new<F>(event_factory: F, sequencer: Arc<dyn Sequencer>) -> Self
    where
        F: EventFactory<T>,
    {
        let buffer_size = sequencer.buffer_size();
        let slots: Box<[UnsafeCell<T>]> = (0..buffer_size)
            .map(|_| UnsafeCell::new(event_factory.new_instance()))
            .collect();

        Self {
            slots,
            index_mask: buffer_size as i64 - 1,
            sequencer,
        }
    }

    /// Create a ring buffer with the sequencer matching `producer_type`
    ///
    /// # Errors
    /// `InvalidBufferSize` unless `buffer_size` is a power of two
    pub fn create<F>(
        producer_type: ProducerType,
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        match producer_type {
            ProducerType::Single => {
                Self::create_single_producer(event_factory, buffer_size, wait_strategy)
            }
            ProducerType::Multi => {
                Self::create_multi_producer(event_factory, buffer_size, wait_strategy)
            }
        }
    }

    /// Create a ring buffer for exactly one publishing thread
    pub fn create_single_producer<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let sequencer = SingleProducerSequencer::new(buffer_size, wait_strategy)?;
        Ok(Self::new(event_factory, Arc::new(sequencer)))
    }

    /// Create a ring buffer for any number of publishing threads
    pub fn create_multi_producer<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let sequencer = MultiProducerSequencer::new(buffer_size, wait_strategy)?;
        Ok(Self::new(event_factory, Arc::new(sequencer)))
    }

    /// Create a ring buffer from a validated configuration
    pub fn from_config<F>(event_factory: F, config: &DisruptorConfig) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        config.validate()?;
        Self::create(
            config.producer_type,
            event_factory,
            config.buffer_size,
            config.build_wait_strategy(),
        )
    }

    /// Get the event at `sequence`
    ///
    /// Only meaningful for a sequence a barrier has reported as available;
    /// reading any other slot races with the producer that owns it.
    #[inline]
    pub fn get(&self, sequence: i64) -> &T {
        let index = (sequence & self.index_mask) as usize;
        // SAFETY: the mask keeps the index in bounds. Producers only write
        // slots they have claimed and not yet published.
        unsafe { &*self.slots.get_unchecked(index).get() }
    }

    /// Raw pointer to the event at `sequence`
    ///
    /// # Safety
    /// The caller must have claimed `sequence` and not yet published it, so
    /// that no other thread reads or writes the slot while the pointer is used.
    #[inline]
    pub unsafe fn get_mut_unchecked(&self, sequence: i64) -> *mut T {
        let index = (sequence & self.index_mask) as usize;
        self.slots.get_unchecked(index).get()
    }

    /// The sequencer coordinating this buffer
    pub fn sequencer(&self) -> &Arc<dyn Sequencer> {
        &self.sequencer
    }

    /// Current value of the producer cursor
    pub fn cursor(&self) -> i64 {
        self.sequencer.get_cursor()
    }

    pub fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(gating_sequences);
    }

    pub fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Minimum of the gating sequences and the cursor
    pub fn get_minimum_gating_sequence(&self) -> i64 {
        self.sequencer.get_minimum_sequence()
    }

    /// Create a barrier that gates on `sequences_to_track`, or on the cursor
    /// when the slice is empty
    pub fn new_barrier(&self, sequences_to_track: &[Arc<Sequence>]) -> Arc<dyn SequenceBarrier> {
        Arc::new(ProcessingSequenceBarrier::new(
            Arc::clone(&self.sequencer),
            sequences_to_track,
        ))
    }

    /// Check if `sequence` has been published and not yet overwritten
    pub fn is_published(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }

    /// Move the cursor to `sequence` and publish it
    ///
    /// Only for initialisation, while no producer or consumer is running.
    pub fn reset_to(&self, sequence: i64) {
        self.sequencer.claim(sequence);
        self.sequencer.publish(sequence);
    }

    fn translate_and_publish<F>(&self, sequence: i64, translator: F)
    where
        F: FnOnce(&mut T),
    {
        let _publish = PublishOnDrop {
            sequencer: self.sequencer.as_ref(),
            lo: sequence,
            hi: sequence,
        };
        // SAFETY: `sequence` was claimed by this call and is unpublished until
        // the guard drops, so no consumer reads the slot and no producer owns it.
        let event = unsafe { &mut *self.get_mut_unchecked(sequence) };
        translator(event);
    }

    fn translate_and_publish_batch<A, F>(&self, hi: i64, args: &[A], mut translator: F)
    where
        F: FnMut(&mut T, i64, &A),
    {
        let lo = hi - (args.len() as i64 - 1);
        let _publish = PublishOnDrop {
            sequencer: self.sequencer.as_ref(),
            lo,
            hi,
        };
        for (sequence, arg) in (lo..=hi).zip(args) {
            // SAFETY: see `translate_and_publish`; the whole range is claimed.
            let event = unsafe { &mut *self.get_mut_unchecked(sequence) };
            translator(event, sequence, arg);
        }
    }

    fn check_batch_size(&self, batch_size: usize) -> Result<()> {
        if batch_size == 0 || batch_size > self.slots.len() {
            return Err(DisruptorError::InvalidArgument(format!(
                "batch size must be > 0 and <= {}, got {batch_size}",
                self.slots.len()
            )));
        }
        Ok(())
    }

    fn batch_window<'a, A>(
        &self,
        args: &'a [A],
        batch_starts_at: usize,
        batch_size: usize,
    ) -> Result<&'a [A]> {
        self.check_batch_size(batch_size)?;
        batch_starts_at
            .checked_add(batch_size)
            .and_then(|end| args.get(batch_starts_at..end))
            .ok_or_else(|| {
                DisruptorError::InvalidArgument(format!(
                    "batch of {batch_size} starting at {batch_starts_at} exceeds {} arguments",
                    args.len()
                ))
            })
    }
}

impl<T> Cursored for RingBuffer<T> {
    fn get_cursor(&self) -> i64 {
        self.sequencer.get_cursor()
    }
}

impl<T> Sequenced for RingBuffer<T> {
    fn buffer_size(&self) -> usize {
        self.slots.len()
    }

    fn has_available_capacity(&self, required_capacity: usize) -> bool {
        self.sequencer.has_available_capacity(required_capacity)
    }

    fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    fn next(&self) -> Result<i64> {
        self.sequencer.next()
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.next_n(n)
    }

    fn try_next(&self) -> Result<i64> {
        self.sequencer.try_next()
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.try_next_n(n)
    }

    fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    fn publish_range(&self, lo: i64, hi: i64) {
        self.sequencer.publish_range(lo, hi);
    }
}

impl<T> DataProvider<T> for RingBuffer<T> {
    fn get(&self, sequence: i64) -> &T {
        RingBuffer::get(self, sequence)
    }
}

impl<T> EventSink<T> for RingBuffer<T> {
    fn publish_event<F>(&self, translator: F) -> Result<()>
    where
        F: FnOnce(&mut T, i64),
    {
        let sequence = self.sequencer.next()?;
        self.translate_and_publish(sequence, |event| translator(event, sequence));
        Ok(())
    }

    fn publish_event_one_arg<A, F>(&self, translator: F, arg: A) -> Result<()>
    where
        F: FnOnce(&mut T, i64, A),
    {
        let sequence = self.sequencer.next()?;
        self.translate_and_publish(sequence, |event| translator(event, sequence, arg));
        Ok(())
    }

    fn publish_event_two_arg<A, B, F>(&self, translator: F, arg0: A, arg1: B) -> Result<()>
    where
        F: FnOnce(&mut T, i64, A, B),
    {
        let sequence = self.sequencer.next()?;
        self.translate_and_publish(sequence, |event| translator(event, sequence, arg0, arg1));
        Ok(())
    }

    fn publish_event_three_arg<A, B, C, F>(
        &self,
        translator: F,
        arg0: A,
        arg1: B,
        arg2: C,
    ) -> Result<()>
    where
        F: FnOnce(&mut T, i64, A, B, C),
    {
        let sequence = self.sequencer.next()?;
        self.translate_and_publish(sequence, |event| {
            translator(event, sequence, arg0, arg1, arg2)
        });
        Ok(())
    }

    fn try_publish_event<F>(&self, translator: F) -> Result<()>
    where
        F: FnOnce(&mut T, i64),
    {
        let sequence = self.sequencer.try_next()?;
        self.translate_and_publish(sequence, |event| translator(event, sequence));
        Ok(())
    }

    fn try_publish_event_one_arg<A, F>(&self, translator: F, arg: A) -> Result<()>
    where
        F: FnOnce(&mut T, i64, A),
    {
        let sequence = self.sequencer.try_next()?;
        self.translate_and_publish(sequence, |event| translator(event, sequence, arg));
        Ok(())
    }

    fn publish_events<F>(&self, batch_size: usize, mut translator: F) -> Result<()>
    where
        F: FnMut(&mut T, i64),
    {
        self.check_batch_size(batch_size)?;
        let hi = self.sequencer.next_n(batch_size as i64)?;
        let slots = vec![(); batch_size];
        self.translate_and_publish_batch(hi, &slots, |event, sequence, _| {
            translator(event, sequence)
        });
        Ok(())
    }

    fn publish_events_one_arg<A, F>(
        &self,
        translator: F,
        args: &[A],
        batch_starts_at: usize,
        batch_size: usize,
    ) -> Result<()>
    where
        F: FnMut(&mut T, i64, &A),
    {
        let window = self.batch_window(args, batch_starts_at, batch_size)?;
        let hi = self.sequencer.next_n(batch_size as i64)?;
        self.translate_and_publish_batch(hi, window, translator);
        Ok(())
    }

    fn try_publish_events_one_arg<A, F>(
        &self,
        translator: F,
        args: &[A],
        batch_starts_at: usize,
        batch_size: usize,
    ) -> Result<()>
    where
        F: FnMut(&mut T, i64, &A),
    {
        let window = self.batch_window(args, batch_starts_at, batch_size)?;
        let hi = self.sequencer.try_next_n(batch_size as i64)?;
        self.translate_and_publish_batch(hi, window, translator);
        Ok(())
    }
}

impl<T: Send + Sync + 'static> RingBuffer<T> {
    /// Create a poller gated on `gating_sequences`, or on the cursor when
    /// the slice is empty
    pub fn new_poller(self: &Arc<Self>, gating_sequences: &[Arc<Sequence>]) -> EventPoller<T> {
        let gating = DependentSequence::from_dependencies(
            self.sequencer.cursor_sequence(),
            gating_sequences,
        );
        EventPoller::new(
            Arc::clone(self) as Arc<dyn DataProvider<T> + Send + Sync>,
            Arc::clone(&self.sequencer),
            Arc::new(Sequence::default()),
            gating,
        )
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("buffer_size", &self.slots.len())
            .field("sequencer", &self.sequencer)
            .finish()
    }
}

// SAFETY: slot access is coordinated by the sequencer. A slot is written only by
// the producer holding its claim and read only after its publication, and the
// release/acquire pair on the sequences orders those accesses. Producers move
// values into slots from any thread (T: Send); consumers on many threads hold
// shared references to the same slot (T: Sync).
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for RingBuffer<T> {}
