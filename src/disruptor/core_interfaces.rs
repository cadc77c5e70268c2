//! Core Interfaces for the Disruptor Pattern
//!
//! These traits are shared by the sequencers and the ring buffer: a cursor
//! reading, the claim/publish protocol, read access to slots, and the
//! closure-based publishing surface.

use crate::disruptor::Result;

/// Provides access to a cursor value
///
/// Used when sequences are added to a gating set: new members start at the
/// owner's current cursor.
pub trait Cursored {
    /// Get the current cursor value
    fn get_cursor(&self) -> i64;
}

/// Operations related to sequencing items in a ring buffer
pub trait Sequenced {
    /// Get the capacity of the data structure
    fn buffer_size(&self) -> usize;

    /// Check if the buffer has capacity for `required_capacity` more sequences
    ///
    /// This is a concurrent method, so the response should only be taken
    /// as an indication of available capacity.
    fn has_available_capacity(&self, required_capacity: usize) -> bool;

    /// Get the number of slots not yet claimed ahead of the slowest consumer
    fn remaining_capacity(&self) -> i64;

    /// Claim the next sequence for publishing, waiting for capacity
    fn next(&self) -> Result<i64> {
        self.next_n(1)
    }

    /// Claim the next `n` sequences for publishing, waiting for capacity
    ///
    /// ```ignore
    /// let n = 10;
    /// let hi = sequencer.next_n(n)?;
    /// let lo = hi - (n - 1);
    /// for sequence in lo..=hi {
    ///     // fill the slot
    /// }
    /// sequencer.publish_range(lo, hi);
    /// ```
    ///
    /// # Returns
    /// The highest claimed sequence
    ///
    /// # Errors
    /// `InvalidArgument` if `n < 1` or `n` exceeds the buffer size
    fn next_n(&self, n: i64) -> Result<i64>;

    /// Claim the next sequence only if a slot is free right now
    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    /// Claim the next `n` sequences only if they are free right now
    ///
    /// # Errors
    /// `InsufficientCapacity` when claiming would lap the slowest consumer,
    /// `InvalidArgument` if `n < 1` or `n` exceeds the buffer size
    fn try_next_n(&self, n: i64) -> Result<i64>;

    /// Publish a sequence once its slot has been filled
    fn publish(&self, sequence: i64);

    /// Publish the inclusive range `lo..=hi` once every slot has been filled
    fn publish_range(&self, lo: i64, hi: i64);
}

/// Read access to event slots by sequence
pub trait DataProvider<T> {
    /// Get the data item at the specified sequence
    fn get(&self, sequence: i64) -> &T;
}

/// Closure-based event publishing
///
/// Every method claims, calls the translator to fill the slot(s), then
/// publishes. The claimed slots are published even if the translator panics,
/// so a failed fill can never wedge the buffer.
pub trait EventSink<T> {
    /// Claim a slot, fill it, publish it
    fn publish_event<F>(&self, translator: F) -> Result<()>
    where
        F: FnOnce(&mut T, i64);

    /// Claim a slot, fill it from `arg`, publish it
    fn publish_event_one_arg<A, F>(&self, translator: F, arg: A) -> Result<()>
    where
        F: FnOnce(&mut T, i64, A);

    /// Claim a slot, fill it from two arguments, publish it
    fn publish_event_two_arg<A, B, F>(&self, translator: F, arg0: A, arg1: B) -> Result<()>
    where
        F: FnOnce(&mut T, i64, A, B);

    /// Claim a slot, fill it from three arguments, publish it
    fn publish_event_three_arg<A, B, C, F>(
        &self,
        translator: F,
        arg0: A,
        arg1: B,
        arg2: C,
    ) -> Result<()>
    where
        F: FnOnce(&mut T, i64, A, B, C);

    /// Like [`publish_event`](Self::publish_event) but fails with
    /// `InsufficientCapacity` instead of waiting
    fn try_publish_event<F>(&self, translator: F) -> Result<()>
    where
        F: FnOnce(&mut T, i64);

    /// Like [`publish_event_one_arg`](Self::publish_event_one_arg) but fails
    /// with `InsufficientCapacity` instead of waiting
    fn try_publish_event_one_arg<A, F>(&self, translator: F, arg: A) -> Result<()>
    where
        F: FnOnce(&mut T, i64, A);

    /// Claim `batch_size` slots, fill each, publish them together
    fn publish_events<F>(&self, batch_size: usize, translator: F) -> Result<()>
    where
        F: FnMut(&mut T, i64);

    /// Claim one slot per element of `args[batch_starts_at..batch_starts_at + batch_size]`,
    /// fill each from its argument, publish them together
    ///
    /// # Errors
    /// `InvalidArgument` if the window is empty, falls outside `args`, or is
    /// larger than the buffer
    fn publish_events_one_arg<A, F>(
        &self,
        translator: F,
        args: &[A],
        batch_starts_at: usize,
        batch_size: usize,
    ) -> Result<()>
    where
        F: FnMut(&mut T, i64, &A);

    /// Like [`publish_events_one_arg`](Self::publish_events_one_arg) but fails
    /// with `InsufficientCapacity` instead of waiting
    fn try_publish_events_one_arg<A, F>(
        &self,
        translator: F,
        args: &[A],
        batch_starts_at: usize,
        batch_size: usize,
    ) -> Result<()>
    where
        F: FnMut(&mut T, i64, &A);
}
