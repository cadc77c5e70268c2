//! Copy-on-write set of gating sequences
//!
//! Producers read the gating set on every capacity check, while consumers are
//! added and removed rarely (topology setup and teardown). The set is therefore
//! held as an immutable snapshot behind an atomic pointer: readers load the
//! current snapshot without locking, writers build a modified copy and swap it
//! in with compare-and-swap, retrying on conflict. Retired snapshots are
//! reclaimed through crossbeam's epoch-based garbage collector once no reader
//! can still be holding them.

use crossbeam::epoch::{self, Atomic, Owned};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::disruptor::core_interfaces::Cursored;
use crate::disruptor::sequence::{get_minimum_sequence, Sequence};

/// A lock-free, copy-on-write group of sequences
pub struct SequenceGroup {
    sequences: Atomic<Vec<Arc<Sequence>>>,
}

impl SequenceGroup {
    /// Create a new empty sequence group
    pub fn new() -> Self {
        Self {
            sequences: Atomic::new(Vec::new()),
        }
    }

    /// Add sequences to the group
    ///
    /// Every added sequence is set to the cursor's current value, both while the
    /// new snapshot is built and again after it is published, so a freshly added
    /// consumer never holds producers back with a stale low value.
    pub fn add_sequences(&self, cursor: &dyn Cursored, sequences_to_add: &[Arc<Sequence>]) {
        let guard = &epoch::pin();
        let mut current = self.sequences.load(Ordering::Acquire, guard);

        loop {
            // SAFETY: the pointer is never null (constructed non-null, only ever
            // replaced by non-null snapshots) and the pinned guard keeps it alive.
            let existing = unsafe { current.deref() };
            let cursor_sequence = cursor.get_cursor();

            let mut updated = Vec::with_capacity(existing.len() + sequences_to_add.len());
            updated.extend(existing.iter().cloned());
            for sequence in sequences_to_add {
                sequence.set(cursor_sequence);
                updated.push(Arc::clone(sequence));
            }

            match self.sequences.compare_exchange(
                current,
                Owned::new(updated),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    // SAFETY: the old snapshot is unreachable for new readers; the
                    // collector frees it once every pinned reader has moved on.
                    unsafe { guard.defer_destroy(current) };
                    break;
                }
                Err(conflict) => current = conflict.current,
            }
        }

        let cursor_sequence = cursor.get_cursor();
        for sequence in sequences_to_add {
            sequence.set(cursor_sequence);
        }
    }

    /// Remove every occurrence of `sequence` (by identity) from the group
    ///
    /// # Returns
    /// True if the sequence was found and removed
    pub fn remove(&self, sequence: &Arc<Sequence>) -> bool {
        let guard = &epoch::pin();
        let mut current = self.sequences.load(Ordering::Acquire, guard);

        loop {
            // SAFETY: see `add_sequences`.
            let existing = unsafe { current.deref() };
            if !existing.iter().any(|s| Arc::ptr_eq(s, sequence)) {
                return false;
            }

            let updated: Vec<Arc<Sequence>> = existing
                .iter()
                .filter(|s| !Arc::ptr_eq(s, sequence))
                .cloned()
                .collect();

            match self.sequences.compare_exchange(
                current,
                Owned::new(updated),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    // SAFETY: see `add_sequences`.
                    unsafe { guard.defer_destroy(current) };
                    return true;
                }
                Err(conflict) => current = conflict.current,
            }
        }
    }

    /// Get the minimum value in the group, never exceeding `minimum`
    #[inline]
    pub fn minimum(&self, minimum: i64) -> i64 {
        let guard = &epoch::pin();
        let current = self.sequences.load(Ordering::Acquire, guard);
        // SAFETY: see `add_sequences`.
        get_minimum_sequence(unsafe { current.deref() }, minimum)
    }

    /// Take a copy of the current set of sequences
    pub fn snapshot(&self) -> Vec<Arc<Sequence>> {
        let guard = &epoch::pin();
        let current = self.sequences.load(Ordering::Acquire, guard);
        // SAFETY: see `add_sequences`.
        unsafe { current.deref() }.clone()
    }

    /// Get the number of sequences in the group
    pub fn len(&self) -> usize {
        let guard = &epoch::pin();
        let current = self.sequences.load(Ordering::Acquire, guard);
        // SAFETY: see `add_sequences`.
        unsafe { current.deref() }.len()
    }

    /// Check if the group is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SequenceGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SequenceGroup {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can load the pointer any more.
        unsafe {
            let guard = epoch::unprotected();
            let current = self.sequences.load(Ordering::Relaxed, guard);
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}

impl std::fmt::Debug for SequenceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceGroup")
            .field("sequences", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct FixedCursor(i64);

    impl Cursored for FixedCursor {
        fn get_cursor(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn test_add_sets_sequences_to_cursor() {
        let group = SequenceGroup::new();
        assert!(group.is_empty());

        let seq1 = Arc::new(Sequence::new(-1));
        let seq2 = Arc::new(Sequence::new(-1));
        group.add_sequences(&FixedCursor(41), &[seq1.clone(), seq2.clone()]);

        assert_eq!(group.len(), 2);
        assert_eq!(seq1.get(), 41);
        assert_eq!(seq2.get(), 41);
        assert_eq!(group.minimum(i64::MAX), 41);
    }

    #[test]
    fn test_remove_by_identity() {
        let group = SequenceGroup::new();
        let seq1 = Arc::new(Sequence::new(0));
        let seq2 = Arc::new(Sequence::new(0));
        group.add_sequences(&FixedCursor(10), &[seq1.clone(), seq2.clone()]);

        // Same value, different identity
        let lookalike = Arc::new(Sequence::new(10));
        assert!(!group.remove(&lookalike));

        assert!(group.remove(&seq1));
        assert_eq!(group.len(), 1);
        assert!(Arc::ptr_eq(&group.snapshot()[0], &seq2));

        assert!(!group.remove(&seq1));
    }

    #[test]
    fn test_minimum_tracks_slowest() {
        let group = SequenceGroup::new();
        let fast = Arc::new(Sequence::new(0));
        let slow = Arc::new(Sequence::new(0));
        group.add_sequences(&FixedCursor(0), &[fast.clone(), slow.clone()]);

        fast.set(20);
        slow.set(5);
        assert_eq!(group.minimum(i64::MAX), 5);
        assert_eq!(group.minimum(3), 3);

        assert!(group.remove(&slow));
        assert_eq!(group.minimum(i64::MAX), 20);
    }

    #[test]
    fn test_concurrent_add_and_remove() {
        let group = Arc::new(SequenceGroup::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let group = Arc::clone(&group);
            handles.push(thread::spawn(move || {
                let mut mine = Vec::new();
                for _ in 0..100 {
                    let sequence = Arc::new(Sequence::default());
                    group.add_sequences(&FixedCursor(7), &[sequence.clone()]);
                    mine.push(sequence);
                }
                for sequence in mine.iter().step_by(2) {
                    assert!(group.remove(sequence));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(group.len(), 200);
        assert_eq!(group.minimum(i64::MAX), 7);
    }
}
