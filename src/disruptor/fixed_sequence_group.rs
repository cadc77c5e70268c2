//! Read-only aggregate views over sequences
//!
//! A barrier or poller that depends on several upstream consumers needs to
//! treat them as one sequence whose value is the slowest of the set.

use std::sync::Arc;

use crate::disruptor::sequence::{get_minimum_sequence, Sequence};
use crate::disruptor::{DisruptorError, Result};

/// Hides a fixed set of sequences behind a single read-only value
///
/// The group holds no state of its own: [`get`](Self::get) is the minimum of
/// the wrapped sequences at the time of the call. Every mutating operation
/// fails with [`DisruptorError::NotSupported`].
#[derive(Debug, Clone)]
pub struct FixedSequenceGroup {
    sequences: Box<[Arc<Sequence>]>,
}

impl FixedSequenceGroup {
    /// Create a group over a copy of `sequences`
    pub fn new(sequences: &[Arc<Sequence>]) -> Self {
        Self {
            sequences: sequences.into(),
        }
    }

    /// Get the minimum value of the wrapped sequences
    ///
    /// Returns `i64::MAX` for an empty group.
    #[inline]
    pub fn get(&self) -> i64 {
        get_minimum_sequence(&self.sequences, i64::MAX)
    }

    /// Number of wrapped sequences
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Check if the group wraps no sequences
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Not supported
    pub fn set(&self, _value: i64) -> Result<()> {
        Err(DisruptorError::NotSupported("FixedSequenceGroup::set"))
    }

    /// Not supported
    pub fn compare_and_set(&self, _expected: i64, _new: i64) -> Result<bool> {
        Err(DisruptorError::NotSupported(
            "FixedSequenceGroup::compare_and_set",
        ))
    }

    /// Not supported
    pub fn increment_and_get(&self) -> Result<i64> {
        Err(DisruptorError::NotSupported(
            "FixedSequenceGroup::increment_and_get",
        ))
    }

    /// Not supported
    pub fn add_and_get(&self, _increment: i64) -> Result<i64> {
        Err(DisruptorError::NotSupported("FixedSequenceGroup::add_and_get"))
    }
}

/// The sequence a consumer waits on before it may read
///
/// Either a single sequence (the producer cursor, or one upstream consumer) or
/// a [`FixedSequenceGroup`] over several upstream consumers.
#[derive(Debug, Clone)]
pub enum DependentSequence {
    Single(Arc<Sequence>),
    Group(FixedSequenceGroup),
}

impl DependentSequence {
    /// Depend on `cursor` when `dependencies` is empty, on the dependency itself
    /// when there is exactly one, and on the slowest of them otherwise
    pub fn from_dependencies(cursor: &Arc<Sequence>, dependencies: &[Arc<Sequence>]) -> Self {
        match dependencies {
            [] => DependentSequence::Single(Arc::clone(cursor)),
            [single] => DependentSequence::Single(Arc::clone(single)),
            many => DependentSequence::Group(FixedSequenceGroup::new(many)),
        }
    }

    /// Get the current value
    #[inline]
    pub fn get(&self) -> i64 {
        match self {
            DependentSequence::Single(sequence) => sequence.get(),
            DependentSequence::Group(group) => group.get(),
        }
    }
}
