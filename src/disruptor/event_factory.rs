//! Event Factory
//!
//! A ring buffer never allocates after construction: every slot is filled once
//! by a factory and then reused for the lifetime of the buffer.

use std::marker::PhantomData;

/// Creates the pre-allocated contents of each ring buffer slot
///
/// # Examples
/// ```
/// use batchring::disruptor::EventFactory;
///
/// struct Quote {
///     price: i64,
/// }
///
/// struct QuoteFactory;
///
/// impl EventFactory<Quote> for QuoteFactory {
///     fn new_instance(&self) -> Quote {
///         Quote { price: 0 }
///     }
/// }
/// ```
pub trait EventFactory<T> {
    /// Called once per slot while the ring buffer is built
    fn new_instance(&self) -> T;
}

/// Fills slots with `T::default()`
pub struct DefaultEventFactory<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Default> DefaultEventFactory<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: Default> Default for DefaultEventFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> EventFactory<T> for DefaultEventFactory<T> {
    fn new_instance(&self) -> T {
        T::default()
    }
}

/// Fills slots by calling a closure
pub struct ClosureEventFactory<T, F>
where
    F: Fn() -> T,
{
    factory_fn: F,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, F> ClosureEventFactory<T, F>
where
    F: Fn() -> T,
{
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> EventFactory<T> for ClosureEventFactory<T, F>
where
    F: Fn() -> T,
{
    fn new_instance(&self) -> T {
        (self.factory_fn)()
    }
}

/// Shorthand for [`ClosureEventFactory::new`]
///
/// # Examples
/// ```
/// use batchring::disruptor::{event_factory, EventFactory};
///
/// let factory = event_factory(|| vec![0u8; 64]);
/// assert_eq!(factory.new_instance().len(), 64);
/// ```
pub fn event_factory<T, F>(factory_fn: F) -> ClosureEventFactory<T, F>
where
    F: Fn() -> T,
{
    ClosureEventFactory::new(factory_fn)
}
