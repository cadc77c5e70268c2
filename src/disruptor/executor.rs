//! Executor contract for running processor loops
//!
//! Processors are plain run loops. Where they run is up to the caller, through
//! an [`Executor`]. [`ThreadExecutor`](crate::disruptor::ThreadExecutor) runs
//! each task on its own named OS thread.

use crate::disruptor::Result;

/// Handle to a task started by an [`Executor`]
pub trait TaskHandle: Send {
    /// Wait for the task to finish
    ///
    /// # Errors
    /// `TaskPanicked` if the task panicked
    fn join(self) -> Result<()>;

    /// Check if the task has finished, without blocking
    fn is_finished(&self) -> bool;
}

/// Runs processor loops
pub trait Executor {
    type Handle: TaskHandle;

    /// Start `task`, returning a handle to await it
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) -> Result<Self::Handle>;
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let value = 7;
        let payload = panic::catch_unwind(|| panic!("formatted {value}")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");

        let payload = panic::catch_unwind(|| panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
