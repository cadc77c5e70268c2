//! Thread management and CPU affinity
//!
//! Named processor threads with optional core pinning, and the
//! [`ThreadExecutor`] that runs processor loops on them.

use core_affinity::CoreId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use crate::disruptor::executor::{panic_message, Executor, TaskHandle};
use crate::disruptor::{DisruptorError, Result};

/// Handle to a thread spawned by [`ThreadBuilder`]
///
/// Dropping the handle joins the thread.
pub struct ManagedThread {
    join_handle: Option<JoinHandle<()>>,
    thread_name: String,
}

impl ManagedThread {
    fn new(join_handle: JoinHandle<()>, thread_name: String) -> Self {
        Self {
            join_handle: Some(join_handle),
            thread_name,
        }
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Wait for the thread to finish
    ///
    /// # Errors
    /// `TaskPanicked` carrying the panic message if the thread panicked
    pub fn join(mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle.join().map_err(|payload| {
                DisruptorError::TaskPanicked(format!(
                    "thread '{}' panicked: {}",
                    self.thread_name,
                    panic_message(payload.as_ref())
                ))
            }),
            None => Ok(()),
        }
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl TaskHandle for ManagedThread {
    fn join(self) -> Result<()> {
        ManagedThread::join(self)
    }

    fn is_finished(&self) -> bool {
        !self.is_running()
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("thread_name", &self.thread_name)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Thread builder with CPU affinity and naming support
#[derive(Debug, Default)]
pub struct ThreadBuilder {
    affinity: Option<usize>,
    name: Option<String>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the thread to `core_id`
    ///
    /// The core is checked when the thread is spawned.
    pub fn pin_at_core(mut self, core_id: usize) -> Self {
        self.affinity = Some(core_id);
        self
    }

    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Spawn the thread
    ///
    /// # Errors
    /// `InvalidArgument` if the requested core does not exist, `Io` if the OS
    /// refuses to create the thread
    pub fn spawn<F>(self, f: F) -> Result<ManagedThread>
    where
        F: FnOnce() + Send + 'static,
    {
        let affinity = self.affinity.map(validate_core_id).transpose()?;
        let thread_name = self.name.unwrap_or_else(|| "processor".to_string());

        let name_for_thread = thread_name.clone();
        let join_handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                set_affinity_if_defined(affinity, &name_for_thread);
                f();
            })?;

        Ok(ManagedThread::new(join_handle, thread_name))
    }
}

/// Runs each task on a new named thread, `<prefix>-<n>` counting from 1
///
/// With [`pin_to_cores`](Self::pin_to_cores), threads are pinned to the given
/// cores in round-robin order.
#[derive(Debug)]
pub struct ThreadExecutor {
    prefix: String,
    cores: Vec<usize>,
    spawned: AtomicUsize,
}

impl ThreadExecutor {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
            cores: Vec::new(),
            spawned: AtomicUsize::new(0),
        }
    }

    pub fn pin_to_cores(mut self, cores: Vec<usize>) -> Self {
        self.cores = cores;
        self
    }
}

impl Executor for ThreadExecutor {
    type Handle = ManagedThread;

    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) -> Result<ManagedThread> {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let mut builder =
            ThreadBuilder::new().thread_name(format!("{}-{}", self.prefix, index + 1));
        if !self.cores.is_empty() {
            builder = builder.pin_at_core(self.cores[index % self.cores.len()]);
        }
        builder.spawn(task)
    }
}

fn validate_core_id(core_id: usize) -> Result<CoreId> {
    let available_cores = get_available_cores();
    if available_cores.contains(&core_id) {
        Ok(CoreId { id: core_id })
    } else {
        Err(DisruptorError::InvalidArgument(format!(
            "CPU core {core_id} is not available, available cores: {available_cores:?}"
        )))
    }
}

fn set_affinity_if_defined(affinity: Option<CoreId>, thread_name: &str) {
    if let Some(core_id) = affinity {
        if core_affinity::set_for_current(core_id) {
            debug!(thread = thread_name, core = core_id.id, "pinned thread to core");
        } else {
            warn!(thread = thread_name, core = core_id.id, "could not pin thread to core");
        }
    }
}

/// IDs of the CPU cores threads can be pinned to
pub fn get_available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .unwrap_or_default()
        .iter()
        .map(|core| core.id)
        .collect()
}
