//! One-shot startup callbacks.
//!
//! Plugins register setup work on an [`InitQueue`] while the application is
//! being assembled; the application drains it once at startup.

use anyhow::Context;
use tracing::debug;

/// A deferred startup callback.
pub type InitFn = Box<dyn FnOnce() -> anyhow::Result<()>>;

/// Ordered list of startup callbacks, run at most once.
#[derive(Default)]
pub struct InitQueue {
    callbacks: Vec<InitFn>,
    ran: bool,
}

impl InitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback. Callbacks added after [`run_all`](Self::run_all)
    /// never run.
    pub fn push<F>(&mut self, callback: F)
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Number of callbacks waiting to run.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Whether [`run_all`](Self::run_all) has been called.
    pub fn has_run(&self) -> bool {
        self.ran
    }

    /// Run every queued callback in insertion order and return how many ran.
    ///
    /// Only the first call runs anything; later calls return `Ok(0)`.
    ///
    /// # Errors
    ///
    /// The first failing callback stops the run. Its error is returned with
    /// the callback's position attached, and the callbacks after it are
    /// dropped without running.
    pub fn run_all(&mut self) -> anyhow::Result<usize> {
        if self.ran {
            return Ok(0);
        }
        self.ran = true;
        let callbacks = std::mem::take(&mut self.callbacks);
        let total = callbacks.len();
        for (position, callback) in callbacks.into_iter().enumerate() {
            callback().with_context(|| format!("init callback #{position} failed"))?;
        }
        debug!(count = total, "init callbacks complete");
        Ok(total)
    }
}

impl std::fmt::Debug for InitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitQueue")
            .field("pending", &self.callbacks.len())
            .field("ran", &self.ran)
            .finish()
    }
}
