use super::context::{ErrorHook, default_error_hook};
use super::group::LoopGroup;
use crate::error::ContextError;

use std::io;
use std::sync::Arc;
use std::thread;

/// Builder for configuring and starting a [`LoopGroup`].
///
/// # Examples
///
/// ```rust,no_run
/// use tempus::LoopGroupBuilder;
///
/// let group = LoopGroupBuilder::new()
///     .loops(2)
///     .thread_name("time-io")
///     .on_callback_error(|err| eprintln!("callback failed: {err}"))
///     .build()
///     .expect("failed to start event loops");
/// # drop(group);
/// ```
pub struct LoopGroupBuilder {
    /// Number of event loop threads.
    loops: usize,

    /// Prefix of the loop thread names; the loop index is appended.
    thread_name: String,

    /// Readiness events handled per poll, per loop.
    event_capacity: usize,

    on_error: Option<ErrorHook>,
}

impl LoopGroupBuilder {
    /// Creates a new `LoopGroupBuilder` with default configuration.
    ///
    /// By default, one loop is started per logical CPU, falling back to `1`
    /// if that number is unavailable.
    pub fn new() -> Self {
        let loops = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            loops,
            thread_name: "tempus-loop".to_owned(),
            event_capacity: 1024,
            on_error: None,
        }
    }

    /// Sets the number of event loop threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn loops(mut self, n: usize) -> Self {
        assert!(n > 0, "loops must be > 0");

        self.loops = n;
        self
    }

    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Sets how many readiness events one poll can return.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "event_capacity must be > 0");

        self.event_capacity = capacity;
        self
    }

    /// Installs the hook that receives panics from dispatched callbacks and
    /// tasks dropped by a stopped loop.
    ///
    /// The default hook logs them with `tracing::error!`.
    pub fn on_callback_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(ContextError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Starts the loop threads.
    pub fn build(self) -> io::Result<LoopGroup> {
        LoopGroup::start(
            self.loops,
            &self.thread_name,
            self.event_capacity,
            self.on_error.unwrap_or_else(default_error_hook),
        )
    }
}

impl Default for LoopGroupBuilder {
    /// Creates a default `LoopGroupBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
