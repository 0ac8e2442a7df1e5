use super::builder::LoopGroupBuilder;
use super::context::{ErrorHook, ExecutionContext};
use crate::error::TimeError;
use crate::reactor::command::Command;
use crate::reactor::{LoopHandle, Reactor};

use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

/// A fixed set of event loop threads.
///
/// `LoopGroup` is cheap to clone; every clone refers to the same threads.
/// The loops are stopped when [`shutdown`](Self::shutdown) is called or the
/// last clone is dropped.
///
/// # Examples
///
/// ```rust,ignore
/// let group = LoopGroupBuilder::new().loops(2).build()?;
/// let context = group.context()?;
/// context.dispatch(|| println!("on a loop thread"));
/// ```
#[derive(Clone)]
pub struct LoopGroup {
    inner: Arc<GroupInner>,
}

struct GroupInner {
    loops: Vec<LoopHandle>,
    threads: Mutex<Vec<JoinHandle<()>>>,

    /// Round-robin cursor for callers that are not on a loop thread.
    next: AtomicUsize,

    on_error: ErrorHook,
    shutdown: AtomicBool,
}

impl LoopGroup {
    /// Returns a builder with default settings.
    pub fn builder() -> LoopGroupBuilder {
        LoopGroupBuilder::new()
    }

    /// Starts `loops` event loop threads.
    ///
    /// If one of them fails to start, the ones already running are stopped.
    pub(crate) fn start(
        loops: usize,
        thread_name: &str,
        event_capacity: usize,
        on_error: ErrorHook,
    ) -> io::Result<Self> {
        let mut inner = GroupInner {
            loops: Vec::with_capacity(loops),
            threads: Mutex::new(Vec::with_capacity(loops)),
            next: AtomicUsize::new(0),
            on_error,
            shutdown: AtomicBool::new(false),
        };

        for index in 0..loops {
            // On error `inner` is dropped here, which stops the started loops.
            let (handle, join) = Reactor::start(index, thread_name, event_capacity)?;

            inner.loops.push(handle);
            inner
                .threads
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .push(join);
        }

        debug!(loops, thread_name, "loop group started");

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Creates a context bound to a freshly chosen loop.
    ///
    /// When called from one of this group's loop threads, the context is
    /// bound to that loop. Otherwise loops are picked round-robin.
    ///
    /// # Errors
    ///
    /// [`TimeError::Shutdown`] once the group has been shut down.
    pub fn context(&self) -> Result<ExecutionContext, TimeError> {
        if self.is_shutdown() {
            return Err(TimeError::Shutdown);
        }

        Ok(ExecutionContext::new(
            self.pick().clone(),
            self.inner.on_error.clone(),
        ))
    }

    fn pick(&self) -> &LoopHandle {
        let loops = &self.inner.loops;

        if let Some(current) = loops.iter().find(|handle| handle.is_current()) {
            return current;
        }

        let index = self.inner.next.fetch_add(1, Ordering::Relaxed) % loops.len();
        &loops[index]
    }

    /// Handles to every loop of the group, in index order.
    pub fn loops(&self) -> &[LoopHandle] {
        &self.inner.loops
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Stops every loop and waits for the threads to exit.
    ///
    /// Open channels are closed and their handlers notified before the
    /// loops exit. Called from a loop thread, that thread is not joined.
    /// Calling `shutdown` more than once is harmless.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl GroupInner {
    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        for handle in &self.loops {
            let _ = handle.send(Command::Shutdown);
        }

        let threads = mem::take(
            &mut *self
                .threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let current = thread::current().id();

        for join in threads {
            if join.thread().id() == current {
                continue;
            }
            if join.join().is_err() {
                error!("event loop thread panicked");
            }
        }

        debug!(loops = self.loops.len(), "loop group stopped");
    }
}

impl Drop for GroupInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
