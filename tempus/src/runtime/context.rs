use super::group::LoopGroup;
use crate::error::{ContextError, TimeError};
use crate::reactor::LoopHandle;
use crate::reactor::command::Command;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::error;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Receives callback failures for every context of a [`LoopGroup`].
pub type ErrorHook = Arc<dyn Fn(ContextError) + Send + Sync>;

pub(crate) fn default_error_hook() -> ErrorHook {
    Arc::new(|err| error!(error = %err, "application callback failed"))
}

/// A binding to exactly one event loop thread.
///
/// Every application callback belonging to a server or a client call is run
/// through its context's [`dispatch`](Self::dispatch), so it always executes
/// on the same loop thread that owns the connection's state. A context never
/// migrates: cloning it shares the binding.
///
/// Contexts are explicit values. There is no thread-local "current context";
/// a server keeps the context it acquired on first `listen`, and each client
/// call gets its own.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: u64,
    handle: LoopHandle,
    on_error: ErrorHook,
}

impl ExecutionContext {
    pub(crate) fn new(handle: LoopHandle, on_error: ErrorHook) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                handle,
                on_error,
            }),
        }
    }

    /// Returns the context stored in `slot`, creating and storing one first
    /// if the slot is empty.
    ///
    /// Calls with the same slot keep returning the same context, even after
    /// `group` has shut down.
    ///
    /// # Errors
    ///
    /// [`TimeError::Shutdown`] if the slot is empty and `group` has shut down.
    pub fn acquire_or_create(
        slot: &mut Option<ExecutionContext>,
        group: &LoopGroup,
    ) -> Result<ExecutionContext, TimeError> {
        if let Some(context) = slot {
            return Ok(context.clone());
        }

        let context = group.context()?;
        *slot = Some(context.clone());

        Ok(context)
    }

    /// Process-unique id of this context.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The event loop this context is bound to.
    pub fn loop_handle(&self) -> &LoopHandle {
        &self.inner.handle
    }

    /// Returns `true` when called on the bound loop thread.
    pub fn is_on_loop(&self) -> bool {
        self.inner.handle.is_current()
    }

    /// Asserts, in debug builds, that the caller is on the bound loop thread.
    #[track_caller]
    pub fn assert_on_loop(&self) {
        debug_assert!(
            self.is_on_loop(),
            "execution context {} used off its event loop thread",
            self.inner.id
        );
    }

    /// Runs `task` on the bound loop thread.
    ///
    /// Called on that thread, `task` runs before `dispatch` returns;
    /// otherwise it is queued behind whatever the loop is doing. A panic in
    /// `task` is caught and reported to the error hook. If the loop has
    /// already stopped, the task is dropped and the hook receives
    /// [`ContextError::LoopTerminated`].
    pub fn dispatch<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_on_loop() {
            self.run_guarded(task);
            return;
        }

        let context = self.clone();
        let command = Command::Dispatch(Box::new(move || context.run_guarded(task)));

        if self.inner.handle.send(command).is_err() {
            self.report(ContextError::LoopTerminated {
                loop_index: self.inner.handle.index(),
            });
        }
    }

    fn run_guarded<F: FnOnce()>(&self, task: F) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            self.report(ContextError::CallbackPanicked {
                loop_index: self.inner.handle.index(),
                message: panic_message(payload.as_ref()),
            });
        }
    }

    /// Hands `err` to the error hook. The hook must not unwind into the loop.
    fn report(&self, err: ContextError) {
        let hook = &self.inner.on_error;

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook(err))) {
            error!(
                context = self.inner.id,
                loop_index = self.inner.handle.index(),
                panic = %panic_message(payload.as_ref()),
                "error hook panicked"
            );
        }
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ExecutionContext {}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("loop", &self.inner.handle.index())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::panic_message;

    use std::panic;

    #[test]
    fn test_panic_message_formats() {
        let payload = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload = panic::catch_unwind(|| panic!("value {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "value 7");

        let payload = panic::catch_unwind(|| panic::panic_any(3u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
