//! Exactly-once result container.

use crate::error::TimeError;

use std::fmt;

type Continuation<T, E> = Box<dyn FnOnce(Result<T, E>)>;

enum State<T, E> {
    Pending,
    Succeeded(T),
    Failed(E),
    /// Terminal, and the outcome has been handed to the continuation.
    Delivered { succeeded: bool },
}

/// A result that completes at most once and is observed by one continuation.
///
/// `SingleShotResult` tolerates duplicate completion signals: the first call
/// to [`complete`](Self::complete) or [`fail`](Self::fail) wins and every
/// later call is a no-op that returns `false`. This lets a connection handler
/// react to both a protocol success and a racing channel close without
/// special-casing the order they arrive in.
///
/// The container is deliberately neither `Send` nor `Sync`: it lives inside a
/// connection handler on one event loop thread, and anything that wants to
/// complete it from elsewhere has to post a message to that loop.
///
/// # Examples
///
/// ```
/// use tempus::SingleShotResult;
///
/// let mut result: SingleShotResult<u32, &str> = SingleShotResult::new();
/// result.on_complete(|outcome| assert_eq!(outcome, Ok(7)));
///
/// assert!(result.complete(7));
/// assert!(!result.fail("too late"));
/// assert!(result.is_succeeded());
/// ```
pub struct SingleShotResult<T, E = TimeError> {
    state: State<T, E>,
    continuation: Option<Continuation<T, E>>,
}

impl<T: 'static, E: 'static> SingleShotResult<T, E> {
    pub fn new() -> Self {
        Self {
            state: State::Pending,
            continuation: None,
        }
    }

    /// Completes the result with `value`.
    ///
    /// Returns `false`, and drops `value`, if the result was already terminal.
    pub fn complete(&mut self, value: T) -> bool {
        self.transition(State::Succeeded(value))
    }

    /// Fails the result with `error`.
    ///
    /// Returns `false`, and drops `error`, if the result was already terminal.
    pub fn fail(&mut self, error: E) -> bool {
        self.transition(State::Failed(error))
    }

    /// Registers the continuation that observes the outcome.
    ///
    /// If the result is already terminal, `continuation` runs immediately on
    /// the calling thread. Only one continuation may be registered; a second
    /// one is dropped without running and `false` is returned.
    pub fn on_complete<F>(&mut self, continuation: F) -> bool
    where
        F: FnOnce(Result<T, E>) + 'static,
    {
        if self.continuation.is_some() || matches!(self.state, State::Delivered { .. }) {
            return false;
        }

        self.continuation = Some(Box::new(continuation));
        self.deliver();

        true
    }

    pub fn is_complete(&self) -> bool {
        !matches!(self.state, State::Pending)
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(
            self.state,
            State::Succeeded(_) | State::Delivered { succeeded: true }
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self.state,
            State::Failed(_) | State::Delivered { succeeded: false }
        )
    }

    fn transition(&mut self, next: State<T, E>) -> bool {
        if self.is_complete() {
            return false;
        }

        self.state = next;
        self.deliver();

        true
    }

    /// Hands the outcome to the continuation once both are present.
    fn deliver(&mut self) {
        if matches!(self.state, State::Pending) || self.continuation.is_none() {
            return;
        }

        let outcome = match std::mem::replace(&mut self.state, State::Pending) {
            State::Succeeded(value) => {
                self.state = State::Delivered { succeeded: true };
                Ok(value)
            }
            State::Failed(error) => {
                self.state = State::Delivered { succeeded: false };
                Err(error)
            }
            delivered @ State::Delivered { .. } => {
                self.state = delivered;
                return;
            }
            State::Pending => unreachable!("checked above"),
        };

        if let Some(continuation) = self.continuation.take() {
            continuation(outcome);
        }
    }
}

impl<T: 'static, E: 'static> Default for SingleShotResult<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for SingleShotResult<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Pending => "Pending",
            State::Succeeded(_) | State::Delivered { succeeded: true } => "Succeeded",
            State::Failed(_) | State::Delivered { succeeded: false } => "Failed",
        };

        f.debug_struct("SingleShotResult")
            .field("state", &state)
            .field("has_continuation", &self.continuation.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::SingleShotResult;

    use std::cell::RefCell;
    use std::rc::Rc;

    type Outcome = Result<u32, &'static str>;
    type Seen = Rc<RefCell<Vec<Outcome>>>;

    fn recorder() -> (Seen, impl Fn() -> Box<dyn FnOnce(Outcome)>) {
        let seen: Seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let make = move || {
            let sink = sink.clone();
            let continuation: Box<dyn FnOnce(Outcome)> =
                Box::new(move |outcome: Outcome| sink.borrow_mut().push(outcome));
            continuation
        };
        (seen, make)
    }

    #[test]
    fn test_success_then_close() {
        let (seen, make) = recorder();
        let mut result = SingleShotResult::new();
        result.on_complete(make());

        assert!(result.complete(1));
        assert!(!result.fail("closed"));

        assert_eq!(*seen.borrow(), vec![Ok(1)]);
        assert!(result.is_succeeded());
    }

    #[test]
    fn test_close_then_success() {
        let (seen, make) = recorder();
        let mut result = SingleShotResult::new();
        result.on_complete(make());

        assert!(result.fail("closed"));
        assert!(!result.complete(1));

        assert_eq!(*seen.borrow(), vec![Err("closed")]);
        assert!(result.is_failed());
    }

    #[test]
    fn test_late_continuation_still_runs() {
        let (seen, make) = recorder();
        let mut result = SingleShotResult::new();

        result.complete(5);
        assert!(seen.borrow().is_empty());

        assert!(result.on_complete(make()));
        assert_eq!(*seen.borrow(), vec![Ok(5)]);
    }

    #[test]
    fn test_second_continuation_rejected() {
        let (seen, make) = recorder();
        let mut result = SingleShotResult::new();

        assert!(result.on_complete(make()));
        assert!(!result.on_complete(make()));

        result.complete(2);
        assert_eq!(*seen.borrow(), vec![Ok(2)]);

        assert!(!result.on_complete(make()));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_pending_until_completed() {
        let result: SingleShotResult<u32, &str> = SingleShotResult::new();

        assert!(!result.is_complete());
        assert!(!result.is_succeeded());
        assert!(!result.is_failed());
    }
}
