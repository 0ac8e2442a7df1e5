#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use tempus::{ContextError, ExecutionContext, LoopGroup, LoopGroupBuilder, TimeError};

    const WAIT: Duration = Duration::from_secs(5);

    fn group_with_hook(loops: usize) -> (LoopGroup, mpsc::Receiver<ContextError>) {
        let (tx, rx) = mpsc::channel();
        let group = LoopGroupBuilder::new()
            .loops(loops)
            .thread_name("ctx-test")
            .on_callback_error(move |err| {
                let _ = tx.send(err);
            })
            .build()
            .expect("Failed to start event loops");

        (group, rx)
    }

    #[test]
    fn test_dispatch_runs_on_bound_thread() {
        let (group, _errors) = group_with_hook(3);
        let context = group.context().expect("Failed to create context");
        assert!(!context.is_on_loop());

        let (tx, rx) = mpsc::channel();
        let probe = context.clone();
        context.dispatch(move || {
            let _ = tx.send((thread::current().id(), probe.is_on_loop()));
        });

        let (thread_id, on_loop) = rx.recv_timeout(WAIT).expect("Task never ran");
        assert_eq!(thread_id, context.loop_handle().thread_id());
        assert!(on_loop);
    }

    #[test]
    fn test_dispatch_on_loop_runs_inline() {
        let (group, _errors) = group_with_hook(1);
        let context = group.context().expect("Failed to create context");

        let order = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel();

        let inner_context = context.clone();
        let outer_order = order.clone();
        context.dispatch(move || {
            let inner_order = outer_order.clone();
            inner_context.dispatch(move || inner_order.lock().unwrap().push("inner"));
            outer_order.lock().unwrap().push("outer");
            let _ = tx.send(());
        });

        rx.recv_timeout(WAIT).expect("Task never ran");
        assert_eq!(*order.lock().unwrap(), vec!["inner", "outer"]);
    }

    #[test]
    fn test_acquire_or_create_reuses_slot() {
        let (group, _errors) = group_with_hook(2);
        let mut slot = None;

        let first = ExecutionContext::acquire_or_create(&mut slot, &group)
            .expect("Failed to create context");
        let second = ExecutionContext::acquire_or_create(&mut slot, &group)
            .expect("Failed to reuse context");

        assert_eq!(first, second);
        assert_eq!(slot.as_ref(), Some(&first));

        // A fresh slot gets a fresh context.
        let mut other = None;
        let third = ExecutionContext::acquire_or_create(&mut other, &group)
            .expect("Failed to create context");
        assert_ne!(first, third);
    }

    #[test]
    fn test_context_created_on_loop_binds_to_that_loop() {
        let (group, _errors) = group_with_hook(4);
        let context = group.context().expect("Failed to create context");

        let (tx, rx) = mpsc::channel();
        let inner_group = group.clone();
        context.dispatch(move || {
            let nested = inner_group.context().expect("Failed to create context");
            let _ = tx.send(nested.loop_handle().index());
        });

        let index = rx.recv_timeout(WAIT).expect("Task never ran");
        assert_eq!(index, context.loop_handle().index());
    }

    #[test]
    fn test_contexts_spread_round_robin() {
        let (group, _errors) = group_with_hook(3);

        let mut indices: Vec<_> = (0..3)
            .map(|_| {
                group
                    .context()
                    .expect("Failed to create context")
                    .loop_handle()
                    .index()
            })
            .collect();
        indices.sort();

        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_panic_is_reported_to_hook() {
        let (group, errors) = group_with_hook(1);
        let context = group.context().expect("Failed to create context");

        context.dispatch(|| panic!("boom"));

        match errors.recv_timeout(WAIT).expect("Hook never ran") {
            ContextError::CallbackPanicked { loop_index, message } => {
                assert_eq!(loop_index, 0);
                assert_eq!(message, "boom");
            }
            other => panic!("Unexpected error: {other}"),
        }

        // The loop survived.
        let (tx, rx) = mpsc::channel();
        context.dispatch(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(WAIT).expect("Loop stopped after a panic");
    }

    #[test]
    fn test_panicking_hook_does_not_stop_the_loop() {
        let group = LoopGroupBuilder::new()
            .loops(1)
            .on_callback_error(|err| panic!("hook failed on {err}"))
            .build()
            .expect("Failed to start event loops");
        let context = group.context().expect("Failed to create context");

        context.dispatch(|| panic!("task"));

        let (tx, rx) = mpsc::channel();
        let caller = panic::catch_unwind(AssertUnwindSafe(|| {
            context.dispatch(move || {
                let _ = tx.send(thread::current().id());
            })
        }));
        assert!(caller.is_ok());

        let thread_id = rx.recv_timeout(WAIT).expect("Loop stopped after the hook panicked");
        assert_eq!(thread_id, context.loop_handle().thread_id());

        // Same for the caller when the loop is gone.
        group.shutdown();
        let caller = panic::catch_unwind(AssertUnwindSafe(|| context.dispatch(|| {})));
        assert!(caller.is_ok());
    }

    #[test]
    fn test_dispatch_after_shutdown_is_reported() {
        let (group, errors) = group_with_hook(1);
        let context = group.context().expect("Failed to create context");

        group.shutdown();
        assert!(group.is_shutdown());
        assert!(matches!(group.context(), Err(TimeError::Shutdown)));

        context.dispatch(|| panic!("Must not run"));

        match errors.recv_timeout(WAIT).expect("Hook never ran") {
            ContextError::LoopTerminated { loop_index } => assert_eq!(loop_index, 0),
            other => panic!("Unexpected error: {other}"),
        }
    }

    #[test]
    fn test_loop_threads_are_named() {
        let (group, _errors) = group_with_hook(2);
        let context = group.context().expect("Failed to create context");

        let (tx, rx) = mpsc::channel();
        context.dispatch(move || {
            let _ = tx.send(thread::current().name().map(str::to_owned));
        });

        let name = rx
            .recv_timeout(WAIT)
            .expect("Task never ran")
            .expect("Loop thread has no name");
        assert_eq!(name, format!("ctx-test-{}", context.loop_handle().index()));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "used off its event loop thread")]
    fn test_assert_on_loop_off_thread() {
        let (group, _errors) = group_with_hook(1);
        let context = group.context().expect("Failed to create context");

        context.assert_on_loop();
    }

    #[test]
    #[should_panic(expected = "loops must be > 0")]
    fn test_zero_loops_panics() {
        let _ = LoopGroupBuilder::new().loops(0);
    }
}
