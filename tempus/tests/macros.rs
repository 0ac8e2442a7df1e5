#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use tempus::LoopGroup;

    #[tempus::test(loops = 3)]
    fn test_macro_builds_group(group: LoopGroup) {
        assert_eq!(group.loops().len(), 3);
        assert!(!group.is_shutdown());

        let (tx, rx) = mpsc::channel();
        let context = group.context().expect("Failed to create context");
        context.dispatch(move || {
            let _ = tx.send(42);
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(42));
    }

    #[tempus::test]
    fn test_macro_without_group() {
        assert_eq!(1 + 1, 2);
    }
}
