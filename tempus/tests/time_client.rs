#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::{SocketAddr, TcpListener};
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use tempus::codec::EPOCH_OFFSET;
    use tempus::{
        ClientOptions, LoopGroup, LoopGroupBuilder, TimeClient, TimeError, TimeServer,
        TransportError,
    };

    const WAIT: Duration = Duration::from_secs(5);

    fn group(loops: usize) -> LoopGroup {
        LoopGroupBuilder::new()
            .loops(loops)
            .build()
            .expect("Failed to start event loops")
    }

    /// Serves one connection with a raw socket that writes `chunks` with a
    /// pause between each, then closes.
    fn raw_server(chunks: Vec<Vec<u8>>) -> (SocketAddr, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let address = listener.local_addr().expect("Failed to get local address");

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("Failed to accept connection");
            stream.set_nodelay(true).expect("Failed to set nodelay");

            for chunk in chunks {
                stream.write_all(&chunk).expect("Failed to write chunk");
                stream.flush().expect("Failed to flush");
                thread::sleep(Duration::from_millis(20));
            }
        });

        (address, handle)
    }

    fn get_time(client: &TimeClient, address: SocketAddr) -> Result<i64, TimeError> {
        let (tx, rx) = mpsc::channel();
        client
            .get_time(address.port(), "127.0.0.1", move |result| {
                let _ = tx.send(result);
            })
            .expect("Failed to request time");

        rx.recv_timeout(WAIT).expect("Result callback never ran")
    }

    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Clock before 1970")
            .as_millis() as i64
    }

    #[test]
    fn test_get_time_from_tempus_server() {
        let group = group(2);

        let mut server = TimeServer::new(group.clone());
        server.set_request_handler(|responder| responder.complete_now());

        let (tx, rx) = mpsc::channel();
        server
            .listen(0, "127.0.0.1", move |bound| {
                let _ = tx.send(bound);
            })
            .expect("Failed to request listen");
        let address = rx
            .recv_timeout(WAIT)
            .expect("Bind callback never ran")
            .expect("Failed to bind");

        let client = TimeClient::new(group);
        let millis = get_time(&client, address).expect("Time request failed");

        assert!((now_millis() - millis).abs() < 2000);
        assert_eq!(millis % 1000, 0);
    }

    #[test]
    fn test_callback_runs_on_returned_context() {
        let (address, server) = raw_server(vec![vec![0x83, 0xAA, 0x7E, 0x80]]);
        let client = TimeClient::new(group(4));

        let (tx, rx) = mpsc::channel();
        let context = client
            .get_time(address.port(), "127.0.0.1", move |result| {
                let _ = tx.send((thread::current().id(), result));
            })
            .expect("Failed to request time");

        let (thread_id, result) = rx.recv_timeout(WAIT).expect("Result callback never ran");
        assert_eq!(thread_id, context.loop_handle().thread_id());
        assert_eq!(result.expect("Time request failed"), 0);

        server.join().expect("Server thread panicked");
    }

    #[test]
    fn test_partial_reads_are_buffered() {
        let seconds = (1_700_000_000 + EPOCH_OFFSET) as u32;
        let chunks = seconds
            .to_be_bytes()
            .iter()
            .map(|byte| vec![*byte])
            .collect();

        let (address, server) = raw_server(chunks);
        let client = TimeClient::new(group(1));

        assert_eq!(get_time(&client, address).expect("Time request failed"), 1_700_000_000_000);

        server.join().expect("Server thread panicked");
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let (address, server) = raw_server(vec![vec![0x83, 0xAA, 0x7E, 0x80, 0xFF, 0xFF]]);
        let client = TimeClient::new(group(1));

        assert_eq!(get_time(&client, address).expect("Time request failed"), 0);

        server.join().expect("Server thread panicked");
    }

    #[test]
    fn test_short_response_fails() {
        let (address, server) = raw_server(vec![vec![0x83, 0xAA]]);
        let client = TimeClient::new(group(1));

        let err = get_time(&client, address).expect_err("Two bytes are not a TIME value");
        assert!(matches!(
            err,
            TimeError::Transport(TransportError::ShortResponse { received: 2 })
        ));

        server.join().expect("Server thread panicked");
    }

    #[test]
    fn test_connection_refused_is_reported_once() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
            listener.local_addr().expect("Failed to get local address").port()
        };

        let client = TimeClient::new(group(1));
        let (tx, rx) = mpsc::channel();
        client
            .get_time(port, "127.0.0.1", move |result| {
                let _ = tx.send(result);
            })
            .expect("Failed to request time");

        let first = rx.recv_timeout(WAIT).expect("Result callback never ran");
        assert!(matches!(first, Err(TimeError::ConnectFailure { .. })));

        // The callback was consumed by the first delivery.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_unresolvable_host_is_a_connect_failure() {
        let client = TimeClient::new(group(1));
        let (tx, rx) = mpsc::channel();

        client
            .get_time(37, "not a host name", move |result| {
                let _ = tx.send(result);
            })
            .expect("Resolution errors are asynchronous");

        let result = rx.recv_timeout(WAIT).expect("Result callback never ran");
        assert!(matches!(result, Err(TimeError::ConnectFailure { .. })));
    }

    #[test]
    fn test_connect_timeout_is_a_connect_failure() {
        let client = TimeClient::with_options(
            group(1),
            ClientOptions {
                connect_timeout: Some(Duration::from_millis(200)),
            },
        );

        // Non-routable: either times out or is refused by the network stack.
        let (tx, rx) = mpsc::channel();
        client
            .get_time(37, "10.255.255.1", move |result| {
                let _ = tx.send(result);
            })
            .expect("Failed to request time");

        let result = rx.recv_timeout(WAIT).expect("Result callback never ran");
        assert!(matches!(result, Err(TimeError::ConnectFailure { .. })));
    }

    #[test]
    fn test_get_time_after_shutdown_fails() {
        let group = group(1);
        let client = TimeClient::new(group.clone());

        group.shutdown();

        let err = client
            .get_time(37, "127.0.0.1", |_| panic!("Must not be called"))
            .expect_err("Request after shutdown must fail");
        assert!(matches!(err, TimeError::Shutdown));
    }

    #[test]
    fn test_concurrent_requests_each_complete() {
        let group = group(2);

        let mut server = TimeServer::new(group.clone());
        server.set_request_handler(|responder| responder.complete(UNIX_EPOCH));

        let (tx, rx) = mpsc::channel();
        server
            .listen(0, "127.0.0.1", move |bound| {
                let _ = tx.send(bound);
            })
            .expect("Failed to request listen");
        let address = rx
            .recv_timeout(WAIT)
            .expect("Bind callback never ran")
            .expect("Failed to bind");

        let client = TimeClient::new(group);
        let (tx, rx) = mpsc::channel();

        for _ in 0..16 {
            let tx = tx.clone();
            client
                .get_time(address.port(), "127.0.0.1", move |result| {
                    let _ = tx.send(result);
                })
                .expect("Failed to request time");
        }

        for _ in 0..16 {
            let result = rx.recv_timeout(WAIT).expect("Result callback never ran");
            assert_eq!(result.expect("Time request failed"), 0);
        }
    }
}
