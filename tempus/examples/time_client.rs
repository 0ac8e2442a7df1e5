//! Example: TIME client with Tempus
//!
//! Usage: `cargo run --example time_client --features subscriber -- [port] [host]`

use tempus::{LoopGroup, TimeClient};

use std::env;
use std::sync::mpsc;
use std::time::{Duration, UNIX_EPOCH};

#[tempus::main(loops = 1)]
fn main(group: LoopGroup) {
    let mut args = env::args().skip(1);
    let port = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3700);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_owned());

    let client = TimeClient::new(group);
    let (tx, rx) = mpsc::channel();

    client
        .get_time(port, &host, move |result| {
            let _ = tx.send(result);
        })
        .expect("Failed to send request");

    match rx.recv_timeout(Duration::from_secs(90)) {
        Ok(Ok(millis)) => {
            let local = UNIX_EPOCH.elapsed().map(|d| d.as_millis() as i64).unwrap_or(0);
            println!("Server time: {millis} ms since the Unix epoch");
            println!("Offset from local clock: {} ms", millis - local);
        }
        Ok(Err(err)) => println!("Request failed: {err}"),
        Err(_) => println!("No answer"),
    }
}
