//! Example: TIME server with Tempus
//!
//! Usage: `cargo run --example time_server --features subscriber -- [port] [host]`

use tempus::{LoopGroup, TimeServer};

use std::env;
use std::thread;

#[tempus::main(loops = 2)]
fn main(group: LoopGroup) {
    let mut args = env::args().skip(1);
    let port = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3700);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_owned());

    let mut server = TimeServer::new(group);

    // Answer every request with the current system time
    server.set_request_handler(|responder| {
        println!("Request from {}", responder.peer_addr());
        responder.complete_now();
    });

    server
        .listen(port, &host, |bound| match bound {
            Ok(address) => println!("TIME server listening on {address}"),
            Err(err) => {
                eprintln!("Failed to listen: {err}");
                std::process::exit(1);
            }
        })
        .expect("Failed to start listening");

    // The loops serve requests in the background
    loop {
        thread::park();
    }
}
