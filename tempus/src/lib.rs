//! # Tempus
//!
//! **Tempus** is a TIME protocol ([RFC 868]) client and server for the
//! **Nebula** ecosystem, layered on a small thread-affine event loop.
//!
//! The protocol itself is trivial: the server answers every connection with
//! four big-endian bytes, the number of seconds since 1900-01-01, and closes
//! it. What Tempus is really about is how an application-facing API sits on
//! top of an I/O reactor without ever touching a connection from the wrong
//! thread:
//!
//! - every socket belongs to exactly one **event loop** thread,
//! - an [`ExecutionContext`] binds application callbacks to one loop, and
//!   [`dispatch`](ExecutionContext::dispatch) is the only way they run,
//! - every exchange completes a [`SingleShotResult`] **exactly once**, no
//!   matter how a success and a failure race,
//! - other threads only ever talk to a loop by posting messages.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tempus::{LoopGroup, TimeClient, TimeServer};
//! use std::sync::mpsc;
//!
//! #[tempus::main(loops = 2)]
//! fn main(group: LoopGroup) {
//!     let mut server = TimeServer::new(group.clone());
//!     server.set_request_handler(|responder| responder.complete_now());
//!
//!     let (tx, rx) = mpsc::channel();
//!     server
//!         .listen(0, "127.0.0.1", move |bound| tx.send(bound).unwrap())
//!         .unwrap();
//!     let port = rx.recv().unwrap().unwrap().port();
//!
//!     let (tx, rx) = mpsc::channel();
//!     TimeClient::new(group)
//!         .get_time(port, "127.0.0.1", move |time| tx.send(time).unwrap())
//!         .unwrap();
//!     println!("server time: {} ms", rx.recv().unwrap().unwrap());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: TIME wire encoding and the buffering decoder
//! - [`trace`]: `tracing` subscriber setup for binaries and tests
//!
//! Only Linux (`epoll`) is supported.
//!
//! [RFC 868]: https://www.rfc-editor.org/rfc/rfc868

mod addr;
mod client;
mod error;
mod handler;
mod reactor;
mod result;
mod runtime;
mod server;
mod utils;

pub mod codec;
pub mod trace;

pub use client::{ClientOptions, TimeClient};
pub use error::{ContextError, Result, TimeError, TransportError};
pub use handler::Responder;
pub use reactor::LoopHandle;
pub use result::SingleShotResult;
pub use runtime::{ErrorHook, ExecutionContext, LoopGroup, LoopGroupBuilder};
pub use server::{ServerOptions, TimeServer};

pub use tempus_macros::*;
