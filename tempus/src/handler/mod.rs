//! Per-connection protocol state machines.
//!
//! One handler is created on the loop thread for every accepted or
//! connected channel and dropped when the channel closes. Each owns the
//! [`SingleShotResult`](crate::SingleShotResult) for its single exchange.

mod client;
mod server;

pub(crate) use client::{ClientConnection, ResultCallback};
pub(crate) use server::{RequestHandler, ServerConnection};

pub use server::Responder;
