//! Reactor core and event handling.
//!
//! Each event loop in a [`LoopGroup`](crate::LoopGroup) is one reactor
//! running on its own thread. The reactor is responsible for:
//! - driving socket readiness through the poller,
//! - owning every socket and handler assigned to it,
//! - enforcing connect deadlines,
//! - running tasks posted by other threads.
//!
//! Nothing outside the loop thread touches a reactor's sockets; all
//! interaction goes through [`Command`](command::Command)s posted on a
//! [`LoopHandle`].

mod core;
mod event;
mod io;
mod poller;
mod timer;

pub(crate) mod channel;
pub(crate) mod command;

pub(crate) use channel::ChannelId;
pub use core::LoopHandle;

pub(crate) use core::Reactor;
