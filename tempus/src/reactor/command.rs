use super::channel::{ChannelHandler, ChannelId};

use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// A unit of work posted to an event loop.
pub(crate) type Task = Box<dyn FnOnce() + Send>;

/// Builds the handler for each connection a listener accepts.
///
/// The factory is `Send` so it can travel to the loop; the handlers it
/// builds never leave the loop thread and need not be.
pub(crate) type AcceptFactory = Box<dyn FnMut() -> Box<dyn ChannelHandler> + Send>;

/// Builds the handler for an outbound connection, on the loop thread.
pub(crate) type ConnectFactory = Box<dyn FnOnce() -> Box<dyn ChannelHandler> + Send>;

/// Receives the outcome of a bind, on the loop thread.
pub(crate) type BindCallback = Box<dyn FnOnce(io::Result<SocketAddr>) + Send>;

/// Socket options applied to a listener before `listen(2)`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ListenOptions {
    pub(crate) backlog: i32,
    pub(crate) reuse_address: bool,
}

/// Messages accepted by an event loop.
///
/// Every interaction with a loop from another thread, and every deferred
/// action a handler schedules on its own loop, goes through this enum.
pub(crate) enum Command {
    /// Bind a listener and accept connections with handlers from `factory`.
    Listen {
        id: ChannelId,
        address: SocketAddr,
        options: ListenOptions,
        factory: AcceptFactory,
        on_bound: BindCallback,
    },
    /// Open an outbound connection driven by the handler from `factory`.
    Connect {
        id: ChannelId,
        address: SocketAddr,
        timeout: Option<Duration>,
        factory: ConnectFactory,
    },
    /// Queue `bytes` on a channel, optionally closing once they are flushed.
    Write {
        id: ChannelId,
        bytes: Vec<u8>,
        close_after: bool,
    },
    /// Close a channel or listener. Unknown ids are ignored.
    Close { id: ChannelId },
    /// Deliver an application event to a channel's handler.
    Notify {
        id: ChannelId,
        event: Box<dyn Any + Send>,
    },
    /// Run a task on the loop thread.
    Dispatch(Task),
    /// Close every channel and stop the loop.
    Shutdown,
}
