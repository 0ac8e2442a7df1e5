use super::command::Command;
use super::core::LoopHandle;

use std::any::Any;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a channel or listener for its whole lifetime.
///
/// Ids are never reused, so a command addressed to a channel that has
/// since closed can never reach a newer one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    pub(crate) fn next() -> Self {
        ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a channel should be closed once the current callback returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CloseMode {
    Open,
    AfterFlush,
    Now,
}

/// Callbacks the event loop invokes for one channel.
///
/// Handlers live in the loop's slab and are only ever called on the loop
/// thread, in the order `on_active → on_data* → on_close`. A failed
/// connect calls `on_error` and then `on_close` without `on_active`.
pub(crate) trait ChannelHandler {
    /// The connection is established.
    fn on_active(&mut self, channel: &mut Channel<'_>);

    /// Bytes arrived on the channel.
    fn on_data(&mut self, channel: &mut Channel<'_>, data: &[u8]);

    /// The peer shut down its write side.
    ///
    /// By default the channel closes. A handler that leaves it open can
    /// still write, but receives no more data.
    fn on_read_closed(&mut self, channel: &mut Channel<'_>) {
        channel.close();
    }

    /// Every byte queued with [`Outbound::write_and_close`] has reached the
    /// socket.
    fn on_write_complete(&mut self, _channel: &mut Channel<'_>) {}

    /// An event posted through [`Outbound::notify`].
    fn on_event(&mut self, _channel: &mut Channel<'_>, _event: Box<dyn Any + Send>) {}

    /// A connect or I/O error. The channel closes after this returns.
    fn on_error(&mut self, channel: &mut Channel<'_>, error: io::Error);

    /// The channel has been closed and its socket released.
    fn on_close(&mut self, id: ChannelId);
}

/// A handler's view of its channel during a callback.
pub(crate) struct Channel<'a> {
    pub(crate) id: ChannelId,
    pub(crate) peer: SocketAddr,
    pub(crate) close: &'a mut CloseMode,
    pub(crate) handle: &'a LoopHandle,
}

impl Channel<'_> {
    pub(crate) fn id(&self) -> ChannelId {
        self.id
    }

    pub(crate) fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Closes the channel as soon as the callback returns.
    pub(crate) fn close(&mut self) {
        *self.close = CloseMode::Now;
    }

    /// A `Send` handle for acting on this channel after the callback.
    pub(crate) fn outbound(&self) -> Outbound {
        Outbound {
            handle: self.handle.clone(),
            id: self.id,
        }
    }
}

/// Posts commands for one channel to its event loop.
///
/// Commands for a channel that has already closed are dropped by the loop.
#[derive(Clone)]
pub(crate) struct Outbound {
    handle: LoopHandle,
    id: ChannelId,
}

impl Outbound {
    pub(crate) fn id(&self) -> ChannelId {
        self.id
    }

    pub(crate) fn write_and_close(&self, bytes: Vec<u8>) -> bool {
        self.post(Command::Write {
            id: self.id,
            bytes,
            close_after: true,
        })
    }

    pub(crate) fn close(&self) -> bool {
        self.post(Command::Close { id: self.id })
    }

    pub(crate) fn notify<E: Any + Send>(&self, event: E) -> bool {
        self.post(Command::Notify {
            id: self.id,
            event: Box::new(event),
        })
    }

    fn post(&self, command: Command) -> bool {
        self.handle.send(command).is_ok()
    }
}
