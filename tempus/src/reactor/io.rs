use super::channel::{ChannelHandler, ChannelId, CloseMode};
use super::command::AcceptFactory;
use crate::reactor::poller::Interest;
use crate::reactor::poller::platform::RawFd;

use std::net::SocketAddr;

/// An entry registered in the event loop's slab.
pub(crate) enum IoEntry {
    /// A listening socket.
    Listener(Listener),

    /// A connected, or connecting, stream socket.
    Connection(Connection),
}

impl IoEntry {
    pub(crate) fn id(&self) -> ChannelId {
        match self {
            IoEntry::Listener(listener) => listener.id,
            IoEntry::Connection(connection) => connection.id,
        }
    }

    pub(crate) fn fd(&self) -> RawFd {
        match self {
            IoEntry::Listener(listener) => listener.fd,
            IoEntry::Connection(connection) => connection.fd,
        }
    }
}

/// A listening socket and the factory for its connections' handlers.
pub(crate) struct Listener {
    pub(crate) id: ChannelId,
    pub(crate) fd: RawFd,
    pub(crate) local: SocketAddr,
    pub(crate) factory: AcceptFactory,
}

/// A stream socket owned by the event loop.
pub(crate) struct Connection {
    pub(crate) id: ChannelId,
    pub(crate) fd: RawFd,
    pub(crate) peer: SocketAddr,

    /// `true` until a non-blocking connect resolves.
    pub(crate) connecting: bool,

    /// The peer has shut down its write side. Only writes remain.
    pub(crate) read_closed: bool,

    /// Bytes queued by the handler and not yet accepted by the socket.
    pub(crate) out_buffer: Vec<u8>,

    pub(crate) close: CloseMode,

    /// Interest currently registered with the poller.
    pub(crate) interest: Interest,

    pub(crate) handler: Box<dyn ChannelHandler>,
}

impl Connection {
    /// A connection accepted by a listener.
    pub(crate) fn accepted(
        id: ChannelId,
        fd: RawFd,
        peer: SocketAddr,
        handler: Box<dyn ChannelHandler>,
    ) -> Self {
        Self {
            id,
            fd,
            peer,
            connecting: false,
            read_closed: false,
            out_buffer: Vec::new(),
            close: CloseMode::Open,
            interest: Interest::READ,
            handler,
        }
    }

    /// An outbound connection whose connect is still in flight.
    pub(crate) fn connecting(
        id: ChannelId,
        fd: RawFd,
        peer: SocketAddr,
        handler: Box<dyn ChannelHandler>,
    ) -> Self {
        Self {
            id,
            fd,
            peer,
            connecting: true,
            read_closed: false,
            out_buffer: Vec::new(),
            close: CloseMode::Open,
            interest: Interest::WRITE,
            handler,
        }
    }

    /// The interest the socket should be registered with right now.
    pub(crate) fn wanted_interest(&self) -> Interest {
        if self.connecting {
            return Interest::WRITE;
        }

        Interest {
            read: !self.read_closed,
            write: !self.out_buffer.is_empty(),
        }
    }
}
