use super::channel::{Channel, ChannelHandler, ChannelId, CloseMode};
use super::command::{AcceptFactory, BindCallback, Command, ListenOptions};
use super::event::Event;
use super::io::{Connection, IoEntry, Listener};
use super::poller::platform::{
    RawFd, connect_in_progress, sys_accept, sys_bind, sys_close, sys_connect,
    sys_get_socket_error, sys_ipv6_is_necessary, sys_listen, sys_read, sys_send,
    sys_set_reuseaddr, sys_socket, sys_sockname,
};
use super::poller::{Interest, Poller, Waker};
use super::timer::TimerEntry;
use crate::utils::Slab;

use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SendError, Sender};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

/// Size of the stack buffer used for each `read(2)`.
const READ_CHUNK: usize = 4096;

/// Most bytes read from one connection per readiness event. The poller is
/// level-triggered, so whatever is left is picked up on the next turn.
const READ_BUDGET: usize = 16 * READ_CHUNK;

/// Handle to one event loop, usable from any thread.
///
/// A handle identifies the loop (its index in the group and the id of the
/// thread running it) and is the only way to hand work to that loop.
#[derive(Clone)]
pub struct LoopHandle {
    inner: Arc<LoopShared>,
}

struct LoopShared {
    index: usize,
    thread: ThreadId,
    sender: Sender<Command>,
    waker: Arc<Waker>,
}

impl LoopHandle {
    /// Position of this loop in its group.
    pub fn index(&self) -> usize {
        self.inner.index
    }

    /// Id of the thread that runs this loop.
    pub fn thread_id(&self) -> ThreadId {
        self.inner.thread
    }

    /// Returns `true` when called from this loop's own thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread
    }

    /// Posts a command and wakes the loop.
    ///
    /// Fails once the loop has stopped and dropped its receiver.
    pub(crate) fn send(&self, command: Command) -> Result<(), SendError<Command>> {
        self.inner.sender.send(command)?;
        self.inner.waker.wake();
        Ok(())
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("index", &self.inner.index)
            .field("thread", &self.inner.thread)
            .finish()
    }
}

enum ReadState {
    /// Nothing more to read this turn.
    Open,
    Eof,
    Failed(io::Error),
}

/// The event loop that owns every socket assigned to it.
///
/// The reactor runs on its own thread and is the only code that touches its
/// sockets and the handlers attached to them. Other threads talk to it by
/// posting [`Command`]s through a [`LoopHandle`].
pub(crate) struct Reactor {
    /// Handle to this loop, lent to handlers through [`Channel`].
    handle: LoopHandle,

    receiver: Receiver<Command>,
    poller: Poller,

    /// Readiness events from the last poll.
    events: Vec<Event>,

    /// Pending connect deadlines.
    timers: BinaryHeap<TimerEntry>,

    /// Registered sockets, indexed by poller token.
    io: Slab<IoEntry>,

    /// Maps channel ids to slab tokens.
    tokens: HashMap<ChannelId, usize>,
}

impl Reactor {
    /// Spawns a loop thread named `{name}-{index}`.
    ///
    /// `capacity` sizes the poller's event buffer and the initial slab.
    pub(crate) fn start(
        index: usize,
        name: &str,
        capacity: usize,
    ) -> io::Result<(LoopHandle, JoinHandle<()>)> {
        let (sender, receiver) = mpsc::channel();
        let poller = Poller::new(capacity)?;
        let waker = poller.waker();
        let (handle_tx, handle_rx) = mpsc::channel::<LoopHandle>();

        let join = thread::Builder::new()
            .name(format!("{name}-{index}"))
            .spawn(move || {
                let Ok(handle) = handle_rx.recv() else {
                    return;
                };

                let mut reactor = Reactor {
                    handle,
                    receiver,
                    poller,
                    events: Vec::with_capacity(capacity),
                    timers: BinaryHeap::new(),
                    io: Slab::new(capacity.min(64)),
                    tokens: HashMap::new(),
                };

                debug!(loop_index = index, "event loop started");

                if let Err(err) = reactor.run() {
                    error!(loop_index = index, error = %err, "event loop failed");
                    reactor.shutdown();
                }

                debug!(loop_index = index, "event loop stopped");
            })?;

        let handle = LoopHandle {
            inner: Arc::new(LoopShared {
                index,
                thread: join.thread().id(),
                sender,
                waker,
            }),
        };

        // The thread only exits early if this send fails, which it cannot:
        // the receiver is alive until the thread reads from it.
        let _ = handle_tx.send(handle.clone());

        Ok((handle, join))
    }

    fn run(&mut self) -> io::Result<()> {
        loop {
            let events: Vec<Event> = self.events.drain(..).collect();
            for event in events {
                self.handle_event(event);
            }

            while let Ok(command) = self.receiver.try_recv() {
                if !self.handle_command(command) {
                    self.shutdown();
                    return Ok(());
                }
            }

            let timeout = self
                .timers
                .peek()
                .map(|timer| timer.deadline.saturating_duration_since(Instant::now()));

            self.poller.poll(&mut self.events, timeout)?;
            self.fire_timers();
        }
    }

    /// Applies one command. Returns `false` when the loop should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Listen {
                id,
                address,
                options,
                factory,
                on_bound,
            } => self.listen(id, address, options, factory, on_bound),

            Command::Connect {
                id,
                address,
                timeout,
                factory,
            } => self.connect(id, address, timeout, factory()),

            Command::Write {
                id,
                bytes,
                close_after,
            } => {
                let Some(token) = self.token_of(id) else {
                    trace!(channel = %id, len = bytes.len(), "write for closed channel dropped");
                    return true;
                };

                if let Some(IoEntry::Connection(conn)) = self.io.get_mut(token) {
                    conn.out_buffer.extend_from_slice(&bytes);
                    if close_after && conn.close == CloseMode::Open {
                        conn.close = CloseMode::AfterFlush;
                    }
                }

                self.settle(token);
            }

            Command::Close { id } => {
                if let Some(token) = self.token_of(id) {
                    self.cleanup(token);
                }
            }

            Command::Notify { id, event } => {
                let Some(token) = self.token_of(id) else {
                    debug!(channel = %id, "event for closed channel dropped");
                    return true;
                };

                self.with_channel(token, |handler, channel| handler.on_event(channel, event));
                self.settle(token);
            }

            Command::Dispatch(task) => task(),

            Command::Shutdown => return false,
        }

        true
    }

    fn handle_event(&mut self, event: Event) {
        enum Kind {
            Listener,
            Connecting,
            Stream,
            HalfClosed,
        }

        let token = event.token;
        let kind = match self.io.get(token) {
            Some(IoEntry::Listener(_)) => Kind::Listener,
            Some(IoEntry::Connection(conn)) if conn.connecting => Kind::Connecting,
            Some(IoEntry::Connection(conn)) if conn.read_closed => Kind::HalfClosed,
            Some(IoEntry::Connection(_)) => Kind::Stream,
            None => {
                trace!(token, "event for released token ignored");
                return;
            }
        };

        match kind {
            Kind::Listener => {
                if event.readable {
                    self.accept_ready(token);
                }
            }
            Kind::Connecting => self.finish_connect(token),
            Kind::HalfClosed => {
                if event.writable {
                    self.settle(token);
                }
                // Without read interest, readable only reports a hang-up or an error.
                if event.readable {
                    self.hang_up(token);
                }
            }
            Kind::Stream => {
                if event.readable {
                    self.read_ready(token);
                }
                if event.writable {
                    self.settle(token);
                }
            }
        }
    }

    fn listen(
        &mut self,
        id: ChannelId,
        address: SocketAddr,
        options: ListenOptions,
        factory: AcceptFactory,
        on_bound: BindCallback,
    ) {
        let outcome = self.open_listener(id, address, options, factory);

        if let Err(err) = &outcome {
            warn!(listener = %id, %address, error = %err, "bind failed");
        }

        on_bound(outcome);
    }

    fn open_listener(
        &mut self,
        id: ChannelId,
        address: SocketAddr,
        options: ListenOptions,
        factory: AcceptFactory,
    ) -> io::Result<SocketAddr> {
        let fd = sys_socket(&address)?;

        let setup = (|| {
            if options.reuse_address {
                sys_set_reuseaddr(fd)?;
            }
            sys_ipv6_is_necessary(fd, &address)?;
            sys_bind(fd, &address)?;
            sys_listen(fd, options.backlog)?;
            sys_sockname(fd)
        })();

        let local = match setup {
            Ok(local) => local,
            Err(err) => {
                sys_close(fd);
                return Err(err);
            }
        };

        let token = self.io.insert(IoEntry::Listener(Listener {
            id,
            fd,
            local,
            factory,
        }));

        if let Err(err) = self.poller.register(fd, token, Interest::READ) {
            self.io.remove(token);
            sys_close(fd);
            return Err(err);
        }

        self.tokens.insert(id, token);
        debug!(listener = %id, %local, "listening");

        Ok(local)
    }

    fn accept_ready(&mut self, token: usize) {
        loop {
            let Some(IoEntry::Listener(listener)) = self.io.get(token) else {
                return;
            };
            let listener_id = listener.id;

            match sys_accept(listener.fd) {
                Ok((fd, peer)) => self.adopt(token, fd, peer),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    continue;
                }
                Err(err) => {
                    warn!(listener = %listener_id, error = %err, "accept failed");
                    return;
                }
            }
        }
    }

    /// Registers an accepted socket and activates its handler.
    fn adopt(&mut self, listener: usize, fd: RawFd, peer: SocketAddr) {
        let handler = match self.io.get_mut(listener) {
            Some(IoEntry::Listener(listener)) => (listener.factory)(),
            _ => {
                sys_close(fd);
                return;
            }
        };

        let id = ChannelId::next();
        let token = self
            .io
            .insert(IoEntry::Connection(Connection::accepted(id, fd, peer, handler)));

        if let Err(err) = self.poller.register(fd, token, Interest::READ) {
            warn!(channel = %id, %peer, error = %err, "failed to register accepted connection");
            self.io.remove(token);
            sys_close(fd);
            return;
        }

        self.tokens.insert(id, token);
        trace!(channel = %id, %peer, "accepted");

        self.with_channel(token, |handler, channel| handler.on_active(channel));
        self.settle(token);
    }

    fn connect(
        &mut self,
        id: ChannelId,
        address: SocketAddr,
        timeout: Option<Duration>,
        handler: Box<dyn ChannelHandler>,
    ) {
        let fd = match sys_socket(&address) {
            Ok(fd) => fd,
            Err(err) => return self.reject(id, address, handler, err),
        };

        let token = self
            .io
            .insert(IoEntry::Connection(Connection::connecting(id, fd, address, handler)));
        self.tokens.insert(id, token);

        let connected = match sys_connect(fd, &address) {
            Ok(()) => true,
            Err(err) if connect_in_progress(&err) => false,
            Err(err) => return self.fail_channel(token, err),
        };

        if let Err(err) = self.poller.register(fd, token, Interest::WRITE) {
            return self.fail_channel(token, err);
        }

        if connected {
            self.finish_connect(token);
            return;
        }

        if let Some(timeout) = timeout {
            self.timers.push(TimerEntry {
                deadline: Instant::now() + timeout,
                id,
            });
        }

        trace!(channel = %id, %address, "connect in progress");
    }

    fn finish_connect(&mut self, token: usize) {
        let Some(IoEntry::Connection(conn)) = self.io.get_mut(token) else {
            return;
        };

        match sys_get_socket_error(conn.fd) {
            Ok(()) => {
                conn.connecting = false;
                trace!(channel = %conn.id, peer = %conn.peer, "connected");

                self.with_channel(token, |handler, channel| handler.on_active(channel));
                self.settle(token);
            }
            Err(err) => self.fail_channel(token, err),
        }
    }

    /// Reports an error to a handler whose socket never reached the slab.
    fn reject(
        &self,
        id: ChannelId,
        peer: SocketAddr,
        mut handler: Box<dyn ChannelHandler>,
        err: io::Error,
    ) {
        let mut close = CloseMode::Now;
        let mut channel = Channel {
            id,
            peer,
            close: &mut close,
            handle: &self.handle,
        };

        handler.on_error(&mut channel, err);
        handler.on_close(id);
    }

    fn read_ready(&mut self, token: usize) {
        let Some(IoEntry::Connection(conn)) = self.io.get(token) else {
            return;
        };

        let (data, state) = read_available(conn.fd, READ_BUDGET);

        if !data.is_empty() {
            self.with_channel(token, |handler, channel| handler.on_data(channel, &data));
        }

        match state {
            ReadState::Open => self.settle(token),
            ReadState::Eof => {
                trace!(token, "peer closed its write side");
                if let Some(IoEntry::Connection(conn)) = self.io.get_mut(token) {
                    conn.read_closed = true;
                }
                self.with_channel(token, |handler, channel| handler.on_read_closed(channel));
                self.settle(token);
            }
            ReadState::Failed(err) => self.fail_channel(token, err),
        }
    }

    /// The peer is gone while the channel still waited to write.
    fn hang_up(&mut self, token: usize) {
        let Some(IoEntry::Connection(conn)) = self.io.get(token) else {
            return;
        };

        match sys_get_socket_error(conn.fd) {
            Ok(()) => {
                trace!(channel = %conn.id, "peer hung up");
                self.cleanup(token);
            }
            Err(err) => self.fail_channel(token, err),
        }
    }

    /// Flushes queued output, applies close requests and updates interest.
    ///
    /// Called after every handler callback on a connection.
    fn settle(&mut self, token: usize) {
        loop {
            let Some(IoEntry::Connection(conn)) = self.io.get_mut(token) else {
                return;
            };

            if conn.connecting {
                return;
            }
            if conn.close == CloseMode::Now {
                break;
            }

            if !conn.out_buffer.is_empty() {
                if let Err(err) = flush(conn.fd, &mut conn.out_buffer) {
                    return self.fail_channel(token, err);
                }

                if conn.out_buffer.is_empty() {
                    self.with_channel(token, |handler, channel| {
                        handler.on_write_complete(channel)
                    });
                    continue;
                }
            }

            if conn.out_buffer.is_empty() && conn.close == CloseMode::AfterFlush {
                break;
            }

            let wanted = conn.wanted_interest();
            if wanted != conn.interest {
                match self.poller.reregister(conn.fd, token, wanted) {
                    Ok(()) => conn.interest = wanted,
                    Err(err) => return self.fail_channel(token, err),
                }
            }

            return;
        }

        self.cleanup(token);
    }

    fn fail_channel(&mut self, token: usize, err: io::Error) {
        if let Some(IoEntry::Connection(conn)) = self.io.get(token) {
            debug!(channel = %conn.id, peer = %conn.peer, error = %err, "channel failed");
        }

        self.with_channel(token, |handler, channel| handler.on_error(channel, err));
        self.cleanup(token);
    }

    /// Releases a socket and, for connections, notifies the handler.
    ///
    /// Releasing an already released token does nothing.
    fn cleanup(&mut self, token: usize) {
        let Some(entry) = self.io.remove(token) else {
            return;
        };

        self.poller.deregister(entry.fd());
        sys_close(entry.fd());
        self.tokens.remove(&entry.id());

        match entry {
            IoEntry::Listener(listener) => {
                debug!(listener = %listener.id, local = %listener.local, "listener closed");
            }
            IoEntry::Connection(mut conn) => {
                if !conn.out_buffer.is_empty() {
                    debug!(
                        channel = %conn.id,
                        unsent = conn.out_buffer.len(),
                        "closing with unsent bytes"
                    );
                }

                trace!(channel = %conn.id, "channel closed");
                conn.handler.on_close(conn.id);
            }
        }
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();

        while self.timers.peek().is_some_and(|timer| timer.deadline <= now) {
            let Some(timer) = self.timers.pop() else {
                break;
            };
            let Some(token) = self.token_of(timer.id) else {
                continue;
            };

            let connecting =
                matches!(self.io.get(token), Some(IoEntry::Connection(conn)) if conn.connecting);
            if connecting {
                self.fail_channel(
                    token,
                    io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                );
            }
        }
    }

    /// Closes every socket, then runs whatever is still queued.
    ///
    /// Tasks posted by the closing handlers still run so pending callbacks
    /// are delivered. Binds and connects that never started are refused.
    fn shutdown(&mut self) {
        debug!(open = self.io.len(), "closing channels");
        for token in self.io.indices() {
            self.cleanup(token);
        }
        self.timers.clear();

        while let Ok(command) = self.receiver.try_recv() {
            match command {
                Command::Dispatch(task) => task(),
                Command::Listen { on_bound, .. } => {
                    on_bound(Err(io::Error::other("event loop shut down")));
                }
                Command::Connect {
                    id,
                    address,
                    factory,
                    ..
                } => self.reject(id, address, factory(), io::Error::other("event loop shut down")),
                _ => {}
            }
        }
    }

    fn token_of(&self, id: ChannelId) -> Option<usize> {
        self.tokens.get(&id).copied()
    }

    /// Runs `f` with a connection's handler and a view of its channel.
    fn with_channel<R>(
        &mut self,
        token: usize,
        f: impl FnOnce(&mut Box<dyn ChannelHandler>, &mut Channel<'_>) -> R,
    ) -> Option<R> {
        let handle = &self.handle;
        let Some(IoEntry::Connection(conn)) = self.io.get_mut(token) else {
            return None;
        };

        let mut channel = Channel {
            id: conn.id,
            peer: conn.peer,
            close: &mut conn.close,
            handle,
        };

        Some(f(&mut conn.handler, &mut channel))
    }
}

/// Reads until the socket would block, reaches end of stream or fails, or
/// until `budget` bytes have been read.
fn read_available(fd: RawFd, budget: usize) -> (Vec<u8>, ReadState) {
    let mut data = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if data.len() >= budget {
            return (data, ReadState::Open);
        }


        let want = READ_CHUNK.min(budget - data.len());
        let n = sys_read(fd, &mut chunk[..want]);

        match n {
            1.. => data.extend_from_slice(&chunk[..n as usize]),
            0 => return (data, ReadState::Eof),
            _ => {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => return (data, ReadState::Open),
                    io::ErrorKind::Interrupted => continue,
                    _ => return (data, ReadState::Failed(err)),
                }
            }
        }
    }
}

/// Writes as much of `buffer` as the socket accepts and drops what was sent.
fn flush(fd: RawFd, buffer: &mut Vec<u8>) -> io::Result<()> {
    let mut written = 0;

    while written < buffer.len() {
        let n = sys_send(fd, &buffer[written..]);

        if n > 0 {
            written += n as usize;
            continue;
        }

        let err = if n == 0 {
            io::Error::from(io::ErrorKind::WriteZero)
        } else {
            io::Error::last_os_error()
        };

        match err.kind() {
            io::ErrorKind::WouldBlock => break,
            io::ErrorKind::Interrupted => continue,
            _ => {
                buffer.drain(..written);
                return Err(err);
            }
        }
    }

    buffer.drain(..written);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{READ_CHUNK, ReadState, read_available};

    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_read_available_stops_at_budget() {
        let (mut writer, reader) = UnixStream::pair().expect("Failed to create socket pair");
        reader
            .set_nonblocking(true)
            .expect("Failed to set non-blocking");

        writer
            .write_all(&[7u8; 3 * READ_CHUNK])
            .expect("Failed to write");

        let (data, state) = read_available(reader.as_raw_fd(), READ_CHUNK);
        assert_eq!(data.len(), READ_CHUNK);
        assert!(matches!(state, ReadState::Open));

        let (data, state) = read_available(reader.as_raw_fd(), 4 * READ_CHUNK);
        assert_eq!(data.len(), 2 * READ_CHUNK);
        assert!(matches!(state, ReadState::Open));

        drop(writer);
        let (data, state) = read_available(reader.as_raw_fd(), READ_CHUNK);
        assert!(data.is_empty());
        assert!(matches!(state, ReadState::Eof));
    }
}
