use crate::codec::encode_system_time;
use crate::error::{TimeError, TransportError};
use crate::reactor::ChannelId;
use crate::reactor::channel::{Channel, ChannelHandler, Outbound};
use crate::result::SingleShotResult;
use crate::runtime::ExecutionContext;

use std::any::Any;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, trace};

/// The application's request handler, shared by every accepted connection.
pub(crate) type RequestHandler = Arc<dyn Fn(Responder) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Inactive,
    AwaitingResult,
    /// An outcome arrived; the response is being written, or the channel
    /// is being closed without one.
    Completing,
    Closed,
}

/// Outcome posted by a [`Responder`] to its connection's loop.
struct Answer(Result<SystemTime, TimeError>);

/// Server side of one TIME exchange.
///
/// On activation the connection hands a [`Responder`] to the application
/// and waits. The first outcome to reach its [`SingleShotResult`], whether
/// the responder's answer or a transport failure, decides what is sent.
pub(crate) struct ServerConnection {
    context: ExecutionContext,
    handler: RequestHandler,
    state: State,
    result: SingleShotResult<SystemTime>,
}

impl ServerConnection {
    pub(crate) fn new(context: ExecutionContext, handler: RequestHandler) -> Self {
        Self {
            context,
            handler,
            state: State::Inactive,
            result: SingleShotResult::new(),
        }
    }

    fn settle(&mut self, id: ChannelId, outcome: Result<SystemTime, TimeError>) {
        let won = match outcome {
            Ok(time) => self.result.complete(time),
            Err(err) => {
                trace!(channel = %id, error = %err, "failing request");
                self.result.fail(err)
            }
        };

        if !won {
            debug!(channel = %id, "request already settled, outcome dropped");
        }
    }
}

impl ChannelHandler for ServerConnection {
    fn on_active(&mut self, channel: &mut Channel<'_>) {
        self.context.assert_on_loop();
        self.state = State::AwaitingResult;

        let outbound = channel.outbound();
        let writer = outbound.clone();

        self.result.on_complete(move |outcome| match outcome {
            Ok(time) => {
                writer.write_and_close(encode_system_time(time).to_vec());
            }
            Err(err) => {
                debug!(channel = %writer.id(), error = %err, "closing without a response");
                writer.close();
            }
        });

        let handler = self.handler.clone();
        let responder = Responder::new(outbound, channel.peer_addr());

        self.context.dispatch(move || handler(responder));
    }

    fn on_data(&mut self, channel: &mut Channel<'_>, data: &[u8]) {
        trace!(channel = %channel.id(), len = data.len(), "ignoring client bytes");
    }

    fn on_write_complete(&mut self, channel: &mut Channel<'_>) {
        trace!(channel = %channel.id(), peer = %channel.peer_addr(), "response flushed");
    }

    fn on_read_closed(&mut self, channel: &mut Channel<'_>) {
        // The write side stays usable, so a client that shut down its
        // sending half still gets its answer.
        trace!(channel = %channel.id(), state = ?self.state, "client finished sending");
    }

    fn on_event(&mut self, channel: &mut Channel<'_>, event: Box<dyn Any + Send>) {
        let Ok(answer) = event.downcast::<Answer>() else {
            return;
        };

        if self.state != State::AwaitingResult {
            debug!(channel = %channel.id(), state = ?self.state, "late answer dropped");
            return;
        }

        self.state = State::Completing;
        self.settle(channel.id(), answer.0);
    }

    fn on_error(&mut self, channel: &mut Channel<'_>, error: io::Error) {
        if self.state == State::AwaitingResult {
            self.state = State::Completing;
            let err = TransportError::io(channel.peer_addr(), error);
            self.settle(channel.id(), Err(err.into()));
        } else {
            debug!(channel = %channel.id(), error = %error, "error after completion");
        }

        channel.close();
    }

    fn on_close(&mut self, id: ChannelId) {
        if self.state == State::AwaitingResult {
            self.settle(id, Err(TransportError::Closed.into()));
        }

        self.state = State::Closed;
        trace!(channel = %id, "server connection closed");
    }
}

/// Answers one TIME request.
///
/// A `Responder` is handed to the request handler for every accepted
/// connection. It can be moved to any thread and answered later; the answer
/// is posted back to the connection's event loop.
///
/// Dropping a `Responder` without answering closes the connection without a
/// response.
pub struct Responder {
    outbound: Option<Outbound>,
    peer: SocketAddr,
}

impl Responder {
    fn new(outbound: Outbound, peer: SocketAddr) -> Self {
        Self {
            outbound: Some(outbound),
            peer,
        }
    }

    /// Address of the requesting client.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sends `time` to the client and closes the connection.
    pub fn complete(mut self, time: SystemTime) {
        self.answer(Ok(time));
    }

    /// Sends the current system time.
    pub fn complete_now(self) {
        self.complete(SystemTime::now());
    }

    /// Closes the connection without a response.
    pub fn reject(mut self, reason: impl Into<String>) {
        self.answer(Err(TimeError::Rejected(reason.into())));
    }

    fn answer(&mut self, outcome: Result<SystemTime, TimeError>) {
        let Some(outbound) = self.outbound.take() else {
            return;
        };

        if !outbound.notify(Answer(outcome)) {
            debug!(channel = %outbound.id(), "event loop stopped before the answer arrived");
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.answer(Err(TimeError::Abandoned));
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("peer", &self.peer)
            .field("answered", &self.outbound.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::Reactor;
    use crate::reactor::channel::CloseMode;
    use crate::reactor::command::Command;

    use std::sync::mpsc;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_answer_after_transport_error_is_dropped() {
        let (handle, join) =
            Reactor::start(0, "server-conn-test", 16).expect("Failed to start event loop");
        let context = ExecutionContext::new(handle.clone(), Arc::new(|_| {}));

        let (tx, rx) = mpsc::channel();
        let on_loop = context.clone();
        context.dispatch(move || {
            let handler: RequestHandler = Arc::new(|responder: Responder| drop(responder));
            let mut connection = ServerConnection::new(on_loop.clone(), handler);

            let id = ChannelId::next();
            let mut close = CloseMode::Open;
            let mut channel = Channel {
                id,
                peer: "127.0.0.1:37".parse().expect("Invalid address"),
                close: &mut close,
                handle: on_loop.loop_handle(),
            };

            let mut states = vec![connection.state];

            connection.on_active(&mut channel);
            states.push(connection.state);

            connection.on_error(&mut channel, io::ErrorKind::ConnectionReset.into());
            states.push(connection.state);

            connection.on_event(&mut channel, Box::new(Answer(Ok(UNIX_EPOCH))));
            states.push(connection.state);

            connection.on_close(id);
            states.push(connection.state);

            let _ = tx.send((states, connection.result.is_failed(), close));
        });

        let (states, failed, close) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("Task never ran");

        assert_eq!(
            states,
            vec![
                State::Inactive,
                State::AwaitingResult,
                State::Completing,
                State::Completing,
                State::Closed,
            ]
        );
        assert!(failed);
        assert_eq!(close, CloseMode::Now);

        let _ = handle.send(Command::Shutdown);
        join.join().expect("Event loop panicked");
    }
}
