use crate::codec::TimeDecoder;
use crate::error::{TimeError, TransportError};
use crate::reactor::ChannelId;
use crate::reactor::channel::{Channel, ChannelHandler};
use crate::result::SingleShotResult;
use crate::runtime::ExecutionContext;

use std::io;

use tracing::{debug, trace};

/// Receives the outcome of one `get_time` call.
pub(crate) type ResultCallback = Box<dyn FnOnce(Result<i64, TimeError>) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Connecting,
    AwaitingData,
    Completed,
    Failed,
    Closed,
}

/// Client side of one TIME exchange.
///
/// Waits for the four response bytes, decodes them and closes. Whatever
/// happens first (a decoded value, a connect or transport failure, or the
/// peer closing early) completes the result; the callback then runs once,
/// through the call's context.
pub(crate) struct ClientConnection {
    context: ExecutionContext,

    /// `host:port` as the application gave it, for connect errors.
    target: String,

    state: State,
    decoder: TimeDecoder,
    result: SingleShotResult<i64>,
}

impl ClientConnection {
    pub(crate) fn new(context: ExecutionContext, target: String, callback: ResultCallback) -> Self {
        let mut result = SingleShotResult::new();

        let dispatcher = context.clone();
        result.on_complete(move |outcome| dispatcher.dispatch(move || callback(outcome)));

        Self {
            context,
            target,
            state: State::Connecting,
            decoder: TimeDecoder::new(),
            result,
        }
    }

    fn finish(&mut self, id: ChannelId, outcome: Result<i64, TimeError>) {
        let succeeded = outcome.is_ok();
        let won = match outcome {
            Ok(millis) => self.result.complete(millis),
            Err(err) => self.result.fail(err),
        };

        if won {
            self.state = if succeeded {
                State::Completed
            } else {
                State::Failed
            };
        } else {
            debug!(channel = %id, "time request already settled, outcome dropped");
        }
    }
}

impl ChannelHandler for ClientConnection {
    fn on_active(&mut self, channel: &mut Channel<'_>) {
        self.context.assert_on_loop();
        self.state = State::AwaitingData;
        trace!(channel = %channel.id(), peer = %channel.peer_addr(), "awaiting time");
    }

    fn on_data(&mut self, channel: &mut Channel<'_>, data: &[u8]) {
        if self.state != State::AwaitingData {
            return;
        }

        if let Some(millis) = self.decoder.feed(data) {
            self.finish(channel.id(), Ok(millis));
            channel.close();
        }
    }

    fn on_read_closed(&mut self, channel: &mut Channel<'_>) {
        if self.state == State::AwaitingData {
            let received = self.decoder.received();
            self.finish(channel.id(), Err(TransportError::ShortResponse { received }.into()));
        }

        channel.close();
    }

    fn on_error(&mut self, channel: &mut Channel<'_>, error: io::Error) {
        let err = if self.state == State::Connecting {
            TimeError::connect(self.target.as_str(), error)
        } else {
            TransportError::io(channel.peer_addr(), error).into()
        };

        self.finish(channel.id(), Err(err));
        channel.close();
    }

    fn on_close(&mut self, id: ChannelId) {
        if !self.result.is_complete() {
            self.finish(id, Err(TransportError::Closed.into()));
        }

        self.state = State::Closed;
        trace!(channel = %id, "client connection closed");
    }
}
