//! TIME client.

use crate::addr::resolve;
use crate::error::TimeError;
use crate::handler::{ClientConnection, ResultCallback};
use crate::reactor::ChannelId;
use crate::reactor::channel::ChannelHandler;
use crate::reactor::command::{Command, ConnectFactory};
use crate::runtime::{ExecutionContext, LoopGroup};

use std::time::Duration;

use tracing::debug;

/// Options applied to every [`TimeClient::get_time`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// How long a connect may stay pending. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// A TIME protocol client.
///
/// Each [`get_time`](Self::get_time) call opens its own connection on a
/// freshly acquired [`ExecutionContext`] and reports exactly one outcome.
#[derive(Clone)]
pub struct TimeClient {
    group: LoopGroup,
    options: ClientOptions,
}

impl TimeClient {
    pub fn new(group: LoopGroup) -> Self {
        Self::with_options(group, ClientOptions::default())
    }

    pub fn with_options(group: LoopGroup, options: ClientOptions) -> Self {
        Self { group, options }
    }

    /// Asks the server at `host:port` for the time.
    ///
    /// `on_result` runs exactly once, on the returned context's loop thread,
    /// with the server time in milliseconds since the Unix epoch or the
    /// reason the request failed: [`TimeError::ConnectFailure`] if no
    /// connection could be made, [`TimeError::Transport`] otherwise.
    ///
    /// # Errors
    ///
    /// [`TimeError::Shutdown`] if the loop group has shut down; `on_result`
    /// is not called.
    pub fn get_time<F>(
        &self,
        port: u16,
        host: &str,
        on_result: F,
    ) -> Result<ExecutionContext, TimeError>
    where
        F: FnOnce(Result<i64, TimeError>) + Send + 'static,
    {
        let context = self.group.context()?;
        let target = format!("{host}:{port}");

        let address = match resolve(host, port) {
            Ok(address) => address,
            Err(err) => {
                let err = TimeError::connect(target, err);
                context.dispatch(move || on_result(Err(err)));
                return Ok(context);
            }
        };

        let id = ChannelId::next();
        let callback: ResultCallback = Box::new(on_result);
        let connection = context.clone();
        let factory: ConnectFactory = Box::new(move || -> Box<dyn ChannelHandler> {
            Box::new(ClientConnection::new(connection, target, callback))
        });

        context
            .loop_handle()
            .send(Command::Connect {
                id,
                address,
                timeout: self.options.connect_timeout,
                factory,
            })
            .map_err(|_| TimeError::Shutdown)?;

        debug!(channel = %id, %address, loop_index = context.loop_handle().index(), "time requested");

        Ok(context)
    }
}
