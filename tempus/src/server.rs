//! TIME server lifecycle.

use crate::addr::resolve;
use crate::error::TimeError;
use crate::handler::{RequestHandler, Responder, ServerConnection};
use crate::reactor::ChannelId;
use crate::reactor::channel::ChannelHandler;
use crate::reactor::command::{AcceptFactory, BindCallback, Command, ListenOptions};
use crate::runtime::{ExecutionContext, LoopGroup};

use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Socket options for a [`TimeServer`]'s listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerOptions {
    /// Length of the pending-connection queue passed to `listen(2)`.
    pub backlog: i32,

    /// Whether to set `SO_REUSEADDR` before binding.
    pub reuse_address: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            backlog: 128,
            reuse_address: true,
        }
    }
}

#[derive(Debug)]
enum State {
    Idle,
    /// A bind was requested. `failed` is set on the loop thread if it fails,
    /// before `on_listen` runs.
    Listening {
        listener: ChannelId,
        failed: Arc<AtomicBool>,
    },
    /// The address did not resolve, so nothing was ever bound.
    BindFailed,
}

/// A TIME protocol server.
///
/// Every accepted connection gets a [`Responder`] passed to the registered
/// request handler; the value it is completed with is sent as the 4-byte
/// TIME response and the connection is closed.
///
/// The server acquires its [`ExecutionContext`] on the first `listen` and
/// keeps it: the listener, every accepted connection and every callback run
/// on that context's loop thread, across `close` and later `listen` calls.
///
/// Dropping the server closes its listener.
///
/// # Examples
///
/// ```rust,no_run
/// use tempus::{LoopGroupBuilder, TimeServer};
///
/// let group = LoopGroupBuilder::new().loops(1).build().unwrap();
/// let mut server = TimeServer::new(group);
///
/// server.set_request_handler(|responder| responder.complete_now());
/// server
///     .listen(3700, "127.0.0.1", |bound| match bound {
///         Ok(address) => println!("listening on {address}"),
///         Err(err) => eprintln!("{err}"),
///     })
///     .unwrap();
/// ```
pub struct TimeServer {
    group: LoopGroup,
    options: ServerOptions,
    handler: Option<RequestHandler>,
    context: Option<ExecutionContext>,
    state: State,
}

impl TimeServer {
    pub fn new(group: LoopGroup) -> Self {
        Self::with_options(group, ServerOptions::default())
    }

    pub fn with_options(group: LoopGroup, options: ServerOptions) -> Self {
        Self {
            group,
            options,
            handler: None,
            context: None,
            state: State::Idle,
        }
    }

    /// Registers the handler invoked for every accepted connection.
    ///
    /// The handler runs on the server's loop thread. Replacing it affects
    /// only listeners started afterwards.
    pub fn set_request_handler<F>(&mut self, handler: F)
    where
        F: Fn(Responder) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
    }

    /// Starts listening on `host:port`.
    ///
    /// Port `0` picks an ephemeral port; the bound address is passed to
    /// `on_listen`, which runs once on the server's loop thread with either
    /// the local address or [`TimeError::BindFailure`].
    ///
    /// Once `on_listen` has received a failure the server no longer counts
    /// as listening, and `listen` may be called again.
    ///
    /// # Errors
    ///
    /// Returned synchronously, without calling `on_listen`:
    /// - [`TimeError::AlreadyListening`] if a listener is active,
    /// - [`TimeError::NoHandlerRegistered`] if no handler was set,
    /// - [`TimeError::Shutdown`] if the loop group has shut down.
    pub fn listen<F>(&mut self, port: u16, host: &str, on_listen: F) -> Result<(), TimeError>
    where
        F: FnOnce(Result<SocketAddr, TimeError>) + Send + 'static,
    {
        if self.is_listening() {
            return Err(TimeError::AlreadyListening);
        }

        let handler = self.handler.clone().ok_or(TimeError::NoHandlerRegistered)?;

        if self.group.is_shutdown() {
            return Err(TimeError::Shutdown);
        }

        let context = ExecutionContext::acquire_or_create(&mut self.context, &self.group)?;
        let target = format!("{host}:{port}");

        let address = match resolve(host, port) {
            Ok(address) => address,
            Err(err) => {
                let err = TimeError::bind(target, err);
                self.state = State::BindFailed;
                context.dispatch(move || on_listen(Err(err)));
                return Ok(());
            }
        };

        let failed = Arc::new(AtomicBool::new(false));
        let bind_failed = failed.clone();

        let reply = context.clone();
        let on_bound: BindCallback = Box::new(move |outcome| {
            if outcome.is_err() {
                bind_failed.store(true, Ordering::Release);
            }
            let outcome = outcome.map_err(|err| TimeError::bind(target, err));
            reply.dispatch(move || on_listen(outcome));
        });

        let accepted = context.clone();
        let factory: AcceptFactory = Box::new(move || -> Box<dyn ChannelHandler> {
            Box::new(ServerConnection::new(accepted.clone(), handler.clone()))
        });

        let listener = ChannelId::next();
        let command = Command::Listen {
            id: listener,
            address,
            options: ListenOptions {
                backlog: self.options.backlog,
                reuse_address: self.options.reuse_address,
            },
            factory,
            on_bound,
        };

        context
            .loop_handle()
            .send(command)
            .map_err(|_| TimeError::Shutdown)?;

        debug!(%listener, %address, loop_index = context.loop_handle().index(), "listen requested");
        self.state = State::Listening { listener, failed };

        Ok(())
    }

    /// Closes the listener, if any.
    ///
    /// Connections already accepted finish their exchange. Closing an idle
    /// server does nothing, and the server may `listen` again afterwards.
    pub fn close(&mut self) {
        let State::Listening { listener, .. } = mem::replace(&mut self.state, State::Idle) else {
            return;
        };

        if let Some(context) = &self.context {
            // A stopped loop has already released the listener.
            let _ = context
                .loop_handle()
                .send(Command::Close { id: listener });
        }

        debug!(%listener, "listener close requested");
    }

    /// `true` from a successful `listen` call until `close`, unless the bind
    /// has been reported as failed.
    pub fn is_listening(&self) -> bool {
        match &self.state {
            State::Listening { failed, .. } => !failed.load(Ordering::Acquire),
            State::Idle | State::BindFailed => false,
        }
    }

    /// The server's context, once the first `listen` has acquired it.
    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }
}

impl Drop for TimeServer {
    fn drop(&mut self) {
        self.close();
    }
}
