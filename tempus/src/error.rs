//! Error types for the TIME client and server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

/// Main error type for every public operation.
///
/// Programmer errors ([`AlreadyListening`](TimeError::AlreadyListening),
/// [`NoHandlerRegistered`](TimeError::NoHandlerRegistered),
/// [`Shutdown`](TimeError::Shutdown)) are returned synchronously by the call
/// that violates the precondition. Everything else is delivered once,
/// asynchronously, through the callback supplied by the application.
#[derive(Debug, Clone, Error)]
pub enum TimeError {
    /// `listen` was called on a server that is already listening.
    #[error("server is already listening")]
    AlreadyListening,

    /// `listen` was called before `set_request_handler`.
    #[error("no request handler registered")]
    NoHandlerRegistered,

    /// The event loop group backing the server or client has shut down.
    #[error("event loop group has shut down")]
    Shutdown,

    /// The listening socket could not be created or bound.
    #[error("failed to bind {address}: {source}")]
    BindFailure {
        address: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// The outbound connection could not be established.
    #[error("failed to connect to {address}: {source}")]
    ConnectFailure {
        address: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// The connection failed after it became active.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request handler declined to answer.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The request handler dropped its responder without answering.
    #[error("request handler dropped the responder without answering")]
    Abandoned,
}

impl TimeError {
    pub(crate) fn bind(address: impl Into<String>, source: io::Error) -> Self {
        TimeError::BindFailure {
            address: address.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn connect(address: impl Into<String>, source: io::Error) -> Self {
        TimeError::ConnectFailure {
            address: address.into(),
            source: Arc::new(source),
        }
    }

    /// Returns `true` for errors reported synchronously by a misused API.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            TimeError::AlreadyListening | TimeError::NoHandlerRegistered | TimeError::Shutdown
        )
    }
}

/// Failures of an established connection.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// I/O error on the channel.
    #[error("I/O error on {peer}: {source}")]
    Io {
        peer: SocketAddr,
        #[source]
        source: Arc<io::Error>,
    },

    /// The peer closed the connection before a whole TIME value arrived.
    #[error("connection closed after {received} of 4 response bytes")]
    ShortResponse { received: usize },

    /// The channel closed while a result was still pending.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    pub(crate) fn io(peer: SocketAddr, source: io::Error) -> Self {
        TransportError::Io {
            peer,
            source: Arc::new(source),
        }
    }
}

/// Result type alias using [`TimeError`].
pub type Result<T> = std::result::Result<T, TimeError>;

/// Failures reported to an [`ExecutionContext`](crate::ExecutionContext)'s
/// error hook instead of unwinding into the event loop.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    /// A dispatched callback panicked. The loop keeps running.
    #[error("callback panicked on event loop {loop_index}: {message}")]
    CallbackPanicked { loop_index: usize, message: String },

    /// A task could not be queued because its event loop has stopped.
    #[error("event loop {loop_index} has terminated, task dropped")]
    LoopTerminated { loop_index: usize },
}
