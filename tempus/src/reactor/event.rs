/// A readiness event reported by the poller.
///
/// Errors and hang-ups are folded into both flags, so the loop notices
/// them through the read (or pending-connect) path that owns the socket.
pub(crate) struct Event {
    /// Slab token of the registered socket.
    pub(crate) token: usize,

    /// The socket is readable, at end of stream, or in error.
    pub(crate) readable: bool,

    /// The socket is writable, or a pending connect has resolved.
    pub(crate) writable: bool,
}
