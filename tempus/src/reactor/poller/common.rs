use std::os::fd::RawFd;

/// Readiness a registered descriptor is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    pub(crate) const READ: Interest = Interest {
        read: true,
        write: false,
    };

    pub(crate) const WRITE: Interest = Interest {
        read: false,
        write: true,
    };
}

/// Wake-up handle for a poller blocked in `poll`.
///
/// Wraps the poller's `eventfd`; see the backend for the `wake` impl.
pub(crate) struct Waker(pub(crate) RawFd);
