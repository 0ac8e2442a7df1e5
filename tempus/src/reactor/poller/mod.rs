//! Platform-specific I/O poller.
//!
//! The poller is used by each event loop to:
//! - wait for socket readiness,
//! - be woken when another thread posts a command,
//! - bound its sleep by the next timer deadline.
//!
//! Only the Linux `epoll` backend exists; the socket helpers in
//! [`unix`] are shared by every unix target.

pub(crate) mod common;

pub(crate) use common::{Interest, Waker};

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(not(target_os = "linux"))]
compile_error!("tempus currently supports only Linux (epoll)");

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
