//! Internal data structures.
//!
//! Exposes the [`Slab`] used by the reactor to store registered
//! sockets under small, reusable poller tokens.

mod slab;

pub(crate) use slab::Slab;
