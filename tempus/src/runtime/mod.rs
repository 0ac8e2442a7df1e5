//! Event loop group and execution contexts.
//!
//! This module owns the loop threads and the affinity model built on them:
//! - [`LoopGroup`] starts a fixed set of reactor threads and stops them,
//! - [`ExecutionContext`] binds work to exactly one of those threads,
//! - [`LoopGroupBuilder`] configures the group.

mod builder;
mod context;
mod group;

pub use builder::LoopGroupBuilder;
pub use context::{ErrorHook, ExecutionContext};
pub use group::LoopGroup;
