//! Tracing setup for binaries and tests.
//!
//! The library itself only emits `tracing` events. Enable the `subscriber`
//! feature to get [`init_tracing`], which installs a formatting subscriber;
//! without the feature it compiles to nothing.

/// Installs a global fmt subscriber filtered by `RUST_LOG`.
///
/// Defaults to `tempus=info` when `RUST_LOG` is unset. Calling it more than
/// once is harmless, which is what the `#[tempus::test]` macro relies on.
#[cfg(feature = "subscriber")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tempus=info"));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "subscriber"))]
pub const fn init_tracing() {}
