//! Tracing setup for the supervisor.
//!
//! Log lines go to stderr with a level prefix so they never interleave with a
//! child that shares our stdout.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the filter is `info`, or `debug` for
/// this crate when `log_everything` is on.
///
/// # Example
/// ```bash
/// RUST_LOG=gitwatcher=trace gitwatcher --interval 10
/// ```
pub fn init(log_everything: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_everything)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn default_directive(log_everything: bool) -> &'static str {
    if log_everything {
        "info,gitwatcher=debug"
    } else {
        "info"
    }
}
