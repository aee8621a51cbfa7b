//! Termination-signal handling.
//!
//! `ctrlc` runs the handler on its own thread for SIGINT/SIGTERM (Ctrl-C and
//! Ctrl-Break on Windows). The handler never returns: it runs the cleanup and
//! exits the process.

use anyhow::{Context, Result};
use tracing::info;

use crate::exit_codes;

/// Run `cleanup` and exit with [`exit_codes::INTERRUPTED`] on the first
/// termination signal.
pub fn exit_on_termination<F>(cleanup: F) -> Result<()>
where
    F: Fn() + Send + 'static,
{
    ctrlc::set_handler(move || {
        info!("cleaning up...");
        cleanup();
        std::process::exit(exit_codes::INTERRUPTED);
    })
    .context("install termination signal handler")
}
