//! Failures raised by the supervision cycle.

use std::io;

use crate::core::types::FailureKind;

/// Everything the supervisor can report during a cycle.
///
/// Whether a value ends the process is decided by [`Policy::escalates`]
/// on its [`FailureKind`].
///
/// [`Policy::escalates`]: crate::core::types::Policy::escalates
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("config: {0}")]
    ConfigMissing(String),

    #[error("config: cmd not specified for '{platform}'")]
    CommandMissing { platform: String },

    #[error("failed to start '{shell}': {source}")]
    Launch {
        shell: String,
        #[source]
        source: io::Error,
    },

    #[error("{message}, '{output}'")]
    Pull { message: String, output: String },

    #[error("'{output}'")]
    PullFatal { output: String },

    #[error("failed to kill process {pid}: {detail}")]
    Termination { pid: u32, detail: String },
}

impl SupervisorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SupervisorError::ConfigMissing(_) => FailureKind::ConfigMissing,
            SupervisorError::CommandMissing { .. } => FailureKind::CommandMissing,
            SupervisorError::Launch { .. } => FailureKind::Launch,
            SupervisorError::Pull { .. } => FailureKind::Pull,
            SupervisorError::PullFatal { .. } => FailureKind::PullFatal,
            SupervisorError::Termination { .. } => FailureKind::Termination,
        }
    }
}
