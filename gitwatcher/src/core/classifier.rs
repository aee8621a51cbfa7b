//! Classification of `git pull` output.

use crate::error::SupervisorError;

/// Prefixes git uses for messages that mean the pull did not happen.
const FATAL_PREFIXES: [&str; 2] = ["fatal:", "error:"];

/// What git prints when the branch is current.
const UP_TO_DATE: &str = "already up to date.";

/// Result of one remote-sync check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    NoChange,
    Changed,
    /// The pull exited unsuccessfully (or could not be run).
    PullError { message: String, output: String },
    /// The pull exited cleanly but reported a fatal message.
    PullFatal { output: String },
}

impl ChangeOutcome {
    /// The failure carried by this outcome, if any.
    pub fn failure(&self) -> Option<SupervisorError> {
        match self {
            ChangeOutcome::PullError { message, output } => Some(SupervisorError::Pull {
                message: message.clone(),
                output: output.clone(),
            }),
            ChangeOutcome::PullFatal { output } => Some(SupervisorError::PullFatal {
                output: output.clone(),
            }),
            ChangeOutcome::NoChange | ChangeOutcome::Changed => None,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, ChangeOutcome::Changed)
    }
}

/// Trim each stream, join them, and lower-case the result.
pub fn normalize_output(stdout: &str, stderr: &str) -> String {
    let mut combined = String::with_capacity(stdout.len() + stderr.len());
    combined.push_str(stdout.trim());
    combined.push_str(stderr.trim());
    combined.trim().to_lowercase()
}

/// Classify a pull from its exit status and normalized output.
///
/// Rules apply in order: failed exit, fatal prefix, up-to-date marker,
/// anything else (including empty output) counts as a change.
pub fn classify(exit_ok: bool, normalized: &str) -> ChangeOutcome {
    if !exit_ok {
        return ChangeOutcome::PullError {
            message: "git pull exited with a failure status".to_string(),
            output: normalized.to_string(),
        };
    }
    if FATAL_PREFIXES
        .iter()
        .any(|prefix| normalized.starts_with(prefix))
    {
        return ChangeOutcome::PullFatal {
            output: normalized.to_string(),
        };
    }
    if normalized == UP_TO_DATE {
        return ChangeOutcome::NoChange;
    }
    ChangeOutcome::Changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_to_date_with_padding_and_casing_is_no_change() {
        let normalized = normalize_output("  \n\tAlready up to date.\n", "");
        assert_eq!(classify(true, &normalized), ChangeOutcome::NoChange);
        let shouted = normalize_output("ALREADY UP TO DATE.", "   ");
        assert_eq!(classify(true, &shouted), ChangeOutcome::NoChange);
    }

    #[test]
    fn fatal_prefix_is_pull_fatal() {
        let normalized = normalize_output("", "fatal: unable to access 'https://x/'");
        assert_eq!(
            classify(true, &normalized),
            ChangeOutcome::PullFatal {
                output: "fatal: unable to access 'https://x/'".to_string()
            }
        );
    }

    #[test]
    fn error_prefix_is_pull_fatal() {
        let outcome = classify(true, "error: cannot pull with rebase");
        assert!(matches!(outcome, ChangeOutcome::PullFatal { .. }));
    }

    #[test]
    fn empty_output_with_failed_exit_is_pull_error() {
        let outcome = classify(false, "");
        assert!(matches!(
            outcome,
            ChangeOutcome::PullError { ref output, .. } if output.is_empty()
        ));
    }

    #[test]
    fn failed_exit_wins_over_fatal_prefix() {
        let outcome = classify(false, "fatal: not a git repository");
        assert!(matches!(outcome, ChangeOutcome::PullError { .. }));
    }

    #[test]
    fn fast_forward_output_is_changed() {
        let normalized = normalize_output("Updating a1b2c3..d4e5f6\nFast-forward\n", "");
        assert_eq!(classify(true, &normalized), ChangeOutcome::Changed);
    }

    #[test]
    fn empty_output_with_clean_exit_is_changed() {
        assert_eq!(classify(true, ""), ChangeOutcome::Changed);
    }

    #[test]
    fn stdout_and_stderr_are_joined_after_trimming() {
        assert_eq!(normalize_output(" A \n", "\tB "), "ab");
    }

    #[test]
    fn only_pull_outcomes_carry_failures() {
        assert!(ChangeOutcome::NoChange.failure().is_none());
        assert!(ChangeOutcome::Changed.failure().is_none());
        let err = classify(true, "fatal: x").failure().expect("failure");
        assert_eq!(err.kind(), crate::core::types::FailureKind::PullFatal);
    }
}
