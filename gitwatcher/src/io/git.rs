//! Git adapter for the supervisor.
//!
//! Only two commands are needed: `git --version` at startup and `git pull`
//! once per cycle. Both run synchronously with no timeout of their own.

use std::path::PathBuf;
use std::process::{Command, ExitStatus, Output, Stdio};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::classifier::{ChangeOutcome, classify, normalize_output};

/// Captured result of one `git pull`.
#[derive(Debug)]
pub struct PullOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Return `git --version` output, trimmed.
    pub fn version(&self) -> Result<String> {
        let output = self.run(&["--version"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git --version failed: {}", stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run `git pull` and capture both streams.
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    pub fn pull(&self) -> Result<PullOutput> {
        let output = self.run(&["pull"])?;
        debug!(exit_code = ?output.status.code(), "git pull finished");
        Ok(PullOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Source of the per-cycle change classification.
pub trait ChangeDetector {
    /// Run one remote-sync check. May block for the length of a network call.
    fn check(&self) -> ChangeOutcome;
}

/// Change detector backed by `git pull`.
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
    git: Git,
}

impl GitChangeDetector {
    pub fn new(git: Git) -> Self {
        Self { git }
    }
}

impl ChangeDetector for GitChangeDetector {
    fn check(&self) -> ChangeOutcome {
        debug!("executing 'git pull'");
        match self.git.pull() {
            Ok(output) => classify_pull(&output),
            Err(err) => ChangeOutcome::PullError {
                message: format!("{err:#}"),
                output: String::new(),
            },
        }
    }
}

/// Classify a captured pull, naming the exit status on failure.
pub fn classify_pull(output: &PullOutput) -> ChangeOutcome {
    let normalized = normalize_output(&output.stdout, &output.stderr);
    debug!(output = %normalized, "git pull output");
    match classify(output.status.success(), &normalized) {
        ChangeOutcome::PullError { output: text, .. } => ChangeOutcome::PullError {
            message: format!("git pull failed ({})", output.status),
            output: text,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TempRepo;

    #[test]
    fn version_reports_git() {
        let temp = tempfile::tempdir().expect("tempdir");
        let version = Git::new(temp.path()).version().expect("git --version");
        assert!(version.starts_with("git version"), "{version}");
    }

    #[test]
    fn pull_outside_a_repository_is_pull_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let detector = GitChangeDetector::new(Git::new(temp.path()));
        let outcome = detector.check();
        assert!(
            matches!(outcome, ChangeOutcome::PullError { ref message, ref output }
                if message.starts_with("git pull failed") && output.starts_with("fatal:")),
            "{outcome:?}"
        );
    }

    #[test]
    fn pull_reports_no_change_then_change() {
        let repo = TempRepo::new().expect("repo");
        let detector = GitChangeDetector::new(Git::new(repo.path()));
        assert_eq!(detector.check(), ChangeOutcome::NoChange);

        repo.push_upstream("b.txt", "two").expect("upstream commit");
        assert_eq!(detector.check(), ChangeOutcome::Changed);
        assert_eq!(detector.check(), ChangeOutcome::NoChange);
    }
}
