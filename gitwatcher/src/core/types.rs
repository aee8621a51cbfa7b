//! Shared value types for the supervision core.
//!
//! These types carry no I/O. `Policy` and `ConfigTable` are built once at
//! startup and only read afterwards; `ChildHandle` is owned by the
//! supervisor's child slot.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Failure categories that the strict/permissive switch acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// No launch entry for the platform (or no readable table at all).
    ConfigMissing,
    /// The matching entry has an empty `cmd`.
    CommandMissing,
    /// The shell could not be spawned.
    Launch,
    /// `git pull` exited with a failure status.
    Pull,
    /// `git pull` succeeded but printed a `fatal:`/`error:` line.
    PullFatal,
    /// The previous child group could not be killed. Never escalated.
    Termination,
}

impl FailureKind {
    /// Kinds escalated by strict mode unless configured otherwise.
    pub const STRICT_DEFAULT: [FailureKind; 5] = [
        FailureKind::ConfigMissing,
        FailureKind::CommandMissing,
        FailureKind::Launch,
        FailureKind::Pull,
        FailureKind::PullFatal,
    ];
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::ConfigMissing => "config-missing",
            FailureKind::CommandMissing => "command-missing",
            FailureKind::Launch => "launch",
            FailureKind::Pull => "pull",
            FailureKind::PullFatal => "pull-fatal",
            FailureKind::Termination => "termination",
        };
        f.write_str(name)
    }
}

/// Supervisor-wide behavior, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    interval: Duration,
    strict_mode: bool,
    hide_child_output: bool,
    strict_failures: Vec<FailureKind>,
}

impl Policy {
    /// Build a policy. The interval must be non-zero.
    pub fn new(
        interval: Duration,
        strict_mode: bool,
        hide_child_output: bool,
    ) -> Result<Self, InvalidPolicy> {
        if interval.is_zero() {
            return Err(InvalidPolicy::ZeroInterval);
        }
        Ok(Self {
            interval,
            strict_mode,
            hide_child_output,
            strict_failures: FailureKind::STRICT_DEFAULT.to_vec(),
        })
    }

    /// Replace the set of failures strict mode escalates.
    ///
    /// `Termination` is dropped from the set: a failed kill never stops the loop.
    pub fn with_strict_failures(mut self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        let mut kinds: Vec<FailureKind> = kinds
            .into_iter()
            .filter(|kind| *kind != FailureKind::Termination)
            .collect();
        kinds.sort();
        kinds.dedup();
        self.strict_failures = kinds;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    pub fn hide_child_output(&self) -> bool {
        self.hide_child_output
    }

    pub fn strict_failures(&self) -> &[FailureKind] {
        &self.strict_failures
    }

    /// True if a failure of `kind` must end the supervisor.
    pub fn escalates(&self, kind: FailureKind) -> bool {
        self.strict_mode
            && kind != FailureKind::Termination
            && self.strict_failures.contains(&kind)
    }
}

/// Rejected policy values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPolicy {
    #[error("interval must be at least 1 second")]
    ZeroInterval,
}

/// Fully resolved launch command: no placeholder left, shell non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub shell: String,
    pub args: Vec<String>,
    pub cmd: String,
}

impl LaunchSpec {
    /// Shell plus arguments joined for log output.
    pub fn display_line(&self) -> String {
        if self.args.is_empty() {
            return self.shell.clone();
        }
        format!("{} {}", self.shell, self.args.join(" "))
    }
}

/// One entry of the per-repository launch table; `shell`/`args` may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchTemplate {
    pub shell: String,
    pub args: Vec<String>,
    pub cmd: String,
}

impl LaunchTemplate {
    pub fn with_cmd(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
    }
}

/// Platform key (or `default`) to launch template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTable {
    entries: BTreeMap<String, LaunchTemplate>,
}

impl ConfigTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, template: LaunchTemplate) {
        self.entries.insert(key.into(), template);
    }

    pub fn with_entry(mut self, key: impl Into<String>, template: LaunchTemplate) -> Self {
        self.insert(key, template);
        self
    }

    pub fn get(&self, key: &str) -> Option<&LaunchTemplate> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Identity of a running child and the process group it leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildHandle {
    pub pid: u32,
    pub group_id: u32,
}

impl ChildHandle {
    /// Handle for a child that leads its own group.
    pub fn group_leader(pid: u32) -> Self {
        Self { pid, group_id: pid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_rejected() {
        let err = Policy::new(Duration::ZERO, false, false).unwrap_err();
        assert_eq!(err, InvalidPolicy::ZeroInterval);
    }

    #[test]
    fn permissive_policy_never_escalates() {
        let policy = Policy::new(Duration::from_secs(60), false, false).expect("policy");
        for kind in FailureKind::STRICT_DEFAULT {
            assert!(!policy.escalates(kind), "{kind} escalated");
        }
    }

    #[test]
    fn strict_policy_escalates_default_set_but_not_termination() {
        let policy = Policy::new(Duration::from_secs(1), true, false).expect("policy");
        for kind in FailureKind::STRICT_DEFAULT {
            assert!(policy.escalates(kind), "{kind} not escalated");
        }
        assert!(!policy.escalates(FailureKind::Termination));
    }

    #[test]
    fn strict_failures_can_be_narrowed_and_drop_termination() {
        let policy = Policy::new(Duration::from_secs(1), true, false)
            .expect("policy")
            .with_strict_failures([
                FailureKind::Launch,
                FailureKind::Termination,
                FailureKind::Launch,
            ]);
        assert_eq!(policy.strict_failures(), &[FailureKind::Launch]);
        assert!(policy.escalates(FailureKind::Launch));
        assert!(!policy.escalates(FailureKind::Pull));
        assert!(!policy.escalates(FailureKind::Termination));
    }

    #[test]
    fn config_table_deserializes_platform_sections() {
        let table: ConfigTable = toml::from_str(
            r#"
[default]
cmd = "echo hello world"
shell = "sh"
args = ["-c", "$cmd"]

[linux]
cmd = "make run"
"#,
        )
        .expect("parse");
        let keys: Vec<&str> = table.keys().collect();
        assert_eq!(keys, vec!["default", "linux"]);
        let linux = table.get("linux").expect("linux entry");
        assert_eq!(linux.cmd, "make run");
        assert!(linux.shell.is_empty());
        assert!(linux.args.is_empty());
    }

    #[test]
    fn display_line_joins_shell_and_args() {
        let spec = LaunchSpec {
            shell: "bash".to_string(),
            args: vec!["-c".to_string(), "echo hi".to_string()],
            cmd: "echo hi".to_string(),
        };
        assert_eq!(spec.display_line(), "bash -c echo hi");
    }
}
