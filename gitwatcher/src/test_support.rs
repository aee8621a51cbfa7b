//! Test-only fakes and fixtures.
//!
//! The fakes stand in for the git pull and the OS process layer so the
//! supervisor can be driven cycle by cycle without spawning anything.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::classifier::ChangeOutcome;
use crate::core::resolver::{CMD_PLACEHOLDER, DEFAULT_KEY};
use crate::core::types::{ChildHandle, ConfigTable, LaunchSpec, LaunchTemplate, Policy};
use crate::error::SupervisorError;
use crate::io::config::ConfigSource;
use crate::io::git::ChangeDetector;
use crate::io::process::ProcessGroupController;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Detector that replays queued outcomes, then reports `NoChange`.
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    outcomes: Mutex<VecDeque<ChangeOutcome>>,
}

impl ScriptedDetector {
    pub fn new(outcomes: Vec<ChangeOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
        }
    }
}

impl ChangeDetector for ScriptedDetector {
    fn check(&self) -> ChangeOutcome {
        lock(&self.outcomes)
            .pop_front()
            .unwrap_or(ChangeOutcome::NoChange)
    }
}

/// Config source that hands out queued tables, one per load.
///
/// Once the queue is empty every load is `ConfigMissing`.
#[derive(Debug, Default)]
pub struct ScriptedConfig {
    tables: Mutex<VecDeque<ConfigTable>>,
}

impl ScriptedConfig {
    pub fn new(tables: Vec<ConfigTable>) -> Self {
        Self {
            tables: Mutex::new(tables.into()),
        }
    }
}

impl ConfigSource for ScriptedConfig {
    fn load(&self) -> Result<ConfigTable, SupervisorError> {
        lock(&self.tables)
            .pop_front()
            .ok_or_else(|| SupervisorError::ConfigMissing("scripted config exhausted".to_string()))
    }
}

/// One call observed by [`RecordingController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCall {
    /// A launch attempt, successful or not.
    Launch(LaunchSpec),
    Terminate(ChildHandle),
}

/// Controller that records calls in order and hands out fake pids.
#[derive(Debug)]
pub struct RecordingController {
    calls: Mutex<Vec<ControllerCall>>,
    visible: Mutex<Vec<bool>>,
    next_pid: AtomicU32,
    fail_next_launch: AtomicBool,
    fail_terminations: AtomicBool,
    terminate_delay: Mutex<Duration>,
}

impl Default for RecordingController {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            visible: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(1000),
            fail_next_launch: AtomicBool::new(false),
            fail_terminations: AtomicBool::new(false),
            terminate_delay: Mutex::new(Duration::ZERO),
        }
    }
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ControllerCall> {
        lock(&self.calls).clone()
    }

    /// Specs of all launch attempts, in order.
    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ControllerCall::Launch(spec) => Some(spec),
                ControllerCall::Terminate(_) => None,
            })
            .collect()
    }

    /// Handles passed to `terminate`, in order.
    pub fn terminations(&self) -> Vec<ChildHandle> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ControllerCall::Terminate(handle) => Some(handle),
                ControllerCall::Launch(_) => None,
            })
            .collect()
    }

    /// `visible_output` flag of each launch attempt.
    pub fn visible_output(&self) -> Vec<bool> {
        lock(&self.visible).clone()
    }

    /// Make the next launch attempt fail with a spawn error.
    pub fn fail_next_launch(&self) {
        self.fail_next_launch.store(true, Ordering::SeqCst);
    }

    /// Make every terminate call fail (or succeed again).
    pub fn fail_terminations(&self, fail: bool) {
        self.fail_terminations.store(fail, Ordering::SeqCst);
    }

    /// Make every terminate call block for `delay` after it is recorded.
    pub fn slow_terminations(&self, delay: Duration) {
        *lock(&self.terminate_delay) = delay;
    }
}

impl ProcessGroupController for RecordingController {
    fn launch(
        &self,
        spec: &LaunchSpec,
        visible_output: bool,
    ) -> Result<ChildHandle, SupervisorError> {
        lock(&self.calls).push(ControllerCall::Launch(spec.clone()));
        lock(&self.visible).push(visible_output);
        if self.fail_next_launch.swap(false, Ordering::SeqCst) {
            return Err(SupervisorError::Launch {
                shell: spec.shell.clone(),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(ChildHandle::group_leader(pid))
    }

    fn terminate(&self, handle: &ChildHandle) -> Result<(), SupervisorError> {
        lock(&self.calls).push(ControllerCall::Terminate(*handle));
        let delay = *lock(&self.terminate_delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if self.fail_terminations.load(Ordering::SeqCst) {
            return Err(SupervisorError::Termination {
                pid: handle.pid,
                detail: "no such process".to_string(),
            });
        }
        Ok(())
    }
}

/// Table with only a `default` entry running `cmd`.
pub fn default_table(cmd: &str) -> ConfigTable {
    ConfigTable::new().with_entry(DEFAULT_KEY, LaunchTemplate::with_cmd(cmd))
}

/// Unix-style fallback: `sh -c $cmd`.
pub fn sh_fallback() -> LaunchSpec {
    LaunchSpec {
        shell: "sh".to_string(),
        args: vec!["-c".to_string(), CMD_PLACEHOLDER.to_string()],
        cmd: String::new(),
    }
}

/// One-second policy, strict or permissive.
pub fn policy(strict: bool) -> Policy {
    match Policy::new(Duration::from_secs(1), strict, false) {
        Ok(policy) => policy,
        Err(err) => panic!("one-second policy rejected: {err}"),
    }
}

/// True while any process in the group is alive or unreaped.
#[cfg(unix)]
pub fn group_exists(group_id: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(group_id) else {
        return false;
    };
    !matches!(killpg(Pid::from_raw(pgid), None), Err(Errno::ESRCH))
}

/// An upstream repository and a working clone of it in a temp dir.
pub struct TempRepo {
    _temp: TempDir,
    upstream: PathBuf,
    work: PathBuf,
}

impl TempRepo {
    /// Create `upstream` with one commit and clone it to `work`.
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        let upstream = temp.path().join("upstream");
        let work = temp.path().join("work");
        fs::create_dir_all(&upstream).context("create upstream dir")?;
        run_git(&upstream, &["init", "-q"])?;
        commit_file(&upstream, "README.md", "upstream\n")?;
        run_git(temp.path(), &["clone", "-q", "upstream", "work"])?;
        run_git(&work, &["config", "pull.rebase", "false"])?;
        Ok(Self {
            _temp: temp,
            upstream,
            work,
        })
    }

    /// The watched working tree.
    pub fn path(&self) -> &Path {
        &self.work
    }

    /// Commit a file upstream so the next pull in `work` sees a change.
    pub fn push_upstream(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.upstream.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        commit_file(&self.upstream, name, contents)
    }
}

fn commit_file(repo: &Path, name: &str, contents: &str) -> Result<()> {
    fs::write(repo.join(name), contents).with_context(|| format!("write {name}"))?;
    run_git(repo, &["add", "-A"])?;
    run_git(repo, &["commit", "-q", "-m", name])
}

fn run_git(dir: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(["-c", "user.name=gitwatcher", "-c", "user.email=gw@example.invalid"])
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !status.success() {
        return Err(anyhow!("git {} failed: {status}", args.join(" ")));
    }
    Ok(())
}
