//! Launching the managed child in its own process group and killing that
//! group again.
//!
//! Unix starts the shell as a group leader (`pgid == pid`) and kills with
//! `killpg(SIGKILL)`. Windows starts it with `CREATE_NEW_PROCESS_GROUP` and
//! kills the tree with `taskkill /T /F`.

use std::collections::HashMap;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::{ChildHandle, LaunchSpec};
use crate::error::SupervisorError;

/// Upper bound for reaping the direct child after its group was killed.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Platform primitive for starting and killing a whole process group.
pub trait ProcessGroupController: Send + Sync {
    /// Start `spec.shell` with `spec.args` detached into a new group.
    ///
    /// With `visible_output` the child shares our stdout/stderr; otherwise
    /// both are discarded.
    fn launch(
        &self,
        spec: &LaunchSpec,
        visible_output: bool,
    ) -> Result<ChildHandle, SupervisorError>;

    /// Forcefully kill every process in the handle's group.
    ///
    /// Callers treat an error as a warning; the group may already be gone.
    fn terminate(&self, handle: &ChildHandle) -> Result<(), SupervisorError>;
}

/// Controller that spawns real OS processes.
#[derive(Debug, Default)]
pub struct OsProcessGroupController {
    children: Mutex<HashMap<u32, Child>>,
}

impl OsProcessGroupController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of spawned children not yet reaped.
    pub fn tracked(&self) -> usize {
        self.children().len()
    }

    fn children(&self) -> MutexGuard<'_, HashMap<u32, Child>> {
        self.children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reap(&self, pid: u32) {
        let Some(mut child) = self.children().remove(&pid) else {
            return;
        };
        match child.wait_timeout(REAP_TIMEOUT) {
            Ok(Some(status)) => debug!(pid, ?status, "reaped child"),
            Ok(None) => warn!(pid, "child still running after kill"),
            Err(err) => warn!(pid, err = %err, "failed to reap child"),
        }
    }
}

impl ProcessGroupController for OsProcessGroupController {
    #[instrument(skip_all, fields(shell = %spec.shell))]
    fn launch(
        &self,
        spec: &LaunchSpec,
        visible_output: bool,
    ) -> Result<ChildHandle, SupervisorError> {
        let mut cmd = Command::new(&spec.shell);
        cmd.args(&spec.args).stdin(Stdio::null());
        if visible_output {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        detach_into_group(&mut cmd);

        info!(command = %spec.display_line(), "executing");
        let child = cmd.spawn().map_err(|source| SupervisorError::Launch {
            shell: spec.shell.clone(),
            source,
        })?;
        let handle = ChildHandle::group_leader(child.id());
        debug!(pid = handle.pid, group_id = handle.group_id, "child started");
        self.children().insert(handle.pid, child);
        Ok(handle)
    }

    #[instrument(skip_all, fields(pid = handle.pid, group_id = handle.group_id))]
    fn terminate(&self, handle: &ChildHandle) -> Result<(), SupervisorError> {
        debug!("killing process group");
        let result = kill_group(handle);
        self.reap(handle.pid);
        if result.is_ok() {
            debug!("process group killed");
        }
        result
    }
}

#[cfg(unix)]
fn detach_into_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    cmd.process_group(0);
}

#[cfg(windows)]
fn detach_into_group(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach_into_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_group(handle: &ChildHandle) -> Result<(), SupervisorError> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(handle.group_id).map_err(|_| SupervisorError::Termination {
        pid: handle.pid,
        detail: format!("group id {} out of range", handle.group_id),
    })?;
    killpg(Pid::from_raw(pgid), Signal::SIGKILL).map_err(|errno| SupervisorError::Termination {
        pid: handle.pid,
        detail: errno.desc().to_string(),
    })
}

#[cfg(windows)]
fn kill_group(handle: &ChildHandle) -> Result<(), SupervisorError> {
    let output = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &handle.pid.to_string()])
        .stdin(Stdio::null())
        .output()
        .map_err(|err| SupervisorError::Termination {
            pid: handle.pid,
            detail: format!("failed to run taskkill: {err}"),
        })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(SupervisorError::Termination {
        pid: handle.pid,
        detail: stderr.trim().to_string(),
    })
}

#[cfg(not(any(unix, windows)))]
fn kill_group(handle: &ChildHandle) -> Result<(), SupervisorError> {
    Err(SupervisorError::Termination {
        pid: handle.pid,
        detail: "process groups are not supported on this platform".to_string(),
    })
}
