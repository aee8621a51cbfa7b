//! The poll → decide → restart cycle.
//!
//! One thread drives [`Supervisor::run`]. The only other party touching the
//! current child is the termination-signal thread, which goes through a
//! [`ShutdownHandle`]; both sides lock the same [`ChildSlot`]. A restart holds
//! the lock from teardown until the new handle is stored, so the signal path
//! sees either the old child or the new one, never a half-finished swap.
//! Shutdown seals the slot: a restart that was waiting for the lock finds it
//! closed and launches nothing.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use chrono::Local;
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::ChangeOutcome;
use crate::core::resolver::resolve;
use crate::core::types::{ChildHandle, FailureKind, LaunchSpec, Policy};
use crate::error::SupervisorError;
use crate::io::config::ConfigSource;
use crate::io::git::ChangeDetector;
use crate::io::process::ProcessGroupController;

/// Shared cell holding the live child, if any.
pub type ChildSlot = Arc<Mutex<Slot>>;

/// Contents of a [`ChildSlot`].
#[derive(Debug, Default)]
pub struct Slot {
    child: Option<ChildHandle>,
    closed: bool,
}

/// Where the cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Polling,
    Deciding,
    Restarting,
    Sleeping,
    ShuttingDown,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Classification returned by the change detector.
    pub outcome: ChangeOutcome,
    /// True if the restart branch ran (teardown, resolve, launch).
    pub restarted: bool,
    /// Child started by this cycle.
    pub launched: Option<ChildHandle>,
    /// Failures that were logged and tolerated.
    pub failures: Vec<FailureKind>,
}

/// Keeps one child process in step with upstream changes.
pub struct Supervisor<D, S, C> {
    detector: D,
    config: S,
    controller: Arc<C>,
    policy: Policy,
    platform: String,
    fallback: LaunchSpec,
    child: ChildSlot,
    first_cycle: bool,
    state: SupervisorState,
}

impl<D, S, C> Supervisor<D, S, C>
where
    D: ChangeDetector,
    S: ConfigSource,
    C: ProcessGroupController,
{
    pub fn new(
        detector: D,
        config: S,
        controller: Arc<C>,
        policy: Policy,
        platform: impl Into<String>,
        fallback: LaunchSpec,
    ) -> Self {
        Self {
            detector,
            config,
            controller,
            policy,
            platform: platform.into(),
            fallback,
            child: Arc::new(Mutex::new(Slot::default())),
            first_cycle: true,
            state: SupervisorState::Idle,
        }
    }

    /// Current state. A shutdown from the signal path shows up here as
    /// [`SupervisorState::ShuttingDown`] even while a cycle is running.
    pub fn state(&self) -> SupervisorState {
        if lock_slot(&self.child).closed {
            return SupervisorState::ShuttingDown;
        }
        self.state
    }

    /// The live child, if one was started and not torn down.
    pub fn current_child(&self) -> Option<ChildHandle> {
        lock_slot(&self.child).child
    }

    /// Handle for the termination-signal path.
    pub fn shutdown_handle(&self) -> ShutdownHandle<C> {
        ShutdownHandle {
            child: Arc::clone(&self.child),
            controller: Arc::clone(&self.controller),
        }
    }

    /// Poll, decide, and restart if needed, then sleep; repeat.
    ///
    /// Returns only when a failure is escalated by strict mode.
    pub fn run(&mut self) -> Result<Infallible, SupervisorError> {
        loop {
            self.run_cycle()?;
            debug!(interval_secs = self.policy.interval().as_secs(), "sleeping");
            thread::sleep(self.policy.interval());
        }
    }

    /// Run one cycle without sleeping.
    ///
    /// The first cycle always restarts. Later cycles restart only on
    /// [`ChangeOutcome::Changed`]. Tolerated failures are logged and listed in
    /// the report; escalated ones are returned as `Err`.
    #[instrument(skip_all, fields(first_cycle = self.first_cycle))]
    pub fn run_cycle(&mut self) -> Result<CycleReport, SupervisorError> {
        let mut failures = Vec::new();

        self.enter(SupervisorState::Polling);
        let outcome = self.detector.check();
        match outcome.failure() {
            Some(err) => self.tolerate(err, &mut failures)?,
            None => debug!(?outcome, "pull classified"),
        }

        self.enter(SupervisorState::Deciding);
        let restart = self.first_cycle || outcome.is_changed();
        self.first_cycle = false;

        let launched = if restart {
            self.enter(SupervisorState::Restarting);
            self.restart(&mut failures)?
        } else {
            None
        };

        if lock_slot(&self.child).closed {
            self.enter(SupervisorState::ShuttingDown);
        } else {
            self.enter(SupervisorState::Sleeping);
        }
        Ok(CycleReport {
            outcome,
            restarted: restart,
            launched,
            failures,
        })
    }

    /// Kill the current child group, if any, and mark the supervisor as
    /// shutting down.
    pub fn shutdown(&mut self) -> Option<ChildHandle> {
        self.enter(SupervisorState::ShuttingDown);
        self.shutdown_handle().shutdown()
    }

    fn restart(
        &self,
        failures: &mut Vec<FailureKind>,
    ) -> Result<Option<ChildHandle>, SupervisorError> {
        let mut slot = lock_slot(&self.child);
        if slot.closed {
            debug!("shutting down, skipping restart");
            return Ok(None);
        }
        info!("{} - restarting...", Local::now().format("%H:%M"));

        // Teardown is irreversible: the old handle is gone even if the kill
        // fails or nothing replaces it.
        if let Some(old) = slot.child.take() {
            debug!(pid = old.pid, "killing previous process");
            if let Err(err) = self.controller.terminate(&old) {
                warn!("{err}");
                failures.push(err.kind());
            }
        }

        let spec = match self
            .config
            .load()
            .and_then(|table| resolve(&table, &self.platform, &self.fallback))
        {
            Ok(spec) => spec,
            Err(err) => {
                self.tolerate(err, failures)?;
                return Ok(None);
            }
        };

        match self
            .controller
            .launch(&spec, !self.policy.hide_child_output())
        {
            Ok(handle) => {
                slot.child = Some(handle);
                Ok(Some(handle))
            }
            Err(err) => {
                self.tolerate(err, failures)?;
                Ok(None)
            }
        }
    }

    /// Warn and continue, or hand the error back if strict mode escalates it.
    fn tolerate(
        &self,
        err: SupervisorError,
        failures: &mut Vec<FailureKind>,
    ) -> Result<(), SupervisorError> {
        let kind = err.kind();
        if self.policy.escalates(kind) {
            return Err(err);
        }
        warn!(%kind, "{err}");
        failures.push(kind);
        Ok(())
    }

    fn enter(&mut self, state: SupervisorState) {
        debug!(from = ?self.state, to = ?state, "state transition");
        self.state = state;
    }
}

/// Kills the current child from outside the cycle thread.
pub struct ShutdownHandle<C> {
    child: ChildSlot,
    controller: Arc<C>,
}

impl<C> Clone for ShutdownHandle<C> {
    fn clone(&self) -> Self {
        Self {
            child: Arc::clone(&self.child),
            controller: Arc::clone(&self.controller),
        }
    }
}

impl<C: ProcessGroupController> ShutdownHandle<C> {
    /// Close the slot and terminate the current child group, if any. Returns
    /// the handle that was torn down.
    ///
    /// After this no cycle launches a child again. The cycle thread's own
    /// state only changes once its current cycle finishes; [`Supervisor::state`]
    /// reports `ShuttingDown` right away.
    pub fn shutdown(&self) -> Option<ChildHandle> {
        let mut slot = lock_slot(&self.child);
        if !slot.closed {
            debug!(to = ?SupervisorState::ShuttingDown, "state transition");
            slot.closed = true;
        }
        let handle = slot.child.take()?;
        debug!(pid = handle.pid, "killing process");
        if let Err(err) = self.controller.terminate(&handle) {
            warn!("{err}");
        }
        Some(handle)
    }
}

fn lock_slot(slot: &ChildSlot) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
