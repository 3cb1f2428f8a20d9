use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::lock;
use crate::error::ControllerError;

/// Lifecycle state of a controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Not running. Initial state, and the state after every run ends.
    Inactive,
    /// The worker thread is running.
    Active,
    /// Returned by `join` when the deadline passed while still active.
    /// Never stored on the controller.
    JoinTimeout,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControllerState::Inactive => "inactive",
            ControllerState::Active => "active",
            ControllerState::JoinTimeout => "join timeout",
        })
    }
}

/// Flags shared by the controller handle and its worker.
///
/// Each field has its own guard and no method holds more than one of them.
pub(crate) struct StateMachine {
    state: Mutex<ControllerState>,
    changed: Condvar,
    exit_requested: AtomicBool,
    starting: AtomicBool,
    // First error of the controller's lifetime; never cleared.
    error: Mutex<Option<ControllerError>>,
    // First error of the current or most recent run; cleared by `start`.
    run_error: Mutex<Option<ControllerError>>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ControllerState::Inactive),
            changed: Condvar::new(),
            exit_requested: AtomicBool::new(false),
            starting: AtomicBool::new(false),
            error: Mutex::new(None),
            run_error: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ControllerState {
        *lock(&self.state)
    }

    pub fn set_state(&self, state: ControllerState) {
        debug_assert_ne!(state, ControllerState::JoinTimeout);
        *lock(&self.state) = state;
        self.changed.notify_all();
    }

    /// Claim the right to start a run. Fails if another `start` is in
    /// progress or the controller is already active.
    ///
    /// Clears the exit flag on success, so a `stop` that arrives while the
    /// run is still being set up is kept.
    pub fn try_begin_start(&self) -> bool {
        if self
            .starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if self.state() == ControllerState::Active {
            self.starting.store(false, Ordering::SeqCst);
            return false;
        }
        self.exit_requested.store(false, Ordering::SeqCst);
        true
    }

    pub fn end_start(&self) {
        self.starting.store(false, Ordering::SeqCst);
    }

    /// Clear the per-run error and mark the controller active.
    pub fn activate(&self) {
        *lock(&self.run_error) = None;
        self.set_state(ControllerState::Active);
    }

    pub fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::SeqCst);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::SeqCst)
    }

    pub fn exit_flag(&self) -> &AtomicBool {
        &self.exit_requested
    }

    /// Record `err` unless an error is already held. Applied separately to
    /// the lifetime slot and the per-run slot. Returns `true` if the lifetime
    /// slot took it.
    pub fn record_error(&self, err: ControllerError) -> bool {
        {
            let mut run = lock(&self.run_error);
            if run.is_none() {
                *run = Some(err.clone());
            }
        }
        let mut slot = lock(&self.error);
        if slot.is_none() {
            *slot = Some(err);
            true
        } else {
            false
        }
    }

    pub fn error(&self) -> Option<ControllerError> {
        lock(&self.error).clone()
    }

    pub fn run_error(&self) -> Option<ControllerError> {
        lock(&self.run_error).clone()
    }

    /// Wait until the state leaves `Active` or `timeout` passes.
    pub fn wait_inactive(&self, timeout: Duration) -> ControllerState {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = lock(&self.state);
        loop {
            if *state != ControllerState::Active {
                return *state;
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return ControllerState::JoinTimeout;
                    }
                    self.changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::instruction::InstructionId;
    use crate::interface::transport::TransportError;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_error_wins() {
        let sm = StateMachine::new();
        let first = ControllerError::Execute {
            id: InstructionId(1),
            source: TransportError::Transfer,
        };
        assert!(sm.record_error(first.clone()));
        assert!(!sm.record_error(ControllerError::Disable(TransportError::NotConnected)));
        assert_eq!(sm.error(), Some(first.clone()));
        assert_eq!(sm.run_error(), Some(first));
    }

    #[test]
    fn test_start_clears_run_error_only() {
        let sm = StateMachine::new();
        let err = ControllerError::Disable(TransportError::Transfer);
        sm.record_error(err.clone());
        sm.request_exit();

        assert!(sm.try_begin_start());
        sm.activate();
        sm.end_start();
        assert_eq!(sm.state(), ControllerState::Active);
        assert!(!sm.exit_requested());
        assert_eq!(sm.run_error(), None);
        assert_eq!(sm.error(), Some(err));
    }

    #[test]
    fn test_stop_during_start_is_kept() {
        let sm = StateMachine::new();
        assert!(sm.try_begin_start());
        // Lands while control mode is being enabled.
        sm.request_exit();
        sm.activate();
        sm.end_start();

        assert!(sm.exit_requested());
        assert_eq!(sm.state(), ControllerState::Active);
    }

    #[test]
    fn test_begin_start_rejects_active_and_concurrent() {
        let sm = StateMachine::new();
        assert!(sm.try_begin_start());
        assert!(!sm.try_begin_start());
        sm.activate();
        sm.end_start();
        assert!(!sm.try_begin_start());

        sm.set_state(ControllerState::Inactive);
        assert!(sm.try_begin_start());
    }

    #[test]
    fn test_wait_inactive_times_out_while_active() {
        let sm = StateMachine::new();
        sm.activate();
        let started = Instant::now();
        assert_eq!(
            sm.wait_inactive(Duration::from_millis(30)),
            ControllerState::JoinTimeout
        );
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(sm.state(), ControllerState::Active);
    }

    #[test]
    fn test_wait_inactive_wakes_on_transition() {
        let sm = Arc::new(StateMachine::new());
        sm.activate();

        let waiter = {
            let sm = Arc::clone(&sm);
            thread::spawn(move || sm.wait_inactive(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        sm.set_state(ControllerState::Inactive);
        assert_eq!(waiter.join().unwrap(), ControllerState::Inactive);
    }

    #[test]
    fn test_zero_timeout_is_a_poll() {
        let sm = StateMachine::new();
        assert_eq!(sm.wait_inactive(Duration::ZERO), ControllerState::Inactive);
        sm.activate();
        assert_eq!(sm.wait_inactive(Duration::ZERO), ControllerState::JoinTimeout);
    }
}
