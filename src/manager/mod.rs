mod queue;
mod runner;
pub mod state;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

use self::queue::InstructionQueue;
use self::state::{ControllerState, StateMachine};
use crate::api::dto::ControllerConfig;
use crate::error::ControllerError;
use crate::interface::instruction::{Instruction, InstructionId};
use crate::interface::transport::{DeviceHandle, DeviceId, Model, Transport};

type DeviceRef = Arc<Mutex<Box<dyn DeviceHandle>>>;

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Everything guarded in this module is left consistent between statements,
/// so a poisoned lock carries no torn state.
pub(crate) fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between a [`Controller`] and its worker thread.
pub(crate) struct Shared {
    pub device_id: DeviceId,
    pub device: DeviceRef,
    pub queue: InstructionQueue,
    pub state: StateMachine,
    pub idle_interval: Option<Duration>,
}

impl Shared {
    pub fn new(
        device_id: DeviceId,
        device: Box<dyn DeviceHandle>,
        idle_interval: Option<Duration>,
    ) -> Self {
        Self {
            device_id,
            device: Arc::new(Mutex::new(device)),
            queue: InstructionQueue::new(),
            state: StateMachine::new(),
            idle_interval,
        }
    }
}

/// Runs queued lighting instructions against one keyboard on a background
/// thread.
///
/// All methods except [`destroy`](Self::destroy) take `&self` and may be
/// called from any number of threads at once.
pub struct Controller {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: bool,
}

/// Returned by [`Controller::destroy`] when the controller could not be torn
/// down. Carries the controller back so the caller can stop and retry.
#[derive(Debug, Error)]
#[error("failed to destroy controller")]
pub struct DestroyError {
    pub controller: Controller,
    #[source]
    pub error: ControllerError,
}

impl Controller {
    /// Open `device` through `transport` and build an inactive controller.
    pub fn create<T: Transport + ?Sized>(
        transport: &T,
        device: impl Into<DeviceId>,
        model: Model,
    ) -> Result<Self, ControllerError> {
        Self::open(transport, device.into(), model, None)
    }

    /// Like [`create`](Self::create), with the device, model and idle
    /// interval taken from `config`.
    pub fn from_config<T: Transport + ?Sized>(
        transport: &T,
        config: &ControllerConfig,
    ) -> Result<Self, ControllerError> {
        Self::open(
            transport,
            config.device.clone(),
            config.model,
            config.idle_interval(),
        )
    }

    fn open<T: Transport + ?Sized>(
        transport: &T,
        device_id: DeviceId,
        model: Model,
        idle_interval: Option<Duration>,
    ) -> Result<Self, ControllerError> {
        let device = transport.open(&device_id, model).map_err(|err| {
            log::warn!(
                device = device_id.as_str(),
                err:display = err;
                "[controller] Failed to open device"
            );
            ControllerError::Open(err)
        })?;

        log::info!(device = device_id.as_str(); "[controller] Created");

        Ok(Self {
            shared: Arc::new(Shared::new(device_id, device, idle_interval)),
            worker: Mutex::new(None),
            closed: false,
        })
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.shared.device_id
    }

    /// Enable control mode and spawn the worker.
    ///
    /// Fails with [`ControllerError::AlreadyActive`] if a run is in progress,
    /// or with the transport's error if control mode cannot be enabled; in
    /// both cases no worker is started.
    pub fn start(&self) -> Result<(), ControllerError> {
        if !self.shared.state.try_begin_start() {
            return Err(ControllerError::AlreadyActive);
        }
        let result = self.launch();
        self.shared.state.end_start();
        result
    }

    fn launch(&self) -> Result<(), ControllerError> {
        let device_id = self.shared.device_id.as_str();

        // A previous run has already marked itself inactive; collect its thread.
        self.reap_worker();

        let enabled = lock(&self.shared.device).enable_control();
        if let Err(err) = enabled {
            log::warn!(
                device = device_id,
                err:display = err;
                "[controller] Failed to enable control mode"
            );
            return Err(ControllerError::Enable(err));
        }

        // Active before the thread exists, so a run that ends immediately
        // cannot be overwritten.
        self.shared.state.activate();

        match runner::spawn(Arc::clone(&self.shared)) {
            Ok(handle) => {
                *lock(&self.worker) = Some(handle);
                log::info!(device = device_id; "[controller] Started");
                Ok(())
            }
            Err(err) => {
                log::error!(
                    device = device_id,
                    err:display = err;
                    "[controller] Failed to spawn worker"
                );
                let disabled = lock(&self.shared.device).disable_control();
                if let Err(err) = disabled {
                    log::warn!(
                        device = device_id,
                        err:display = err;
                        "[controller] Failed to disable control mode"
                    );
                }
                self.shared.state.set_state(ControllerState::Inactive);
                Err(ControllerError::Spawn(err.to_string()))
            }
        }
    }

    /// Ask the worker to exit after its current instruction. Does not wait.
    pub fn stop(&self) {
        self.shared.state.request_exit();
        self.shared.queue.wake();
        log::debug!(device = self.shared.device_id.as_str(); "[controller] Stop requested");
    }

    /// Whether [`stop`](Self::stop) has been called since the last `start`.
    pub fn stop_requested(&self) -> bool {
        self.shared.state.exit_requested()
    }

    /// Wait up to `timeout` for the controller to leave `Active`.
    ///
    /// Returns the state reached, or [`ControllerState::JoinTimeout`] if the
    /// controller was still active at the deadline. A zero timeout polls.
    pub fn join(&self, timeout: Duration) -> ControllerState {
        let state = self.shared.state.wait_inactive(timeout);
        if state == ControllerState::Inactive {
            self.reap_finished_worker();
        }
        state
    }

    /// Release the device. Refused while the controller is active.
    pub fn destroy(mut self) -> Result<(), DestroyError> {
        if self.get_state() == ControllerState::Active {
            return Err(DestroyError {
                controller: self,
                error: ControllerError::StillActive,
            });
        }

        self.reap_worker();
        self.closed = true;

        let closed = lock(&self.shared.device).close();
        match closed {
            Ok(()) => {
                log::info!(device = self.shared.device_id.as_str(); "[controller] Destroyed");
                Ok(())
            }
            Err(err) => {
                log::warn!(
                    device = self.shared.device_id.as_str(),
                    err:display = err;
                    "[controller] Failed to close device"
                );
                Err(DestroyError {
                    controller: self,
                    error: ControllerError::Close(err),
                })
            }
        }
    }

    /// Append `instruction` to the queue and return its sequence id.
    pub fn enqueue(&self, instruction: Instruction) -> InstructionId {
        let kind = instruction.kind_name();
        let id = self.shared.queue.enqueue(instruction);
        log::debug!(
            device = self.shared.device_id.as_str(),
            id = id.0,
            kind = kind;
            "[controller] Enqueued instruction"
        );
        id
    }

    /// Remove a pending instruction. Returns whether it was found; an unknown
    /// or already executed id is not an error.
    pub fn cancel(&self, id: InstructionId) -> bool {
        let found = self.shared.queue.cancel(id);
        log::debug!(
            device = self.shared.device_id.as_str(),
            id = id.0,
            found = found;
            "[controller] Cancel instruction"
        );
        found
    }

    /// Ids still waiting to run, in execution order.
    pub fn pending(&self) -> Vec<InstructionId> {
        self.shared.queue.pending()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn get_state(&self) -> ControllerState {
        self.shared.state.state()
    }

    /// The first error recorded by any run of this controller. Never cleared.
    pub fn get_error(&self) -> Option<ControllerError> {
        self.shared.state.error()
    }

    /// The first error of the current or most recent run.
    pub fn last_run_error(&self) -> Option<ControllerError> {
        self.shared.state.run_error()
    }

    // Never blocks: a handle still running may already belong to a newer run.
    fn reap_finished_worker(&self) {
        let handle = {
            let mut worker = lock(&self.worker);
            match worker.as_ref() {
                Some(handle) if handle.is_finished() => worker.take(),
                _ => None,
            }
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!(
                    device = self.shared.device_id.as_str();
                    "[controller] Worker thread panicked"
                );
            }
        }
    }

    fn reap_worker(&self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!(
                    device = self.shared.device_id.as_str();
                    "[controller] Worker thread panicked"
                );
            }
        }
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("device", &self.shared.device_id)
            .field("state", &self.get_state())
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shared.state.request_exit();
        self.shared.queue.wake();
        self.reap_worker();

        if self.closed {
            return;
        }
        let closed = lock(&self.shared.device).close();
        if let Err(err) = closed {
            log::warn!(
                device = self.shared.device_id.as_str(),
                err:display = err;
                "[controller] Failed to close device on drop"
            );
        }
    }
}
