use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::queue::Next;
use super::state::{ControllerState, StateMachine};
use super::{lock, Shared};
use crate::error::ControllerError;
use crate::interface::instruction::Instruction;
use crate::interface::transport::{DeviceHandle, TransportError};

/// Marks the controller inactive when the worker returns or unwinds.
struct InactiveOnExit<'a>(&'a StateMachine);

impl Drop for InactiveOnExit<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            log::error!("[runner] Worker panicked, marking controller inactive");
        }
        self.0.set_state(ControllerState::Inactive);
    }
}

/// Spawn the worker. It keeps its own strong reference to the shared state
/// and releases it on exit.
pub(super) fn spawn(shared: Arc<Shared>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("mk-worker {}", shared.device_id))
        .spawn(move || run(&shared))
}

pub(super) fn execute(
    device: &mut dyn DeviceHandle,
    instruction: &Instruction,
) -> Result<(), TransportError> {
    match instruction {
        Instruction::Idle => device.send_idle(),
        Instruction::Uniform { color } => device.set_uniform_color(*color),
        Instruction::Grid { grid } => device.set_grid_colors(grid),
    }
}

/// Drain the queue until asked to stop or an instruction fails, then hand
/// control back to the firmware.
pub(super) fn run(shared: &Shared) {
    let _inactive = InactiveOnExit(&shared.state);
    let device_id = shared.device_id.as_str();

    log::info!(device = device_id; "[runner] Worker started");

    loop {
        let queued = match shared
            .queue
            .next(shared.state.exit_flag(), shared.idle_interval)
        {
            Next::Exit => {
                log::debug!(device = device_id; "[runner] Exit requested");
                break;
            }
            Next::IdleTick => {
                let result = lock(&shared.device).send_idle();
                if let Err(err) = result {
                    log::warn!(
                        device = device_id,
                        err:display = err;
                        "[runner] Idle packet failed"
                    );
                    shared.state.record_error(ControllerError::Idle(err));
                    break;
                }
                log::debug!(device = device_id; "[runner] Sent idle packet");
                continue;
            }
            Next::Run(queued) => queued,
        };

        // The device lock is held for exactly one transport call.
        let result = {
            let mut device = lock(&shared.device);
            execute(&mut **device, &queued.instruction)
        };

        match result {
            Ok(()) => {
                log::debug!(
                    device = device_id,
                    id = queued.id.0,
                    kind = queued.instruction.kind_name();
                    "[runner] Executed instruction"
                );
            }
            Err(source) => {
                let dropped = shared.queue.discard_all();
                log::warn!(
                    device = device_id,
                    id = queued.id.0,
                    kind = queued.instruction.kind_name(),
                    dropped = dropped,
                    err:display = source;
                    "[runner] Instruction failed, stopping"
                );
                shared.state.record_error(ControllerError::Execute {
                    id: queued.id,
                    source,
                });
                break;
            }
        }
    }

    let result = lock(&shared.device).disable_control();
    if let Err(err) = result {
        log::warn!(
            device = device_id,
            err:display = err;
            "[runner] Failed to disable control mode"
        );
        shared.state.record_error(ControllerError::Disable(err));
    }

    log::info!(device = device_id; "[runner] Worker exited");
}
