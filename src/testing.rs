//! In-memory transport for exercising controllers without hardware.
//!
//! [`RecordingTransport`] hands out handles that log every primitive call
//! into a shared list and can be told to fail or slow down specific calls.
//! Clones share the same log and fault settings, so a test keeps one clone
//! and gives the other to [`Controller::create`](crate::Controller::create).
//!
//! ```
//! use mk_controller::testing::{Call, RecordingTransport};
//! use mk_controller::{Color, Controller, ControllerState, Instruction, Model};
//! use std::time::Duration;
//!
//! let transport = RecordingTransport::new();
//! let controller = Controller::create(&transport, "usb:1-4", Model::Any).unwrap();
//! controller.enqueue(Instruction::uniform(Color::new(255, 0, 0)));
//! controller.start().unwrap();
//!
//! while controller.pending_len() > 0 || transport.executed().is_empty() {
//!     std::thread::sleep(Duration::from_millis(1));
//! }
//! controller.stop();
//! assert_eq!(controller.join(Duration::from_secs(5)), ControllerState::Inactive);
//! assert_eq!(transport.executed(), vec![Call::SetUniformColor(Color::new(255, 0, 0))]);
//! ```

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::interface::instruction::ColorGrid;
use crate::interface::transport::{Color, DeviceHandle, DeviceId, Model, Transport, TransportError};
use crate::manager::lock;

/// One recorded transport call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Open { device: DeviceId, model: Model },
    EnableControl,
    DisableControl,
    SendIdle,
    SetUniformColor(Color),
    SetGridColors(ColorGrid),
    Close,
}

impl Call {
    /// Whether this call executes an instruction (as opposed to lifecycle).
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            Call::SendIdle | Call::SetUniformColor(_) | Call::SetGridColors(_)
        )
    }
}

#[derive(Default)]
struct Faults {
    open: Option<TransportError>,
    enable: Option<TransportError>,
    disable: Option<TransportError>,
    close: Option<TransportError>,
    // 1-based index of the execution call that fails.
    execution: Option<(usize, TransportError)>,
    delay: Duration,
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Call>>,
    faults: Mutex<Faults>,
}

impl Recorder {
    fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }

    fn execute(&self, call: Call) -> Result<(), TransportError> {
        let (delay, failing) = {
            let faults = lock(&self.faults);
            (faults.delay, faults.execution)
        };
        let nth = {
            let mut calls = lock(&self.calls);
            calls.push(call);
            calls.iter().filter(|c| c.is_execution()).count()
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        match failing {
            Some((at, err)) if at == nth => Err(err),
            _ => Ok(()),
        }
    }

    fn lifecycle(
        &self,
        call: Call,
        fault: impl FnOnce(&Faults) -> Option<TransportError>,
    ) -> Result<(), TransportError> {
        self.record(call);
        match fault(&*lock(&self.faults)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Transport fake that records calls and injects failures.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    recorder: Arc<Recorder>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.recorder.calls).clone()
    }

    /// Only the calls that executed instructions or idle packets, including
    /// any that failed.
    pub fn executed(&self) -> Vec<Call> {
        lock(&self.recorder.calls)
            .iter()
            .filter(|c| c.is_execution())
            .cloned()
            .collect()
    }

    pub fn closed(&self) -> bool {
        lock(&self.recorder.calls).contains(&Call::Close)
    }

    pub fn fail_open(&self, err: TransportError) {
        lock(&self.recorder.faults).open = Some(err);
    }

    pub fn fail_enable(&self, err: TransportError) {
        lock(&self.recorder.faults).enable = Some(err);
    }

    pub fn fail_disable(&self, err: TransportError) {
        lock(&self.recorder.faults).disable = Some(err);
    }

    pub fn fail_close(&self, err: TransportError) {
        lock(&self.recorder.faults).close = Some(err);
    }

    /// Fail the `nth` execution call (1-based, counted over the transport's
    /// whole lifetime).
    pub fn fail_execution(&self, nth: usize, err: TransportError) {
        lock(&self.recorder.faults).execution = Some((nth, err));
    }

    /// Sleep this long inside every execution call.
    pub fn set_delay(&self, delay: Duration) {
        lock(&self.recorder.faults).delay = delay;
    }

    pub fn clear_faults(&self) {
        *lock(&self.recorder.faults) = Faults::default();
    }
}

impl Transport for RecordingTransport {
    fn open(
        &self,
        device: &DeviceId,
        model: Model,
    ) -> Result<Box<dyn DeviceHandle>, TransportError> {
        self.recorder.lifecycle(
            Call::Open {
                device: device.clone(),
                model,
            },
            |f| f.open,
        )?;
        Ok(Box::new(RecordingHandle {
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

struct RecordingHandle {
    recorder: Arc<Recorder>,
}

impl DeviceHandle for RecordingHandle {
    fn enable_control(&mut self) -> Result<(), TransportError> {
        self.recorder.lifecycle(Call::EnableControl, |f| f.enable)
    }

    fn disable_control(&mut self) -> Result<(), TransportError> {
        self.recorder.lifecycle(Call::DisableControl, |f| f.disable)
    }

    fn send_idle(&mut self) -> Result<(), TransportError> {
        self.recorder.execute(Call::SendIdle)
    }

    fn set_uniform_color(&mut self, color: Color) -> Result<(), TransportError> {
        self.recorder.execute(Call::SetUniformColor(color))
    }

    fn set_grid_colors(&mut self, grid: &ColorGrid) -> Result<(), TransportError> {
        self.recorder.execute(Call::SetGridColors(grid.clone()))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.recorder.lifecycle(Call::Close, |f| f.close)
    }
}
