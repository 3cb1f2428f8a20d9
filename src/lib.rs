//! Asynchronous instruction controller for RGB keyboards.
//!
//! A [`Controller`] owns one open device and a background worker. Callers
//! enqueue [`Instruction`]s from any thread; the worker executes them in
//! order through the [`DeviceHandle`] the [`Transport`] opened, and stops on
//! request or at the first failure. The first error is kept and can be read
//! back with [`Controller::get_error`].

pub mod api;
pub mod error;
pub mod interface;
pub mod manager;
pub mod testing;

pub use api::config_store::{load_controller_config, parse_controller_config, save_controller_config};
pub use api::dto::ControllerConfig;
pub use error::{ConfigError, ControllerError};
pub use interface::instruction::{ColorGrid, Instruction, InstructionId, MAX_COLS, MAX_ROWS};
pub use interface::transport::{Color, DeviceHandle, DeviceId, Model, Transport, TransportError};
pub use manager::state::ControllerState;
pub use manager::{Controller, DestroyError};
