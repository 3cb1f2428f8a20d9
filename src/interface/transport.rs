use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::instruction::ColorGrid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

impl From<Color> for [u8; 3] {
    fn from(c: Color) -> Self {
        [c.r, c.g, c.b]
    }
}

/// Keyboard model the transport should expect behind a device identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    ProL,
    ProLWhite,
    ProMWhite,
    ProS,
    ProSWhite,
    Mk750,
    Sk630,
    Sk650,
    /// Let the transport accept whichever supported model it finds.
    #[default]
    Any,
}

/// Transport-level identifier for a single device (bus path, serial, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Closed set of failures a transport primitive may report.
///
/// The controller never interprets these beyond "did it succeed".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportError {
    #[error("invalid device")]
    InvalidDevice,
    #[error("device not connected")]
    NotConnected,
    #[error("failed to open device")]
    OpenFailed,
    #[error("failed to claim device interface")]
    ClaimFailed,
    #[error("transfer failed")]
    Transfer,
    #[error("unexpected device response")]
    Protocol,
    #[error("operation not supported by this model")]
    Unsupported,
}

/// An open connection to one keyboard.
///
/// Calls are synchronous and are expected to return in bounded time; the
/// controller applies no timeout of its own.
pub trait DeviceHandle: Send {
    /// Switch the keyboard from its built-in effects to host control.
    fn enable_control(&mut self) -> Result<(), TransportError>;

    /// Hand LED control back to the keyboard firmware.
    fn disable_control(&mut self) -> Result<(), TransportError>;

    /// Send a no-op control packet.
    fn send_idle(&mut self) -> Result<(), TransportError>;

    fn set_uniform_color(&mut self, color: Color) -> Result<(), TransportError>;

    /// Set each LED individually from a row-major grid.
    fn set_grid_colors(&mut self, grid: &ColorGrid) -> Result<(), TransportError>;

    /// Release the underlying device. Called once, when the controller is
    /// destroyed or dropped.
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Opens device handles.
pub trait Transport {
    fn open(&self, device: &DeviceId, model: Model)
        -> Result<Box<dyn DeviceHandle>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_array_conversion() {
        let c = Color::from([255, 10, 0]);
        assert_eq!(c, Color::new(255, 10, 0));
        let raw: [u8; 3] = c.into();
        assert_eq!(raw, [255, 10, 0]);
    }

    #[test]
    fn test_model_serde_names() {
        let json = serde_json::to_string(&Model::ProSWhite).unwrap();
        assert_eq!(json, "\"pro_s_white\"");
        let parsed: Model = serde_json::from_str("\"mk750\"").unwrap();
        assert_eq!(parsed, Model::Mk750);
        assert_eq!(Model::default(), Model::Any);
    }

    #[test]
    fn test_device_id_is_transparent() {
        let id: DeviceId = serde_json::from_str("\"usb:1-4\"").unwrap();
        assert_eq!(id.as_str(), "usb:1-4");
        assert_eq!(id.to_string(), "usb:1-4");
    }
}
