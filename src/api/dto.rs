use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::interface::transport::{DeviceId, Model};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    CONFIG_SCHEMA_VERSION
}

// ============================================================================
// Controller config DTO (persisted as JSON via config_store)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Transport identifier of the keyboard.
    pub device: DeviceId,
    #[serde(default)]
    pub model: Model,
    /// Send an idle packet after the queue has been empty this long.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_interval_ms: Option<u64>,
}

impl ControllerConfig {
    pub fn new(device: impl Into<DeviceId>) -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            device: device.into(),
            model: Model::default(),
            idle_interval_ms: None,
        }
    }

    pub fn idle_interval(&self) -> Option<Duration> {
        self.idle_interval_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version != CONFIG_SCHEMA_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported schema version {}",
                self.schema_version
            )));
        }
        if self.device.as_str().trim().is_empty() {
            return Err(ConfigError::Invalid("device must not be empty".to_string()));
        }
        if self.idle_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "idleIntervalMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
