use std::io::Write;
use std::path::Path;

use crate::api::dto::ControllerConfig;
use crate::error::ConfigError;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Parse and validate a controller config from a JSON string.
pub fn parse_controller_config(raw: &str) -> Result<ControllerConfig, ConfigError> {
    let cfg = serde_json::from_str::<ControllerConfig>(raw).map_err(|source| ConfigError::Parse {
        path: Default::default(),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load a controller config. A missing file is `Ok(None)`.
pub fn load_controller_config(path: &Path) -> Result<Option<ControllerConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(path).map_err(io_err(path))?;

    let cfg = serde_json::from_str::<ControllerConfig>(&raw).map_err(|source| {
        ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    cfg.validate()?;

    log::debug!(path:? = path, device = cfg.device.as_str(); "[config] Loaded controller config");
    Ok(Some(cfg))
}

pub fn save_controller_config(path: &Path, config: &ControllerConfig) -> Result<(), ConfigError> {
    config.validate()?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(io_err(dir))?;
    }

    let json = serde_json::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Atomic-ish write: write to temp then rename.
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = std::fs::File::create(&tmp).map_err(io_err(&tmp))?;
        f.write_all(json.as_bytes()).map_err(io_err(&tmp))?;
        f.flush().map_err(io_err(&tmp))?;
    }
    std::fs::rename(&tmp, path).map_err(io_err(path))?;

    Ok(())
}
