//! Engine configuration.
//!
//! Loaded from a TOML file; command-line arguments override individual
//! fields afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stepforge_ipc::{DEFAULT_MAX_FRAME_SIZE, MAX_PENDING_SET_VALUES};
use stepforge_vm::MAX_CALL_DEPTH;

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Host connection
    pub ipc: IpcConfig,
    /// Dispatch limits
    pub engine: DispatchConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: EngineConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| anyhow::anyhow!("Failed to write config file '{}': {}", path.display(), e))?;
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ipc.socket.as_os_str().is_empty() {
            anyhow::bail!("Host socket path is required");
        }
        if self.ipc.max_frame_size < 1024 {
            anyhow::bail!("max_frame_size {} is below 1 KiB", self.ipc.max_frame_size);
        }
        if self.ipc.max_pending_set_values == 0 {
            anyhow::bail!("max_pending_set_values cannot be 0");
        }
        if self.engine.max_call_depth == 0 {
            anyhow::bail!("max_call_depth cannot be 0");
        }
        Ok(())
    }
}

/// Host connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Unix socket the host listens on
    pub socket: PathBuf,
    /// Largest accepted frame body
    pub max_frame_size: usize,
    /// Unacknowledged tracked writes allowed before draining
    pub max_pending_set_values: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_pending_set_values: MAX_PENDING_SET_VALUES,
        }
    }
}

/// Dispatch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Nesting limit for re-entrant invokes
    pub max_call_depth: usize,
    /// Check contract APIs on first load
    pub verify_package: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_call_depth: MAX_CALL_DEPTH,
            verify_package: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive
    pub level: String,
    /// JSON output instead of pretty
    pub json: bool,
    /// Log to file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}
