//! Engine configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! tick_checkpoint_period = 6000
//! start_silently = false
//! max_machines = 100000
//! hook_failure_policy = "fail_open"
//! clear_store_on_shutdown = false
//! ```

use crate::event::HookFailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Five minutes at twenty ticks per second.
pub const DEFAULT_CHECKPOINT_PERIOD: u64 = 6000;

pub const DEFAULT_MAX_MACHINES: usize = 100_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ticks between automatic checkpoints. Zero disables them.
    pub tick_checkpoint_period: u64,
    /// Suppress lifecycle log output. Warnings are still emitted.
    pub start_silently: bool,
    /// Upper bound on live machines; `create` fails past it.
    pub max_machines: usize,
    pub hook_failure_policy: HookFailurePolicy,
    /// Whether [`crate::engine::EngineHandle::shutdown_default`] clears the
    /// store instead of persisting.
    pub clear_store_on_shutdown: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_checkpoint_period: DEFAULT_CHECKPOINT_PERIOD,
            start_silently: false,
            max_machines: DEFAULT_MAX_MACHINES,
            hook_failure_policy: HookFailurePolicy::FailOpen,
            clear_store_on_shutdown: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
