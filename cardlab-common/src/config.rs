//! Configuration loading for CardLab services.
//!
//! Resolution priority:
//! 1. `CARDLAB_CONFIG` environment variable (explicit file path)
//! 2. Platform config directory (`~/.config/cardlab/config.toml` on Linux)
//! 3. Compiled defaults
//!
//! Every field has a default so a partial TOML file is valid.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming an explicit config file path.
pub const CONFIG_ENV_VAR: &str = "CARDLAB_CONFIG";

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CardLabConfig {
    /// Address the HTTP API binds to
    pub bind_address: String,
    /// Toolhost (external capability service) settings
    pub toolhost: ToolhostConfig,
    /// Optional remote planner; absent means the deterministic default plan
    pub planner: Option<PlannerConfig>,
    /// Identification confidence below this threshold flags needs-review
    pub confidence_threshold: f32,
    /// Session registry housekeeping
    pub session: SessionConfig,
}

/// Settings for the external tool-calling service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolhostConfig {
    /// Base URL of the toolhost, e.g. "http://127.0.0.1:8001"
    pub base_url: String,
    /// Per-call timeout for most capabilities (seconds)
    pub call_timeout_secs: u64,
    /// Grading is the slowest capability and gets a longer ceiling (seconds)
    pub grading_timeout_secs: u64,
}

/// Settings for the optional remote planning call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Chat-completions style endpoint URL
    pub endpoint: String,
    /// Bearer token for the endpoint
    pub api_key: String,
    /// Model name to request
    pub model: String,
}

/// Session registry housekeeping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle sessions are torn down after this many seconds
    pub idle_timeout_secs: u64,
    /// EventBus channel capacity
    pub event_capacity: usize,
}

impl Default for CardLabConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5731".to_string(),
            toolhost: ToolhostConfig::default(),
            planner: None,
            confidence_threshold: 0.8,
            session: SessionConfig::default(),
        }
    }
}

impl Default for ToolhostConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".to_string(),
            call_timeout_secs: 120,
            grading_timeout_secs: 180,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 600,
            event_capacity: 1000,
        }
    }
}

impl CardLabConfig {
    /// Load configuration following the resolution priority order.
    ///
    /// A missing config file is not an error (defaults apply); an unreadable
    /// or malformed file is.
    pub fn load() -> Result<Self> {
        match resolve_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific TOML file.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config: CardLabConfig = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.toolhost.base_url.is_empty() {
            return Err(Error::Config("toolhost.base_url must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence_threshold must be within 0.0..=1.0, got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Resolve the config file path, if any exists.
fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    let candidate = dirs::config_dir().map(|d| d.join("cardlab").join("config.toml"))?;
    if candidate.exists() {
        Some(candidate)
    } else {
        None
    }
}
