use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub input: InputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "GeneralConfig::default_enabled")]
    pub enabled: bool,
}

impl GeneralConfig {
    fn default_enabled() -> bool { true }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Continuous hover needed before a tooltip shows.
    #[serde(default = "TimingConfig::default_rest")]
    pub rest_ms: u64,
    /// Grace period during which a leaving tooltip can be rescued.
    #[serde(default = "TimingConfig::default_leave")]
    pub leave_ms: u64,
}

impl TimingConfig {
    fn default_rest() -> u64 { 100 }
    fn default_leave() -> u64 { 500 }

    pub fn rest_delay(&self) -> Duration {
        Duration::from_millis(self.rest_ms)
    }

    pub fn leave_delay(&self) -> Duration {
        Duration::from_millis(self.leave_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            rest_ms: 100,
            leave_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Gap between trigger and popup, in px.
    #[serde(default = "PlacementConfig::default_offset")]
    pub offset: f64,
}

impl PlacementConfig {
    fn default_offset() -> f64 { 8.0 }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self { offset: 8.0 }
    }
}

/// Host input capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Host delivers pointer events; mouse events are then ignored.
    #[serde(default = "InputConfig::default_pointer_events")]
    pub pointer_events: bool,
    /// Host suppresses pointer-leave on disabled controls; watch document
    /// mouse moves instead.
    #[serde(default = "InputConfig::default_workaround")]
    pub disabled_trigger_workaround: bool,
}

impl InputConfig {
    fn default_pointer_events() -> bool { true }
    fn default_workaround() -> bool { true }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            pointer_events: true,
            disabled_trigger_workaround: true,
        }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("tipd")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&contents).with_context(|| "parsing config TOML")
    }
}

pub fn socket_path() -> PathBuf {
    // TIPD_SOCK overrides for testing.
    if let Ok(path) = std::env::var("TIPD_SOCK") {
        return PathBuf::from(path);
    }
    PathBuf::from("/run/tipd/tipd.sock")
}
