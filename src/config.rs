//! Engine configuration loading, including the toaster trigger thresholds.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the engine looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/engine.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUEST_RACE_CONFIG_PATH";

/// Immutable runtime configuration shared across the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Remaining-keys trigger values for "N keys needed to win" toasts,
    /// largest first (e.g. `[20, 10, 5]`).
    pub key_thresholds: Vec<u32>,
    /// Cooldown window for the "keys awarded" toast category, in seconds.
    pub toaster_cooldown_secs: u64,
    /// Directory the per-competition race history files are written to.
    pub history_path: PathBuf,
    /// Maximum number of completed races retained per competition.
    pub history_cap: usize,
}

impl EngineConfig {
    /// Load the engine configuration from disk, falling back to baked-in
    /// defaults when the file is absent or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        thresholds = ?config.key_thresholds,
                        "loaded engine configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_thresholds: vec![20, 10, 5],
            toaster_cooldown_secs: 30,
            history_path: PathBuf::from("data/history"),
            history_cap: 20,
        }
    }
}

/// JSON representation of the configuration file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    key_thresholds: Option<Vec<u32>>,
    #[serde(default)]
    toaster_cooldown_secs: Option<u64>,
    #[serde(default)]
    history_path: Option<PathBuf>,
    #[serde(default)]
    history_cap: Option<usize>,
}

impl From<RawConfig> for EngineConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = EngineConfig::default();
        Self {
            key_thresholds: value.key_thresholds.unwrap_or(defaults.key_thresholds),
            toaster_cooldown_secs: value
                .toaster_cooldown_secs
                .unwrap_or(defaults.toaster_cooldown_secs),
            history_path: value.history_path.unwrap_or(defaults.history_path),
            history_cap: value.history_cap.unwrap_or(defaults.history_cap),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
