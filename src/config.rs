//! Application configuration.
//!
//! One YAML document with a section per component. Lookup order: explicit
//! `--config` path, `./config/config.yaml`, `<config dir>/pagepilot/config.yaml`,
//! built-in defaults. `PAGEPILOT_*` environment variables win over the file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use action_locator::LocatorConfig;
use action_primitives::ExecutorConfig;
use agent_core::{LoopConfig, PlannerConfig};
use cdp_adapter::CdpConfig;
use clap::ValueEnum;
use perceiver_structural::CaptureOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PLANNER_URL: &str = "PAGEPILOT_PLANNER_URL";
pub const ENV_MAX_STEPS: &str = "PAGEPILOT_MAX_STEPS";
pub const ENV_LOG: &str = "PAGEPILOT_LOG";
pub const ENV_CHROME: &str = "PAGEPILOT_CHROME";
pub const ENV_HEADLESS: &str = "PAGEPILOT_HEADLESS";
pub const ENV_WS_URL: &str = "PAGEPILOT_WS_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
    /// Also write daily-rolled log files here.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            directory: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: CdpConfig,
    pub extractor: CaptureOptions,
    pub locator: LocatorConfig,
    pub executor: ExecutorConfig,
    pub orchestrator: LoopConfig,
    pub planner: PlannerConfig,
    pub logging: LoggingConfig,
}

/// A configuration plus where it came from (`None` for built-in defaults).
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_yaml(source: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&source, path)
    }

    /// Load from the first file found, apply environment overrides, validate.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let path = resolve_path(explicit, &cwd, dirs::config_dir().as_deref());
        let mut config = match &path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(LoadedConfig { config, path })
    }

    /// Apply `PAGEPILOT_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(url) = get(ENV_PLANNER_URL) {
            self.planner.base_url = url;
        }
        if let Some(steps) = get(ENV_MAX_STEPS).and_then(|raw| raw.parse().ok()) {
            self.orchestrator.max_steps = steps;
        }
        if let Some(level) = get(ENV_LOG) {
            self.logging.level = level;
        }
        if let Some(chrome) = get(ENV_CHROME) {
            self.browser.executable = PathBuf::from(chrome);
        }
        if let Some(headless) = get(ENV_HEADLESS) {
            self.browser.headless = !matches!(
                headless.to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }
        if let Some(ws) = get(ENV_WS_URL) {
            self.browser.websocket_url = Some(ws);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.orchestrator
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if self.executor.min_wait_ms > self.executor.max_wait_ms {
            return Err(ConfigError::Invalid(format!(
                "executor.min_wait_ms ({}) exceeds executor.max_wait_ms ({})",
                self.executor.min_wait_ms, self.executor.max_wait_ms
            )));
        }
        if self.planner.timeout_ms == 0 {
            return Err(ConfigError::Invalid("planner.timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// First configuration file that applies. An explicit path is returned even if missing,
/// so that reading it reports the error.
pub fn resolve_path(explicit: Option<&Path>, cwd: &Path, config_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = cwd.join("config").join("config.yaml");
    if local.exists() {
        return Some(local);
    }
    config_dir
        .map(|dir| dir.join("pagepilot").join("config.yaml"))
        .filter(|path| path.exists())
}
