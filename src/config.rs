//! Settings file (`config.toml`) and resolution against CLI flags

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

/// Endpoint used when nothing else is configured
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3301";

/// Environment variable holding the API key unless `api_key_env` says otherwise
pub const DEFAULT_API_KEY_ENV: &str = "SETTLE_API_KEY";

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// SigNoz base URL
    pub endpoint: Option<String>,
    /// Name of the environment variable that holds the API key
    pub api_key_env: Option<String>,
    /// Global HTTP timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Parallel workers during apply
    pub jobs: Option<usize>,
    /// State file location
    pub state_file: Option<String>,
}

impl Settings {
    /// Load settings from the default location, or defaults if the file is missing
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::settings_file()?)
    }

    /// Load settings from a specific path, or defaults if the file is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}

/// Flags and env vars that take precedence over the settings file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub state_file: Option<PathBuf>,
    pub jobs: Option<usize>,
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub jobs: usize,
    pub state_file: PathBuf,
}

impl Config {
    /// Merge settings with overrides. Flags win over the file, the file wins over defaults.
    pub fn resolve(settings: &Settings, overrides: Overrides) -> Result<Self> {
        let endpoint = overrides
            .endpoint
            .or_else(|| settings.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = endpoint.trim_end_matches('/').to_string();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            bail!("Endpoint must be an http(s) URL, got `{endpoint}`");
        }

        let api_key = overrides.api_key.or_else(|| {
            let var = settings.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
            std::env::var(var).ok()
        });
        if api_key.is_none() {
            log::warn!("No API key configured; requests will be unauthenticated");
        }

        let jobs = overrides.jobs.or(settings.jobs).unwrap_or(4).max(1);

        let state_file = match overrides.state_file {
            Some(path) => path,
            None => match &settings.state_file {
                Some(path) => paths::expand(path),
                None => paths::default_state_file()?,
            },
        };

        Ok(Self {
            endpoint,
            api_key,
            timeout: Duration::from_secs(settings.timeout_secs.unwrap_or(30)),
            jobs,
            state_file,
        })
    }
}
