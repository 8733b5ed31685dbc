//! Application configuration management.
//!
//! Configuration holds the API base URL, the endpoint paths the session
//! layer talks to, the request timeout and the last used username.
//!
//! Configuration is stored at `~/.config/skadi/config.json`. The
//! `SKADI_API_BASE_URL`, `SKADI_TIMEOUT_SECS` and `SKADI_REFRESH_PATH`
//! environment variables override the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "skadi";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default request timeout, matching the web client
const DEFAULT_TIMEOUT_SECS: u64 = 10;

const ENV_BASE_URL: &str = "SKADI_API_BASE_URL";
const ENV_TIMEOUT: &str = "SKADI_TIMEOUT_SECS";
const ENV_REFRESH_PATH: &str = "SKADI_REFRESH_PATH";

/// Paths of the endpoints the session layer depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPaths {
    pub sign_in: String,
    pub logout: String,
    pub refresh: String,
    pub identity: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            sign_in: "/auth/login".to_string(),
            logout: "/auth/private/logout".to_string(),
            refresh: "/auth/private/obtain".to_string(),
            identity: "/user/me".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub endpoints: EndpointPaths,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            endpoints: EndpointPaths::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_TIMEOUT),
            }
        }
        if let Some(path) = lookup(ENV_REFRESH_PATH).filter(|v| !v.trim().is_empty()) {
            self.endpoints.refresh = path.trim().to_string();
        }
    }

    /// Join an endpoint path onto the base URL. Absolute URLs pass through,
    /// so e.g. the refresh endpoint can live on a separate auth host.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
