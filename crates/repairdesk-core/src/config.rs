//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, the session endpoints and the query cache timings.
//!
//! Configuration is stored at `~/.config/repairdesk/config.json`. The API
//! base URL can be overridden with `REPAIRDESK_API_BASE_URL` (or the legacy
//! `NEXT_PUBLIC_API_BASE_URL`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::{QueryOptions, RetryPolicy};

/// Application name used for the config directory path
const APP_NAME: &str = "repairdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variables overriding `api_base_url`, highest priority first
const BASE_URL_ENV_VARS: [&str; 2] = ["REPAIRDESK_API_BASE_URL", "NEXT_PUBLIC_API_BASE_URL"];

const DEFAULT_API_BASE_URL: &str = "http://localhost:8001/api";
const DEFAULT_REFRESH_PATH: &str = "/auth/token/refresh/";
const DEFAULT_LOGIN_PATH: &str = "/login";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STALE_AFTER_SECS: u64 = 300;
const DEFAULT_COLLECT_AFTER_SECS: u64 = 600;
const DEFAULT_QUERY_RETRIES: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Endpoint that renews the session cookies (POST, no body)
    pub refresh_path: String,
    /// UI login entry point; no "session lost" redirect is signalled from there
    pub login_path: String,
    pub request_timeout_secs: u64,
    pub stale_after_secs: u64,
    pub collect_after_secs: u64,
    pub query_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            collect_after_secs: DEFAULT_COLLECT_AFTER_SECS,
            query_retries: DEFAULT_QUERY_RETRIES,
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent), then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Write the config file, returning where it was written.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = BASE_URL_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|url| !url.trim().is_empty())
        {
            self.api_base_url = url.trim().to_string();
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Default query behaviour derived from the cache settings
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions::default()
            .stale_after(Duration::from_secs(self.stale_after_secs))
            .collect_after(Duration::from_secs(self.collect_after_secs))
            .retry(RetryPolicy {
                retries: self.query_retries,
                ..RetryPolicy::default()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8001/api");
        assert_eq!(config.refresh_path, "/auth/token/refresh/");
        assert_eq!(config.login_path, "/login");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"stale_after_secs": 5}"#).unwrap();
        assert_eq!(config.stale_after_secs, 5);
        assert_eq!(config.collect_after_secs, 600);
        assert_eq!(config.api_base_url, "http://localhost:8001/api");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(APP_NAME).join(CONFIG_FILE);

        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        let config = Config {
            api_base_url: "https://shop.example.com/api".to_string(),
            query_retries: 2,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_env_override_priority() {
        let env: HashMap<&str, &str> = [
            ("REPAIRDESK_API_BASE_URL", "https://shop.example.com/api"),
            ("NEXT_PUBLIC_API_BASE_URL", "http://legacy:8001/api"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "https://shop.example.com/api");

        let mut legacy = Config::default();
        legacy.apply_env(|name| {
            (name == "NEXT_PUBLIC_API_BASE_URL").then(|| "http://legacy:8001/api".to_string())
        });
        assert_eq!(legacy.api_base_url, "http://legacy:8001/api");
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let mut config = Config::default();
        config.apply_env(|_| Some("  ".to_string()));
        assert_eq!(config.api_base_url, "http://localhost:8001/api");
    }

    #[test]
    fn test_query_options_follow_settings() {
        let config = Config {
            stale_after_secs: 10,
            collect_after_secs: 20,
            query_retries: 3,
            ..Config::default()
        };
        let options = config.query_options();
        assert_eq!(options.stale_after, Duration::from_secs(10));
        assert_eq!(options.collect_after, Duration::from_secs(20));
        assert_eq!(options.retry.retries, 3);
        assert!(options.enabled);
    }
}
