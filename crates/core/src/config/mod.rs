//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TIDYSCRAPE_*)
//! 2. TOML config file (if TIDYSCRAPE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TIDYSCRAPE_*)
/// 2. TOML config file (if TIDYSCRAPE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via TIDYSCRAPE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Whether fetched documents are cached at all.
    ///
    /// Set via TIDYSCRAPE_CACHE_ENABLED environment variable.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Default User-Agent string for HTTP requests.
    ///
    /// Set via TIDYSCRAPE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via TIDYSCRAPE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via TIDYSCRAPE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Age in seconds after which cache entries are removed by garbage collection.
    ///
    /// Set via TIDYSCRAPE_GC_MAX_LIFETIME_SECS environment variable.
    #[serde(default = "default_gc_max_lifetime_secs")]
    pub gc_max_lifetime_secs: u64,

    /// Garbage collection runs with a probability of 1/gc_divisor on startup.
    /// Zero disables garbage collection.
    ///
    /// Set via TIDYSCRAPE_GC_DIVISOR environment variable.
    #[serde(default = "default_gc_divisor")]
    pub gc_divisor: u32,

    /// Serialize concurrent cache misses for the same fingerprint.
    ///
    /// Set via TIDYSCRAPE_COALESCE_FETCHES environment variable.
    #[serde(default)]
    pub coalesce_fetches: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tidyscrape-cache.sqlite")
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; tidyscrape/0.1)".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_gc_max_lifetime_secs() -> u64 {
    86_400
}

fn default_gc_divisor() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_enabled: true,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            gc_max_lifetime_secs: default_gc_max_lifetime_secs(),
            gc_divisor: default_gc_divisor(),
            coalesce_fetches: false,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether startup garbage collection is enabled.
    pub fn gc_enabled(&self) -> bool {
        self.cache_enabled && self.gc_max_lifetime_secs > 0 && self.gc_divisor > 0
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TIDYSCRAPE_`
    /// 2. TOML file from `TIDYSCRAPE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TIDYSCRAPE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TIDYSCRAPE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./tidyscrape-cache.sqlite"));
        assert!(config.cache_enabled);
        assert_eq!(config.user_agent, "Mozilla/5.0 (compatible; tidyscrape/0.1)");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.gc_max_lifetime_secs, 86_400);
        assert_eq!(config.gc_divisor, 100);
        assert!(!config.coalesce_fetches);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_gc_enabled() {
        assert!(AppConfig::default().gc_enabled());
        assert!(!AppConfig { gc_divisor: 0, ..Default::default() }.gc_enabled());
        assert!(!AppConfig { gc_max_lifetime_secs: 0, ..Default::default() }.gc_enabled());
        assert!(!AppConfig { cache_enabled: false, ..Default::default() }.gc_enabled());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidyscrape.toml");
        std::fs::write(&path, "user_agent = \"custom/1.0\"\ngc_divisor = 7\n").unwrap();

        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&path))
            .extract()
            .unwrap();

        assert_eq!(config.user_agent, "custom/1.0");
        assert_eq!(config.gc_divisor, 7);
        assert_eq!(config.timeout_ms, 20_000);
    }
}
