//! Application configuration management.
//!
//! Holds the origin the worker fronts, the cache generation version, the
//! API path prefix and the install manifest. Stored at
//! `~/.config/swcache/config.json`; missing file means defaults.
//! `SWCACHE_ORIGIN` and `SWCACHE_CACHE_VERSION` override the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::manifest::Manifest;
use crate::worker::{WorkerConfig, DEFAULT_API_PREFIX, DEFAULT_CACHE_VERSION};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "swcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Subdirectory of the cache dir holding one file per store
const STORES_DIR: &str = "stores";

/// Origin used when none is configured (the Next.js dev server)
const DEFAULT_ORIGIN: &str = "http://localhost:3000";

pub const ENV_ORIGIN: &str = "SWCACHE_ORIGIN";
pub const ENV_CACHE_VERSION: &str = "SWCACHE_CACHE_VERSION";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub origin: String,
    pub cache_version: String,
    pub api_prefix: String,
    pub manifest: Manifest,
    pub cache_first_write_back: bool,
    /// Overrides the platform cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            manifest: Manifest::default(),
            cache_first_write_back: true,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(origin) = std::env::var(ENV_ORIGIN) {
            self.origin = origin;
        }
        if let Ok(version) = std::env::var(ENV_CACHE_VERSION) {
            self.cache_version = version;
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

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn stores_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(STORES_DIR))
    }

    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin).with_context(|| format!("Invalid origin: {}", self.origin))
    }

    pub fn worker_config(&self) -> Result<WorkerConfig> {
        Ok(WorkerConfig::new(self.origin_url()?, &self.cache_version)
            .with_api_prefix(self.api_prefix.clone())
            .with_manifest(self.manifest.clone())
            .with_write_back(self.cache_first_write_back))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.api_prefix, "/api/");
        assert_eq!(config.manifest, Manifest::default());
        assert!(config.cache_first_write_back);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "cache_version": "v9", "manifest": ["/", "/bills"] }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.manifest.entries(), &["/", "/bills"]);
        assert_eq!(config.api_prefix, "/api/");
        if std::env::var(ENV_CACHE_VERSION).is_err() {
            assert_eq!(config.cache_version, "v9");
        }
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            api_prefix: "/data/".to_string(),
            cache_dir: Some(dir.path().join("cache")),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.api_prefix, "/data/");
        assert_eq!(loaded.cache_dir().unwrap(), dir.path().join("cache"));
        assert_eq!(loaded.stores_dir().unwrap(), dir.path().join("cache").join("stores"));
    }

    #[test]
    fn test_worker_config_from_config() {
        let config = Config {
            origin: "https://bills.example.org".to_string(),
            cache_version: "v3".to_string(),
            cache_first_write_back: false,
            ..Config::default()
        };
        let worker = config.worker_config().unwrap();
        assert_eq!(worker.static_cache, "pwa-cache-v3");
        assert_eq!(worker.api_cache, "api-cache-v3");
        assert_eq!(worker.origin.as_str(), "https://bills.example.org/");
        assert!(!worker.cache_first_write_back);
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let config = Config {
            origin: "not a url".to_string(),
            ..Config::default()
        };
        assert!(config.worker_config().is_err());
    }
}
