//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/bookshelf/config.toml)
//! 3. Environment variables (BOOKSHELF_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable prefix
const ENV_PREFIX: &str = "BOOKSHELF";

/// Google Books volumes endpoint
pub const DEFAULT_CATALOG_URL: &str = "https://www.googleapis.com/books/v1/volumes";

/// Number of search results requested from the catalog
pub const DEFAULT_MAX_RESULTS: u32 = 24;

/// Result counts the Google Books API accepts
pub const MAX_RESULTS_RANGE: RangeInclusive<u32> = 1..=40;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (library store, logs)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the book catalog API
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,

    /// Catalog API key (optional)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Maximum number of search results
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Log file path (defaults to {data_dir}/debug.log)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            catalog_url: default_catalog_url(),
            api_key: None,
            max_results: DEFAULT_MAX_RESULTS,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (BOOKSHELF_DATA_DIR, BOOKSHELF_CATALOG_URL, ...)
    /// 2. Config file (~/.config/bookshelf/config.toml or BOOKSHELF_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.check_max_results();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        config.check_max_results();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_CATALOG_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.catalog_url = val;
            }
        }

        // Empty string clears the key
        if let Ok(val) = std::env::var(format!("{}_API_KEY", ENV_PREFIX)) {
            self.api_key = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_MAX_RESULTS", ENV_PREFIX)) {
            match val.parse() {
                Ok(n) if MAX_RESULTS_RANGE.contains(&n) => self.max_results = n,
                _ => warn!(
                    "Ignoring {}_MAX_RESULTS={:?}: expected a number from 1 to 40",
                    ENV_PREFIX, val
                ),
            }
        }
    }

    /// Fall back to the default when the file holds a count the catalog rejects
    fn check_max_results(&mut self) {
        if !MAX_RESULTS_RANGE.contains(&self.max_results) {
            warn!(
                "max_results {} is outside 1..=40, using {}",
                self.max_results, DEFAULT_MAX_RESULTS
            );
            self.max_results = DEFAULT_MAX_RESULTS;
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with BOOKSHELF_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bookshelf")
            .join("config.toml")
    }

    /// Get the directory holding the library store
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    /// Get the log file path
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("debug.log"))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bookshelf")
}

fn default_catalog_url() -> String {
    DEFAULT_CATALOG_URL.to_string()
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "BOOKSHELF_DATA_DIR",
        "BOOKSHELF_CATALOG_URL",
        "BOOKSHELF_API_KEY",
        "BOOKSHELF_MAX_RESULTS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.catalog_url, DEFAULT_CATALOG_URL);
        assert_eq!(config.max_results, 24);
        assert!(config.api_key.is_none());
        assert!(config.data_dir.ends_with("bookshelf"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config {
            data_dir: PathBuf::from("/data/bookshelf"),
            ..Config::default()
        };

        assert_eq!(config.store_dir(), PathBuf::from("/data/bookshelf/store"));
        assert_eq!(config.log_path(), PathBuf::from("/data/bookshelf/debug.log"));

        let config = Config {
            log_file: Some(PathBuf::from("/tmp/shelf.log")),
            ..config
        };
        assert_eq!(config.log_path(), PathBuf::from("/tmp/shelf.log"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("BOOKSHELF_DATA_DIR", "/tmp/bookshelf-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/bookshelf-test"));
    }

    #[test]
    fn test_env_override_api_key() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("BOOKSHELF_API_KEY", "secret");
        config.apply_env_overrides();
        assert_eq!(config.api_key.as_deref(), Some("secret"));

        // Empty string clears it
        env::set_var("BOOKSHELF_API_KEY", "");
        config.apply_env_overrides();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_env_override_max_results() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("BOOKSHELF_MAX_RESULTS", "10");
        config.apply_env_overrides();
        assert_eq!(config.max_results, 10);

        // Garbage is ignored
        env::set_var("BOOKSHELF_MAX_RESULTS", "lots");
        config.apply_env_overrides();
        assert_eq!(config.max_results, 10);

        // So are counts the catalog would reject
        for rejected in ["0", "41", "100"] {
            env::set_var("BOOKSHELF_MAX_RESULTS", rejected);
            config.apply_env_overrides();
            assert_eq!(config.max_results, 10);
        }

        env::set_var("BOOKSHELF_MAX_RESULTS", "40");
        config.apply_env_overrides();
        assert_eq!(config.max_results, 40);
    }

    #[test]
    fn test_out_of_range_file_value_uses_default() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config::load_from_str("max_results = 100").unwrap();
        assert_eq!(config.max_results, DEFAULT_MAX_RESULTS);

        let config = Config::load_from_str("max_results = 40").unwrap();
        assert_eq!(config.max_results, 40);
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/bookshelf"),
            catalog_url: "http://localhost:8080/volumes".to_string(),
            api_key: Some("key".to_string()),
            max_results: 12,
            log_file: None,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("catalog_url"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.catalog_url, config.catalog_url);
        assert_eq!(parsed.api_key, config.api_key);
        assert_eq!(parsed.max_results, 12);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            api_key = "abc"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.catalog_url, DEFAULT_CATALOG_URL);
        assert_eq!(config.max_results, DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        env::set_var("BOOKSHELF_DATA_DIR", temp_dir.path().join("data"));

        let path = temp_dir.path().join("missing.toml");
        let config = Config::load_from_path(&path).unwrap();

        assert!(config.api_key.is_none());
        assert!(config.data_dir.exists());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            data_dir: temp_dir.path().join("data"),
            max_results: 5,
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.data_dir, config.data_dir);
        assert_eq!(loaded.max_results, 5);
    }
}
