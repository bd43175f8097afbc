//! Configuration types for notebase.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{NotebaseError, Result};

/// Environment variable overriding `server.bind_address`.
pub const ENV_HTTP_ADDRESS: &str = "NOTEBASE_HTTP_ADDRESS";

/// Environment variable overriding `database.path`.
pub const ENV_DATABASE_PATH: &str = "NOTEBASE_DATABASE_PATH";

/// Main configuration for notebase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotebaseConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
///
/// The store always runs on a single connection; these settings only tune
/// how that connection is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// SQLite cache size (negative = KB, positive = pages).
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            wal_mode: true,
            cache_size: -16000, // 16MB
            busy_timeout_ms: 5000,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Per-request deadline in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            request_timeout_secs: 30,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_cache_size() -> i32 {
    -16000
}

fn default_busy_timeout() -> u32 {
    5000
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notebase")
        .join("notebase.db")
}

impl NotebaseConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| NotebaseError::Config {
            message: format!("Failed to parse config: {}", e),
        })
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("notebase").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("notebase.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Apply `NOTEBASE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup(ENV_HTTP_ADDRESS).filter(|v| !v.trim().is_empty()) {
            self.server.bind_address = addr;
        }
        if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|v| !v.trim().is_empty()) {
            self.database.path = PathBuf::from(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = NotebaseConfig::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(config.database.wal_mode);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NotebaseConfig::from_toml(
            r#"
            [server]
            bind_address = "0.0.0.0:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.database.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \"/tmp/notes.db\"\nwal_mode = false").unwrap();

        let config = NotebaseConfig::load(file.path()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/notes.db"));
        assert!(!config.database.wal_mode);
    }

    #[test]
    fn test_invalid_toml() {
        let err = NotebaseConfig::from_toml("[server\nbind_address = 1").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = NotebaseConfig::default();
        config.apply_overrides(|key| match key {
            ENV_HTTP_ADDRESS => Some("0.0.0.0:7000".to_string()),
            ENV_DATABASE_PATH => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.server.bind_address, "0.0.0.0:7000");
        assert_eq!(config.database.path, default_database_path());
    }
}
