// ABOUTME: TOML configuration for dump, restore and connection settings
// ABOUTME: Every field has a serde default so partial or missing files are valid

use crate::backup::{DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_SIZE, PERMISSIVE_SQL_MODE, SNIFF_LIMIT};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// mysql-snapshot configuration, usually loaded from `--config <file>`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub dump: DumpConfig,

    #[serde(default)]
    pub restore: RestoreConfig,

    #[serde(default)]
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DumpConfig {
    /// Rows per INSERT statement
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestoreConfig {
    /// Bytes read from the dump per tokenizer step
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters of a failing statement kept in error reports
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Bytes inspected when checking that an upload is a SQL dump
    #[serde(default = "default_sniff_bytes")]
    pub sniff_bytes: usize,

    /// Largest dump file accepted for restore
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// sql_mode applied to the restore session
    #[serde(default = "default_sql_mode")]
    pub sql_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Connection retries after the first attempt (0 = no retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, doubled on each subsequent one
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_preview_chars() -> usize {
    crate::backup::restore::DEFAULT_PREVIEW_CHARS
}

fn default_sniff_bytes() -> usize {
    SNIFF_LIMIT
}

fn default_max_upload_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_sql_mode() -> String {
    PERMISSIVE_SQL_MODE.to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for DumpConfig {
    fn default() -> Self {
        DumpConfig {
            batch_size: default_batch_size(),
        }
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        RestoreConfig {
            chunk_size: default_chunk_size(),
            preview_chars: default_preview_chars(),
            sniff_bytes: default_sniff_bytes(),
            max_upload_bytes: default_max_upload_bytes(),
            sql_mode: default_sql_mode(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl ConnectionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, or defaults when no path is given
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The file cannot be read
    /// - The file is not valid TOML for this schema
    /// - A value fails validation (e.g. `batch_size = 0`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dump.batch_size == 0 {
            bail!("dump.batch_size must be at least 1");
        }
        if self.restore.chunk_size == 0 {
            bail!("restore.chunk_size must be at least 1");
        }
        if self.restore.sniff_bytes == 0 {
            bail!("restore.sniff_bytes must be at least 1");
        }
        if self.restore.sql_mode.contains(['\'', '\\']) {
            bail!("restore.sql_mode must not contain quotes or backslashes");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.dump.batch_size, 500);
        assert_eq!(config.restore.chunk_size, 65536);
        assert_eq!(config.restore.preview_chars, 120);
        assert_eq!(config.restore.sniff_bytes, 1024 * 1024);
        assert_eq!(config.restore.max_upload_bytes, 512 * 1024 * 1024);
        assert_eq!(config.restore.sql_mode, "NO_AUTO_VALUE_ON_ZERO");
        assert_eq!(config.connection.max_retries, 3);
        assert_eq!(config.connection.retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::from_toml("[dump]\nbatch_size = 50\n").unwrap();
        assert_eq!(config.dump.batch_size, 50);
        assert_eq!(config.restore, RestoreConfig::default());
        assert_eq!(config.connection, ConnectionConfig::default());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_validation_rejects_zero_sizes() {
        assert!(Config::from_toml("[dump]\nbatch_size = 0\n").is_err());
        assert!(Config::from_toml("[restore]\nchunk_size = 0\n").is_err());
        assert!(Config::from_toml("[restore]\nsql_mode = \"x'y\"\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\nmax_retries = 0\nretry_delay_ms = 10").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.connection.max_retries, 0);
        assert_eq!(config.connection.retry_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        assert_eq!(Config::load(None).unwrap(), Config::default());
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/mysql-snapshot.toml")));
        assert!(result.is_err());
    }
}
