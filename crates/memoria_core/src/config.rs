//! Runtime configuration from environment variables.
//!
//! | Variable                | Default                      |
//! |-------------------------|------------------------------|
//! | `MEMORIA_DATA_DIR`      | `.data`                      |
//! | `MEMORIA_LOG_LEVEL`     | `default_log_level()`        |
//! | `MEMORIA_LOG_DIR`       | `<data dir>/logs`            |
//! | `MEMORIA_CONTEXT_SCOPE` | `global_context`             |
//! | `MEMORIA_QUERY_LIMIT`   | `10`                         |

use crate::logging::default_log_level;
use crate::service::context_document::DEFAULT_CONTEXT_SCOPE;
use crate::service::item_store::DEFAULT_QUERY_LIMIT;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DEFAULT_DATA_DIR: &str = ".data";
pub const DB_FILE_NAME: &str = "memoria.sqlite3";

const ENV_DATA_DIR: &str = "MEMORIA_DATA_DIR";
const ENV_LOG_LEVEL: &str = "MEMORIA_LOG_LEVEL";
const ENV_LOG_DIR: &str = "MEMORIA_LOG_DIR";
const ENV_CONTEXT_SCOPE: &str = "MEMORIA_CONTEXT_SCOPE";
const ENV_QUERY_LIMIT: &str = "MEMORIA_QUERY_LIMIT";

/// Every invalid variable found while loading, reported together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub problems: Vec<String>,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid configuration: {}", self.problems.join("; "))
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoriaConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub context_scope: String,
    pub query_limit: u32,
}

impl Default for MemoriaConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Self {
            log_dir: data_dir.join("logs"),
            data_dir,
            log_level: default_log_level().to_string(),
            context_scope: DEFAULT_CONTEXT_SCOPE.to_string(),
            query_limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl MemoriaConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();
        let mut problems = Vec::new();

        if let Some(data_dir) = read(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(data_dir);
            config.log_dir = config.data_dir.join("logs");
        }
        if let Some(log_dir) = read(ENV_LOG_DIR) {
            config.log_dir = PathBuf::from(log_dir);
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            match level.to_ascii_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "warning" | "error" => {
                    config.log_level = level.to_ascii_lowercase();
                }
                _ => problems.push(format!("{ENV_LOG_LEVEL}: unsupported level `{level}`")),
            }
        }
        if let Some(scope) = read(ENV_CONTEXT_SCOPE) {
            config.context_scope = scope;
        }
        if let Some(limit) = read(ENV_QUERY_LIMIT) {
            match limit.parse::<u32>() {
                Ok(value) if value > 0 => config.query_limit = value,
                _ => problems.push(format!(
                    "{ENV_QUERY_LIMIT}: expected a positive integer, got `{limit}`"
                )),
            }
        }

        if problems.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError { problems })
        }
    }

    /// SQLite database file inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoriaConfig, DB_FILE_NAME};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = MemoriaConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, MemoriaConfig::default());
        assert_eq!(config.db_path(), PathBuf::from(".data").join(DB_FILE_NAME));
        assert_eq!(config.context_scope, "global_context");
        assert_eq!(config.query_limit, 10);
    }

    #[test]
    fn data_dir_moves_default_log_dir() {
        let config = MemoriaConfig::from_lookup(lookup(&[("MEMORIA_DATA_DIR", "/srv/mem")])).unwrap();
        assert_eq!(config.log_dir, PathBuf::from("/srv/mem/logs"));

        let config = MemoriaConfig::from_lookup(lookup(&[
            ("MEMORIA_DATA_DIR", "/srv/mem"),
            ("MEMORIA_LOG_DIR", "/var/log/mem"),
        ]))
        .unwrap();
        assert_eq!(config.log_dir, PathBuf::from("/var/log/mem"));
    }

    #[test]
    fn invalid_values_are_reported_together() {
        let err = MemoriaConfig::from_lookup(lookup(&[
            ("MEMORIA_LOG_LEVEL", "loud"),
            ("MEMORIA_QUERY_LIMIT", "0"),
        ]))
        .unwrap_err();
        assert_eq!(err.problems.len(), 2);
        assert!(err.to_string().contains("MEMORIA_QUERY_LIMIT"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = MemoriaConfig::from_lookup(lookup(&[("MEMORIA_CONTEXT_SCOPE", "  ")])).unwrap();
        assert_eq!(config.context_scope, "global_context");
    }
}
