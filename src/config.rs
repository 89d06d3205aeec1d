/*!
Application configuration.

Read once at startup from `config.toml` in the platform config directory, or from the file
named by `TRACEVIS_CONFIG`. A missing file means defaults; a broken one is reported and
also falls back to defaults so the GUI still starts.
*/

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::network::{command::CommandPolicy, hop::DEFAULT_TIMEOUT_SENTINEL, hop::TimeoutSentinel};

pub const CONFIG_ENV: &str = "TRACEVIS_CONFIG";
const APP_DIR: &str = "traceroute-visualization";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    pub request_timeout_secs: u64,
    pub timeout_sentinel: String,
    pub allowed_commands: Vec<String>,
    pub max_command_len: usize,
    pub max_batch_targets: usize,
    /// Where the session snapshot is kept. Defaults to the platform data directory.
    pub snapshot_path: Option<PathBuf>,
    pub autosave_interval_secs: u64,
    /// Upper bound on history rows shown; 0 shows everything.
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let policy = CommandPolicy::default();
        Self {
            backend_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 120,
            timeout_sentinel: DEFAULT_TIMEOUT_SENTINEL.to_string(),
            allowed_commands: policy.allowed_prefixes,
            max_command_len: policy.max_len,
            max_batch_targets: policy.max_batch_targets,
            snapshot_path: None,
            autosave_interval_secs: 60,
            history_limit: 0,
        }
    }
}

impl AppConfig {
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Loads the config file if there is one, logging and ignoring anything unusable.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            warn!("could not determine config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => {
                info!(path = %path.display(), "loaded config");
                config
            }
            Err(e) => {
                warn!(error = %e, "ignoring config file");
                Self::default()
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    pub fn sentinel(&self) -> TimeoutSentinel {
        TimeoutSentinel::new(self.timeout_sentinel.as_str())
    }

    pub fn command_policy(&self) -> CommandPolicy {
        CommandPolicy {
            allowed_prefixes: self.allowed_commands.clone(),
            max_len: self.max_command_len,
            max_batch_targets: self.max_batch_targets,
        }
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.snapshot_path
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_DIR).join("session.json")))
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
backend_url = "http://diag.lan:8080"
timeout_sentinel = "Timeout"
max_batch_targets = 10
"#,
            Path::new("config.toml"),
        )
        .expect("Failed to parse config");
        assert_eq!(config.backend_url, "http://diag.lan:8080");
        assert_eq!(config.sentinel().as_str(), "Timeout");
        assert_eq!(config.command_policy().max_batch_targets, 10);
        assert_eq!(config.max_command_len, 1024);
        assert_eq!(config.autosave_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let err = AppConfig::from_toml("backend_url = [", Path::new("broken.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_explicit_snapshot_path_wins() {
        let config = AppConfig {
            snapshot_path: Some(PathBuf::from("/tmp/tracevis.json")),
            ..Default::default()
        };
        assert_eq!(config.snapshot_path(), Some(PathBuf::from("/tmp/tracevis.json")));
    }
}
