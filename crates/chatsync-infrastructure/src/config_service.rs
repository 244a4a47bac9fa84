//! Configuration loading.
//!
//! Reads `config.toml` (a missing file means defaults) and applies
//! environment overrides on top.

use std::path::{Path, PathBuf};

use chatsync_core::config::ClientConfig;
use thiserror::Error;

use crate::paths::{ChatSyncPaths, PathError};

/// Overrides `ClientConfig::api_base`.
pub const ENV_API_BASE: &str = "CHATSYNC_API_BASE";
/// Overrides `ClientConfig::force_local` (`1`, `true`, `yes`, `on`).
pub const ENV_FORCE_LOCAL: &str = "CHATSYNC_FORCE_LOCAL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
}

impl ConfigService {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Service reading the platform config file.
    pub fn from_paths(paths: &ChatSyncPaths) -> Self {
        Self::new(paths.config_file())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File contents followed by process environment overrides.
    pub fn load(&self) -> Result<ClientConfig, ConfigError> {
        let config = self.load_file()?;
        Ok(apply_overrides(config, |key| std::env::var(key).ok()))
    }

    fn load_file(&self) -> Result<ClientConfig, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no config file, using defaults");
                return Ok(ClientConfig::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

/// Applies `CHATSYNC_*` overrides looked up through `env`.
pub fn apply_overrides<F>(mut config: ClientConfig, env: F) -> ClientConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(base) = env(ENV_API_BASE) {
        let base = base.trim();
        config.api_base = (!base.is_empty()).then(|| base.to_string());
    }
    if let Some(flag) = env(ENV_FORCE_LOCAL) {
        config.force_local = matches!(
            flag.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );
    }
    config
}
