//! Unified path management for chatsync files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/chatsync/          # Config directory
//! └── config.toml              # Client configuration
//!
//! ~/.local/share/chatsync/     # Data directory
//! └── store.toml               # Durable store (identities, session, local authority)
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

const APP_DIR: &str = "chatsync";

#[derive(Debug, Error)]
pub enum PathError {
    #[error("cannot determine the {0} directory")]
    DirNotFound(&'static str),
}

/// Resolved locations of the chatsync config and data files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSyncPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl ChatSyncPaths {
    /// Platform directories (XDG on Linux, the native locations elsewhere).
    pub fn resolve() -> Result<Self, PathError> {
        let config_dir = dirs::config_dir().ok_or(PathError::DirNotFound("config"))?;
        let data_dir = dirs::data_dir().ok_or(PathError::DirNotFound("data"))?;
        Ok(Self {
            config_dir: config_dir.join(APP_DIR),
            data_dir: data_dir.join(APP_DIR),
        })
    }

    /// Both directories under one root, for tests and portable setups.
    pub fn under(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn store_file(&self) -> PathBuf {
        self.data_dir.join("store.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_root() {
        let paths = ChatSyncPaths::under(Path::new("/tmp/chatsync-test"));
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/tmp/chatsync-test/config/config.toml")
        );
        assert_eq!(
            paths.store_file(),
            PathBuf::from("/tmp/chatsync-test/data/store.toml")
        );
    }
}
