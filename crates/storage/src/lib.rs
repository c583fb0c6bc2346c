//! Application directory and persisted configuration.
//!
//! Everything transhift keeps on disk lives under one directory, `~/.transhift`
//! by default:
//! - `config.toml`: client and puncher settings ([`Config`])

mod config;

use std::path::{Path, PathBuf};

pub use config::Config;

/// Name of the configuration file inside the app directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Errors produced by the storage crate.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("cannot locate home directory; pass an explicit app directory")]
    NoHome,
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directory holding transhift's persistent state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDir {
    root: PathBuf,
}

impl AppDir {
    /// Uses `root` as the app directory. Nothing is created until
    /// [`AppDir::ensure`] runs.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.transhift` (or `%USERPROFILE%\.transhift` on Windows).
    pub fn default_location() -> Result<Self, StorageError> {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .filter(|h| !h.is_empty())
            .ok_or(StorageError::NoHome)?;
        Ok(Self::new(PathBuf::from(home).join(".transhift")))
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Creates the directory if needed. On Unix it is restricted to the
    /// owner.
    pub fn ensure(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root).map_err(|e| StorageError::io(&self.root, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.root, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| StorageError::io(&self.root, e))?;
        }

        Ok(())
    }
}
