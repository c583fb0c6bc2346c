//! Persisted settings, stored as TOML in `<app dir>/config.toml`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AppDir, StorageError};

/// transhift configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// `host:port` of the puncher clients connect to.
    #[serde(default = "default_puncher_addr")]
    pub puncher_addr: String,

    /// Address the puncher listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Where downloads are stored. Empty means the current directory.
    #[serde(default)]
    pub download_dir: PathBuf,

    /// Seconds between pings to a pending downloader.
    #[serde(default = "default_ping_period")]
    pub ping_period_secs: u64,

    /// Seconds of silence before a pending downloader is dropped.
    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,

    /// Seconds a downloader may wait for an uploader.
    #[serde(default = "default_pending_timeout")]
    pub pending_timeout_secs: u64,

    /// Seconds each handshake step may wait for the other side.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Attempts the uploader makes to reach the downloader directly.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_puncher_addr() -> String {
    "127.0.0.1:50977".into()
}

fn default_listen_addr() -> String {
    "0.0.0.0:50977".into()
}

fn default_ping_period() -> u64 {
    5
}

fn default_pong_wait() -> u64 {
    30
}

fn default_pending_timeout() -> u64 {
    600
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_connect_attempts() -> u32 {
    8
}

impl Default for Config {
    fn default() -> Self {
        Self {
            puncher_addr: default_puncher_addr(),
            listen_addr: default_listen_addr(),
            download_dir: PathBuf::new(),
            ping_period_secs: default_ping_period(),
            pong_wait_secs: default_pong_wait(),
            pending_timeout_secs: default_pending_timeout(),
            handshake_timeout_secs: default_handshake_timeout(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

impl Config {
    /// Loads `config.toml` from `dir`, writing the defaults first if the
    /// file does not exist yet.
    pub fn load(dir: &AppDir) -> Result<Self, StorageError> {
        let path = dir.config_path();

        if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| StorageError::io(&path, e))?;
            toml::from_str(&content).map_err(|source| StorageError::Parse { path, source })
        } else {
            let config = Config::default();
            config.save(dir)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `dir`, readable by the owner only.
    pub fn save(&self, dir: &AppDir) -> Result<(), StorageError> {
        dir.ensure()?;
        let path = dir.config_path();

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content).map_err(|e| StorageError::io(&path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| StorageError::io(&path, e))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
