//! TLS for transhift connections.
//!
//! Every connection (client to puncher, uploader to downloader) is wrapped in
//! TLS before the connection pump takes over. The accepting side presents a
//! self-signed certificate kept in the app directory ([`certificate`]); there
//! is no PKI, so connecting sides accept any certificate and rely on TLS for
//! confidentiality and integrity of the stream.

mod identity;
mod tls;

use std::path::{Path, PathBuf};

use transhift_storage::StorageError;

pub use identity::{CERT_FILE, Identity, KEY_FILE, certificate};
pub use tls::{SERVER_NAME, accept, acceptor, connect, connector};

/// Errors produced by the security crate.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cannot generate key or certificate: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("invalid PEM in {}: {reason}", path.display())]
    InvalidPem { path: PathBuf, reason: String },

    #[error("TLS configuration error: {0}")]
    Config(#[from] rustls::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("TLS handshake timed out")]
    HandshakeTimeout,
}

impl SecurityError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
