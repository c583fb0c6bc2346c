//! SHA-256 helpers.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use transhift_protocol::FileHash;

use crate::TransferError;

/// SHA-256 of `data`.
pub fn checksum_bytes(data: &[u8]) -> FileHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    finalize(hasher)
}

/// Consumes an incremental hasher into a [`FileHash`].
pub fn finalize(hasher: Sha256) -> FileHash {
    let mut hash = FileHash::default();
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// Size and SHA-256 of the file at `path`.
pub async fn hash_file(path: &Path) -> Result<(u64, FileHash), TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, finalize(hasher)))
}

/// Hex form of a digest, for logs and the CLI.
pub fn hash_hex(hash: &FileHash) -> String {
    hex::encode(hash)
}
