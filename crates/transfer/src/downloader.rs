//! Downloader side of the data phase.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use transhift_protocol::{FileInfo, Message, Packet, Verification};
use transhift_session::{Session, State};

use crate::checksum::{finalize, hash_hex};
use crate::types::TransferReport;
use crate::validation::validate_file_name;
use crate::TransferError;

/// Waits for `UploaderReady` and the file metadata.
pub async fn receive_header(session: &mut Session) -> Result<FileInfo, TransferError> {
    session.transition(State::AwaitUploaderReady);
    session.expect(Packet::UploaderReady).await?;

    session.transition(State::AwaitFileName);
    let msg = session.expect(Packet::FileName).await?;
    let name = session.body(msg.text().map(str::to_owned)).await?;
    if let Err(e) = validate_file_name(&name) {
        session.report_protocol_error(&e.to_string()).await;
        return Err(e);
    }

    session.transition(State::AwaitFileSize);
    let msg = session.expect(Packet::FileSize).await?;
    let size = session.body(msg.file_size_value()).await?;

    session.transition(State::AwaitFileHash);
    let msg = session.expect(Packet::FileHash).await?;
    let hash = session.body(msg.file_hash_value()).await?;

    let info = FileInfo { name, size, hash };
    debug!(name = %info.name, size, hash = %hash_hex(&hash), "file announced");
    session.set_file_info(info.clone());
    Ok(info)
}

/// Receives `info.size` bytes of content into `sink`, hashing on the fly,
/// then answers with the verification result.
pub async fn receive_body<W>(
    session: &mut Session,
    info: &FileInfo,
    sink: &mut W,
) -> Result<Verification, TransferError>
where
    W: AsyncWrite + Unpin,
{
    session.transition(State::ReceiveBytes);
    let mut hasher = Sha256::new();
    let mut remaining = info.size;

    while remaining > 0 {
        let msg = session.expect(Packet::FileChunk).await?;
        let len = msg.body.len() as u64;
        if len > remaining {
            let err = session
                .violation(format!("chunk of {len} bytes exceeds the {remaining} bytes left"))
                .await;
            return Err(err.into());
        }

        hasher.update(&msg.body);
        if let Err(e) = sink.write_all(&msg.body).await {
            session
                .report_internal_error(&format!("cannot store file: {e}"))
                .await;
            return Err(e.into());
        }
        remaining -= len;
    }

    if let Err(e) = sink.flush().await {
        session
            .report_internal_error(&format!("cannot store file: {e}"))
            .await;
        return Err(e.into());
    }

    session.transition(State::CompareHash);
    let verification = if finalize(hasher) == info.hash {
        Verification::Good
    } else {
        Verification::Bad
    };
    session.send(Message::verification(verification)).await?;
    session.set_verification(verification);
    session.transition(State::Terminal);
    Ok(verification)
}

/// Runs the whole downloader data phase into `sink`.
pub async fn receive<W>(session: &mut Session, sink: &mut W) -> Result<TransferReport, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let file = receive_header(session).await?;
    let verification = receive_body(session, &file, sink).await?;
    Ok(TransferReport { file, verification })
}

/// Runs the downloader data phase into `dir`.
///
/// Content goes to `<dir>/<name>.part` and is renamed to `<dir>/<name>` once
/// the digests match. On a mismatch or any failure the partial file is
/// removed.
pub async fn receive_file(
    session: &mut Session,
    dir: &Path,
) -> Result<TransferReport, TransferError> {
    let file = receive_header(session).await?;
    let final_path = dir.join(&file.name);
    let part_path = part_path(dir, &file.name);

    let created = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::File::create(&part_path).await
    }
    .await;
    let mut sink = match created {
        Ok(sink) => sink,
        Err(e) => {
            session
                .report_internal_error(&format!("cannot create file: {e}"))
                .await;
            return Err(e.into());
        }
    };

    let res = receive_body(session, &file, &mut sink).await;
    drop(sink);

    match res {
        Ok(Verification::Good) => {
            tokio::fs::rename(&part_path, &final_path).await?;
            info!(path = %final_path.display(), size = file.size, "file received");
            Ok(TransferReport {
                file,
                verification: Verification::Good,
            })
        }
        Ok(Verification::Bad) => {
            warn!(name = %file.name, "checksum mismatch, discarding file");
            discard_part(&part_path).await;
            Ok(TransferReport {
                file,
                verification: Verification::Bad,
            })
        }
        Err(e) => {
            discard_part(&part_path).await;
            Err(e)
        }
    }
}

fn part_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.part"))
}

/// Removes a partial file, returning whether it is gone. A failure is only
/// logged; the transfer outcome stands either way.
async fn discard_part(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot remove partial file");
            false
        }
    }
}
