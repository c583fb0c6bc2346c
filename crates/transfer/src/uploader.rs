//! Uploader side of the data phase.

use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, info, warn};

use transhift_protocol::{FileInfo, MAX_VARIABLE_BODY, Message, Packet, Verification};
use transhift_session::{Session, SessionError, State};

use crate::checksum::{hash_file, hash_hex};
use crate::types::TransferReport;
use crate::validation::validate_file_name;
use crate::TransferError;

/// Builds the [`FileInfo`] for the file at `path`: its final path
/// component, size and SHA-256.
pub async fn describe_file(path: &Path) -> Result<FileInfo, TransferError> {
    let meta = tokio::fs::metadata(path).await?;
    if !meta.is_file() {
        return Err(TransferError::NotAFile(path.to_path_buf()));
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))?;
    validate_file_name(name)?;
    if name.len() > MAX_VARIABLE_BODY {
        return Err(TransferError::InvalidFileName(format!(
            "name longer than {MAX_VARIABLE_BODY} bytes: {name}"
        )));
    }

    let (size, hash) = hash_file(path).await?;
    debug!(name, size, hash = %hash_hex(&hash), "file described");
    Ok(FileInfo {
        name: name.to_string(),
        size,
        hash,
    })
}

/// Opens the data phase and announces the file metadata.
pub async fn send_header(session: &mut Session, info: &FileInfo) -> Result<(), TransferError> {
    session.transition(State::SendUploaderReady);
    session
        .send(Message::bodiless(Packet::UploaderReady))
        .await?;

    session.transition(State::SendFileName);
    let name = Message::file_name(&info.name).map_err(SessionError::from)?;
    session.send(name).await?;

    session.transition(State::SendFileSize);
    session.send(Message::file_size(info.size)).await?;

    session.transition(State::SendFileHash);
    session.send(Message::file_hash(&info.hash)).await?;
    Ok(())
}

/// Streams exactly `info.size` bytes from `source` as `FileChunk`s, then
/// waits for the downloader's verdict.
pub async fn send_body<R>(
    session: &mut Session,
    info: &FileInfo,
    source: &mut R,
) -> Result<Verification, TransferError>
where
    R: AsyncRead + Unpin,
{
    session.transition(State::SendBytes);
    let mut buf = [0u8; MAX_VARIABLE_BODY];
    let mut remaining = info.size;

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = match source.read(&mut buf[..want]).await {
            Ok(0) => {
                session.report_internal_error("file shrank during upload").await;
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            Ok(n) => n,
            Err(e) => {
                session
                    .report_internal_error(&format!("cannot read file: {e}"))
                    .await;
                return Err(e.into());
            }
        };

        let chunk = Message::file_chunk(&buf[..n]).map_err(SessionError::from)?;
        session.send(chunk).await?;
        remaining -= n as u64;
    }

    session.transition(State::AwaitVerification);
    let msg = session.expect(Packet::Verification).await?;
    let verification = session.body(msg.verification_value()).await?;
    session.set_verification(verification);
    session.transition(State::Terminal);
    Ok(verification)
}

/// Runs the whole uploader data phase, reading content from `source`.
pub async fn send<R>(
    session: &mut Session,
    info: FileInfo,
    source: &mut R,
) -> Result<TransferReport, TransferError>
where
    R: AsyncRead + Unpin,
{
    send_header(session, &info).await?;
    let verification = send_body(session, &info, source).await?;
    session.set_file_info(info.clone());

    if verification.is_good() {
        info!(name = %info.name, size = info.size, "file delivered and verified");
    } else {
        warn!(name = %info.name, "downloader reported a checksum mismatch");
    }
    Ok(TransferReport {
        file: info,
        verification,
    })
}

/// Runs the uploader data phase for the file at `path`.
pub async fn send_file(session: &mut Session, path: &Path) -> Result<TransferReport, TransferError> {
    let info = describe_file(path).await?;
    let file = tokio::fs::File::open(path).await?;
    send(session, info, &mut BufReader::new(file)).await
}
