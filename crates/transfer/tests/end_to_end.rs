//! Full transfers over loopback TCP against a real puncher.

use std::net::SocketAddr;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use transhift_protocol::{FileInfo, Uid, Verification};
use transhift_puncher::{PuncherConfig, PuncherServer};
use transhift_security::{Identity, SecurityError};
use transhift_session::Role;
use transhift_transfer::checksum::checksum_bytes;
use transhift_transfer::{
    PendingDownload, TransferConfig, TransferError, TransferReport, download, net, peer_session,
    register_downloader, request_downloader, upload, uploader,
};

struct Puncher {
    addr: SocketAddr,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl Puncher {
    async fn start() -> Self {
        let config = PuncherConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            ..PuncherConfig::default()
        };
        let server = PuncherServer::bind(config, &Identity::generate().unwrap())
            .await
            .unwrap();
        let addr = server.local_addr();
        let cancel = server.cancel_token();
        let handle = tokio::spawn(async move {
            server.run().await.unwrap();
        });
        Self {
            addr,
            cancel,
            handle,
        }
    }

    fn client_config(&self) -> TransferConfig {
        TransferConfig {
            puncher_addr: self.addr.to_string(),
            handshake_timeout: Duration::from_secs(5),
            ..TransferConfig::default()
        }
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.handle.await.unwrap();
    }
}

/// Runs `download` in the background, storing into `dst`.
fn spawn_download(
    pending: PendingDownload,
    config: &TransferConfig,
    dst: &TempDir,
) -> tokio::task::JoinHandle<Result<TransferReport, TransferError>> {
    let config = config.clone();
    let dir = dst.path().to_path_buf();
    tokio::spawn(async move {
        let identity = Identity::generate().unwrap();
        download(pending, &config, &identity, &dir).await
    })
}

#[tokio::test]
async fn peers_are_introduced() {
    let puncher = Puncher::start().await;
    let config = puncher.client_config();

    let pending = register_downloader(&config).await.unwrap();
    let uid = pending.uid();
    let downloader_local = pending.local_addr();

    let waiting = tokio::spawn(async move { pending.wait_for_uploader().await });
    let downloader_addr = request_downloader(&config, uid).await.unwrap();
    let uploader_addr = waiting.await.unwrap().unwrap();

    assert_eq!(downloader_addr, downloader_local);
    assert!(uploader_addr.ip().is_loopback());

    puncher.stop().await;
}

#[tokio::test]
async fn file_arrives_verified() {
    let puncher = Puncher::start().await;
    let config = puncher.client_config();

    let src = TempDir::new().unwrap();
    let path = src.path().join("a.txt");
    std::fs::write(&path, b"hello").unwrap();
    let dst = TempDir::new().unwrap();

    let pending = register_downloader(&config).await.unwrap();
    let uid = pending.uid();
    let downloading = spawn_download(pending, &config, &dst);

    let sent = upload(&config, uid, &path).await.unwrap();
    let received = downloading.await.unwrap().unwrap();

    assert!(sent.is_verified());
    assert!(received.is_verified());
    assert_eq!(received.file.hash, checksum_bytes(b"hello"));
    assert_eq!(std::fs::read(dst.path().join("a.txt")).unwrap(), b"hello");

    puncher.stop().await;
}

#[tokio::test]
async fn multi_chunk_file_arrives_verified() {
    let puncher = Puncher::start().await;
    let config = puncher.client_config();

    let data: Vec<u8> = (0..100_000u32).map(|i| (i * 31 % 256) as u8).collect();
    let src = TempDir::new().unwrap();
    let path = src.path().join("data.bin");
    std::fs::write(&path, &data).unwrap();
    let dst = TempDir::new().unwrap();

    let pending = register_downloader(&config).await.unwrap();
    let uid = pending.uid();
    let downloading = spawn_download(pending, &config, &dst);

    upload(&config, uid, &path).await.unwrap();
    let received = downloading.await.unwrap().unwrap();

    assert!(received.is_verified());
    assert_eq!(received.file.size, data.len() as u64);
    assert_eq!(std::fs::read(dst.path().join("data.bin")).unwrap(), data);

    puncher.stop().await;
}

#[tokio::test]
async fn corrupted_content_is_reported_on_both_sides() {
    let puncher = Puncher::start().await;
    let config = puncher.client_config();
    let dst = TempDir::new().unwrap();

    let pending = register_downloader(&config).await.unwrap();
    let uid = pending.uid();
    let downloading = spawn_download(pending, &config, &dst);

    // Announce the digest of "hello" but stream "hellx".
    let peer = request_downloader(&config, uid).await.unwrap();
    let stream = net::connect_peer(peer, &config.backoff).await.unwrap();
    let stream = net::secure_connect(stream, config.handshake_timeout)
        .await
        .unwrap();
    let mut session = peer_session(Role::Uploader, stream).await.unwrap();
    let info = FileInfo {
        name: "a.txt".into(),
        size: 5,
        hash: checksum_bytes(b"hello"),
    };
    let sent = uploader::send(&mut session, info, &mut &b"hellx"[..])
        .await
        .unwrap();
    let received = downloading.await.unwrap().unwrap();

    assert_eq!(sent.verification, Verification::Bad);
    assert_eq!(received.verification, Verification::Bad);
    assert!(!dst.path().join("a.txt").exists());
    assert!(!dst.path().join("a.txt.part").exists());

    puncher.stop().await;
}

#[tokio::test]
async fn unknown_uid_ends_without_data_phase() {
    let puncher = Puncher::start().await;
    let config = puncher.client_config();

    let uid = Uid::random();
    let err = request_downloader(&config, uid).await.unwrap_err();
    assert!(matches!(err, TransferError::PeerNotFound(u) if u == uid));

    puncher.stop().await;
}

#[tokio::test]
async fn upload_of_missing_file_fails_before_contacting_puncher() {
    let dir = TempDir::new().unwrap();
    let config = TransferConfig {
        // Nothing listens here; the error must come from the file check.
        puncher_addr: "127.0.0.1:1".into(),
        ..TransferConfig::default()
    };

    let err = upload(&config, Uid::random(), &dir.path().join("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Io(_)));
}

#[tokio::test]
async fn plaintext_uploader_is_refused() {
    let puncher = Puncher::start().await;
    let config = puncher.client_config();
    let dst = TempDir::new().unwrap();

    let pending = register_downloader(&config).await.unwrap();
    let uid = pending.uid();
    let downloading = spawn_download(pending, &config, &dst);

    let peer = request_downloader(&config, uid).await.unwrap();
    let stream = net::connect_peer(peer, &config.backoff).await.unwrap();
    let session = peer_session(Role::Uploader, stream).await.unwrap();
    drop(session);

    let err = downloading.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        TransferError::Tls(SecurityError::Handshake(_) | SecurityError::HandshakeTimeout)
    ));
    assert!(std::fs::read_dir(dst.path()).unwrap().next().is_none());

    puncher.stop().await;
}
