//! Subcommand bodies.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use transhift_protocol::Uid;
use transhift_puncher::{PuncherConfig, PuncherServer};
use transhift_security::{CERT_FILE, Identity, KEY_FILE};
use transhift_storage::{AppDir, Config};
use transhift_transfer::{BackoffConfig, TransferConfig, TransferReport};

fn puncher_config(config: &Config) -> anyhow::Result<PuncherConfig> {
    let listen_addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {:?}", config.listen_addr))?;
    Ok(PuncherConfig {
        listen_addr,
        ping_period: config.ping_period(),
        pong_wait: config.pong_wait(),
        pending_timeout: config.pending_timeout(),
        handshake_timeout: config.handshake_timeout(),
    })
}

fn transfer_config(config: &Config) -> TransferConfig {
    TransferConfig {
        puncher_addr: config.puncher_addr.clone(),
        handshake_timeout: config.handshake_timeout(),
        backoff: BackoffConfig {
            attempts: config.connect_attempts.max(1),
            ..BackoffConfig::default()
        },
    }
}

fn download_dir(config: &Config) -> PathBuf {
    if config.download_dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        config.download_dir.clone()
    }
}

/// TLS identity kept in the app directory, created on first use.
fn identity(app_dir: &AppDir) -> anyhow::Result<Identity> {
    transhift_security::certificate(app_dir, KEY_FILE, CERT_FILE).with_context(|| {
        format!("cannot load TLS identity from {}", app_dir.path().display())
    })
}

fn verified(report: TransferReport) -> anyhow::Result<()> {
    if report.is_verified() {
        Ok(())
    } else {
        anyhow::bail!("checksum mismatch for {}", report.file.name)
    }
}

/// Runs the puncher until Ctrl-C.
pub async fn puncher(config: &Config, app_dir: &AppDir) -> anyhow::Result<()> {
    let identity = identity(app_dir)?;
    let server = PuncherServer::bind(puncher_config(config)?, &identity).await?;
    info!(addr = %server.local_addr(), "puncher listening");

    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        cancel.cancel();
    });

    server.run().await?;
    info!("puncher shut down cleanly");
    Ok(())
}

/// Registers with the puncher, prints the UID and receives one file.
pub async fn download(config: &Config, app_dir: &AppDir) -> anyhow::Result<()> {
    let transfer = transfer_config(config);
    let dir = download_dir(config);
    let identity = identity(app_dir)?;

    let pending = transhift_transfer::register_downloader(&transfer)
        .await
        .context("cannot register with puncher")?;
    println!("{}", pending.uid());

    let report = transhift_transfer::download(pending, &transfer, &identity, &dir).await?;
    println!(
        "received {} ({} bytes)",
        dir.join(&report.file.name).display(),
        report.file.size
    );
    verified(report)
}

/// Sends `file` to the downloader holding `uid`.
pub async fn upload(config: &Config, uid: Uid, file: &Path) -> anyhow::Result<()> {
    let transfer = transfer_config(config);
    let report = transhift_transfer::upload(&transfer, uid, file)
        .await
        .with_context(|| format!("upload of {} failed", file.display()))?;
    println!("sent {} ({} bytes)", report.file.name, report.file.size);
    verified(report)
}
