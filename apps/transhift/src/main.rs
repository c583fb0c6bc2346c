//! transhift command-line entry point.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use transhift_protocol::Uid;
use transhift_storage::{AppDir, Config};

#[derive(Debug, Parser)]
#[command(name = "transhift")]
#[command(about = "Peer-to-peer file transfer through a rendezvous puncher", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (default: ~/.transhift)
    #[arg(long, global = true, value_name = "DIR")]
    app_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the rendezvous server
    Puncher {
        /// Address to listen on
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },
    /// Wait for a file; prints the UID to give the uploader
    Download {
        /// Puncher address
        #[arg(long, value_name = "ADDR")]
        puncher: Option<String>,

        /// Directory to store the file in
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Send a file to the downloader holding UID
    Upload {
        /// UID printed by the downloader
        uid: Uid,

        /// File to send
        file: PathBuf,

        /// Puncher address
        #[arg(long, value_name = "ADDR")]
        puncher: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let app_dir = match cli.app_dir {
        Some(path) => AppDir::new(path),
        None => AppDir::default_location()?,
    };
    let mut config = Config::load(&app_dir)?;
    tracing::debug!(path = %app_dir.config_path().display(), "configuration loaded");

    match cli.command {
        Command::Puncher { listen } => {
            if let Some(addr) = listen {
                config.listen_addr = addr;
            }
            commands::puncher(&config, &app_dir).await
        }
        Command::Download { puncher, dir } => {
            if let Some(addr) = puncher {
                config.puncher_addr = addr;
            }
            if let Some(dir) = dir {
                config.download_dir = dir;
            }
            commands::download(&config, &app_dir).await
        }
        Command::Upload { uid, file, puncher } => {
            if let Some(addr) = puncher {
                config.puncher_addr = addr;
            }
            commands::upload(&config, uid, &file).await
        }
    }
}
