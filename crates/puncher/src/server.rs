//! Puncher TCP server.
//!
//! Accepts client connections, secures each with TLS and runs one handshake
//! task per connection. Downloaders wait in the shared [`RendezvousTable`]
//! until an uploader asks for their UID.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use transhift_security::Identity;
use transhift_session::SessionError;

use crate::PuncherError;
use crate::handler::{self, Context, PendingDownloader};
use crate::rendezvous::RendezvousTable;

/// Default puncher port.
pub const DEFAULT_PORT: u16 = 50977;

/// Puncher configuration.
#[derive(Debug, Clone)]
pub struct PuncherConfig {
    pub listen_addr: SocketAddr,
    /// How often pending downloaders are pinged.
    pub ping_period: Duration,
    /// Silence after which a pending downloader is considered gone.
    pub pong_wait: Duration,
    /// How long a downloader may wait for an uploader.
    pub pending_timeout: Duration,
    /// Bound on each handshake step that waits for the client.
    pub handshake_timeout: Duration,
}

impl Default for PuncherConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            ping_period: Duration::from_secs(5),
            pong_wait: Duration::from_secs(30),
            pending_timeout: Duration::from_secs(600),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl PuncherConfig {
    /// Rejects settings the keepalive and expiry timers cannot run with.
    pub fn validate(&self) -> Result<(), PuncherError> {
        if self.ping_period.is_zero() {
            return Err(PuncherError::InvalidConfig("ping period must be non-zero".into()));
        }
        if self.pong_wait.is_zero() {
            return Err(PuncherError::InvalidConfig("pong wait must be non-zero".into()));
        }
        Ok(())
    }
}

/// The rendezvous server.
pub struct PuncherServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    acceptor: TlsAcceptor,
    ctx: Arc<Context>,
}

impl PuncherServer {
    /// Binds the listener. Use port 0 for an OS-assigned port. Clients are
    /// served over TLS with `identity`.
    pub async fn bind(config: PuncherConfig, identity: &Identity) -> Result<Self, PuncherError> {
        config.validate()?;
        let acceptor = transhift_security::acceptor(identity)?;
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("puncher listening on {local_addr}");

        Ok(Self {
            listener,
            local_addr,
            acceptor,
            ctx: Arc::new(Context {
                config,
                table: Arc::new(RendezvousTable::new()),
                cancel: CancellationToken::new(),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    pub fn table(&self) -> Arc<RendezvousTable<PendingDownloader>> {
        self.ctx.table.clone()
    }

    /// Accepts connections until cancelled, then halts pending downloaders
    /// and waits for every connection task to finish.
    pub async fn run(self) -> Result<(), PuncherError> {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.ctx.cancel.cancelled() => {
                    info!("puncher shutting down");
                    break;
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let _ = stream.set_nodelay(true);
                            let ctx = self.ctx.clone();
                            let acceptor = self.acceptor.clone();
                            tasks.spawn(async move {
                                let timeout = ctx.config.handshake_timeout;
                                let res = match transhift_security::accept(&acceptor, stream, timeout).await {
                                    Ok(stream) => handler::handle_connection(stream, peer, ctx).await,
                                    Err(e) => Err(e.into()),
                                };
                                if let Err(e) = res {
                                    log_connection_error(peer, &e);
                                }
                                info!(%peer, "connection closed");
                            });
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
            }
        }

        drop(self.listener);
        while tasks.join_next().await.is_some() {}
        Ok(())
    }
}

fn log_connection_error(peer: SocketAddr, e: &PuncherError) {
    match e {
        PuncherError::Session(SessionError::Connection(c)) if c.is_closed() => {
            info!(%peer, "client disconnected");
        }
        PuncherError::Session(SessionError::Halted(reason)) => {
            info!(%peer, "client halted: {reason}");
        }
        _ => warn!(%peer, "connection error: {e}"),
    }
}
