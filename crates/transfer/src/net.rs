//! Sockets for the puncher connection and the direct peer hand-off.
//!
//! The downloader reaches the puncher from a socket with address reuse
//! enabled, then listens on that same local port for the uploader, so the
//! mapping a NAT created for the puncher connection can carry the peer
//! connection too.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio_rustls::{client, server};
use tracing::{debug, info};

use transhift_security::Identity;

use crate::TransferError;
use crate::types::BackoffConfig;

/// Resolves a `host:port` string to its first address.
pub async fn resolve(addr: &str) -> Result<SocketAddr, TransferError> {
    lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| TransferError::Resolve(addr.to_string()))
}

fn reusable_socket(addr: &SocketAddr) -> std::io::Result<TcpSocket> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    Ok(socket)
}

/// Connects to `addr` from an OS-assigned local port that can later be
/// reused by [`accept_peer`].
pub async fn connect_reusable(addr: SocketAddr) -> Result<TcpStream, TransferError> {
    let socket = reusable_socket(&addr)?;
    let unspecified = match addr.ip() {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    socket.bind(SocketAddr::new(unspecified, 0))?;
    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Listens on the port of `local_addr` and accepts one peer connection.
pub async fn accept_peer(
    local_addr: SocketAddr,
    timeout: Duration,
) -> Result<(TcpStream, SocketAddr), TransferError> {
    let listen_addr = match local_addr.ip() {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), local_addr.port()),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), local_addr.port()),
    };
    let socket = reusable_socket(&listen_addr)?;
    socket.bind(listen_addr)?;
    let listener = socket.listen(1)?;
    debug!(%listen_addr, "waiting for peer");

    match tokio::time::timeout(timeout, listener.accept()).await {
        Ok(Ok((stream, peer))) => {
            info!(%peer, "peer connected");
            stream.set_nodelay(true)?;
            Ok((stream, peer))
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(TransferError::Timeout("peer connection")),
    }
}

/// Connects to an introduced peer, retrying with exponential backoff while
/// the peer is not yet listening.
pub async fn connect_peer(
    addr: SocketAddr,
    backoff: &BackoffConfig,
) -> Result<TcpStream, TransferError> {
    let attempts = backoff.attempts.max(1);
    let mut attempt = 1;
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                info!(peer = %addr, attempt, "connected to peer");
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) if attempt < attempts => {
                let delay = backoff.delay_for_attempt(attempt);
                debug!(peer = %addr, attempt, ?delay, "peer connect failed: {e}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(TransferError::ConnectFailed {
                    addr,
                    attempts,
                    source: e,
                });
            }
        }
    }
}

/// Runs the client side of the TLS handshake on a fresh connection.
pub async fn secure_connect(
    stream: TcpStream,
    timeout: Duration,
) -> Result<client::TlsStream<TcpStream>, TransferError> {
    let connector = transhift_security::connector()?;
    Ok(transhift_security::connect(&connector, stream, timeout).await?)
}

/// Runs the server side of the TLS handshake, presenting `identity`.
pub async fn secure_accept(
    stream: TcpStream,
    identity: &Identity,
    timeout: Duration,
) -> Result<server::TlsStream<TcpStream>, TransferError> {
    let acceptor = transhift_security::acceptor(identity)?;
    Ok(transhift_security::accept(&acceptor, stream, timeout).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn accept_reuses_local_port() {
        let puncher = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let puncher_addr = puncher.local_addr().unwrap();

        let stream = connect_reusable(puncher_addr).await.unwrap();
        let _accepted = puncher.accept().await.unwrap();
        let local = stream.local_addr().unwrap();

        // Listen on the port while the puncher connection is still open.
        let accept = tokio::spawn(accept_peer(local, Duration::from_secs(5)));
        let peer_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port());
        let _client = connect_peer(peer_addr, &BackoffConfig::default())
            .await
            .unwrap();

        let (_stream, from) = accept.await.unwrap().unwrap();
        assert_eq!(from.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn accept_times_out() {
        let err = accept_peer("127.0.0.1:0".parse().unwrap(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Timeout(_)));
    }

    #[tokio::test]
    async fn connect_gives_up_after_attempts() {
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let backoff = BackoffConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
            attempts: 3,
        };
        let err = connect_peer(addr, &backoff).await.unwrap_err();
        assert!(matches!(err, TransferError::ConnectFailed { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn resolve_localhost() {
        let addr = resolve("127.0.0.1:50977").await.unwrap();
        assert_eq!(addr.port(), 50977);
    }
}
