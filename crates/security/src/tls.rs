//! TLS acceptor and connector setup.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{TlsAcceptor, TlsConnector, client, server};
use tracing::trace;

use crate::SecurityError;
use crate::identity::Identity;

/// Name in every transhift certificate and in every client hello.
pub const SERVER_NAME: &str = "transhift";

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Acceptor presenting `identity`.
pub fn acceptor(identity: &Identity) -> Result<TlsAcceptor, SecurityError> {
    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(vec![identity.cert().clone()], identity.key())?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Connector that accepts any peer certificate. Handshake signatures are
/// still checked against the presented certificate.
pub fn connector() -> Result<TlsConnector, SecurityError> {
    let provider = provider();
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(SelfSignedVerifier { provider }))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Runs the server side of the handshake on `stream`, bounded by `timeout`.
pub async fn accept<S>(
    acceptor: &TlsAcceptor,
    stream: S,
    timeout: Duration,
) -> Result<server::TlsStream<S>, SecurityError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, acceptor.accept(stream)).await {
        Ok(Ok(stream)) => {
            trace!("tls accepted");
            Ok(stream)
        }
        Ok(Err(e)) => Err(SecurityError::Handshake(e)),
        Err(_) => Err(SecurityError::HandshakeTimeout),
    }
}

/// Runs the client side of the handshake on `stream`, bounded by `timeout`.
pub async fn connect<S>(
    connector: &TlsConnector,
    stream: S,
    timeout: Duration,
) -> Result<client::TlsStream<S>, SecurityError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let name = ServerName::try_from(SERVER_NAME)
        .map_err(|e| SecurityError::Handshake(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
    match tokio::time::timeout(timeout, connector.connect(name, stream)).await {
        Ok(Ok(stream)) => {
            trace!("tls connected");
            Ok(stream)
        }
        Ok(Err(e)) => Err(SecurityError::Handshake(e)),
        Err(_) => Err(SecurityError::HandshakeTimeout),
    }
}

/// Certificates are self-signed, so there is no chain to validate.
#[derive(Debug)]
struct SelfSignedVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for SelfSignedVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
