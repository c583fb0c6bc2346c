//! Private key and self-signed certificate, generated once and kept in the
//! app directory.

use std::path::Path;

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair, SerialNumber,
};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::{debug, info};

use transhift_storage::AppDir;

use crate::SecurityError;
use crate::tls::SERVER_NAME;

/// Default file name of the private key inside the app directory.
pub const KEY_FILE: &str = "key.pem";

/// Default file name of the certificate inside the app directory.
pub const CERT_FILE: &str = "cert.pem";

const SERIAL_NUMBER: u64 = 50977;

/// Certificate and private key presented by the accepting side of a
/// connection.
#[derive(Debug)]
pub struct Identity {
    cert: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        Self {
            cert: self.cert.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl Identity {
    /// Generates a fresh, unpersisted identity.
    pub fn generate() -> Result<Self, SecurityError> {
        let key_pair = KeyPair::generate()?;
        let cert = self_signed(&key_pair)?;
        Ok(Self::from_parts(CertificateDer::from(cert.der().to_vec()), &key_pair))
    }

    pub fn cert(&self) -> &CertificateDer<'static> {
        &self.cert
    }

    pub(crate) fn key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }

    fn from_parts(cert: CertificateDer<'static>, key_pair: &KeyPair) -> Self {
        Self {
            cert,
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        }
    }
}

/// Loads the identity stored as `key_name`/`cert_name` in `dir`, generating
/// whichever part is missing. A newly generated key always gets a new
/// certificate. Both files are readable by the owner only.
pub fn certificate(
    dir: &AppDir,
    key_name: &str,
    cert_name: &str,
) -> Result<Identity, SecurityError> {
    dir.ensure()?;
    let key_path = dir.path().join(key_name);
    let cert_path = dir.path().join(cert_name);

    let (key_pair, key_generated) = if key_path.exists() {
        let pem = read(&key_path)?;
        let key_pair = KeyPair::from_pem(&pem).map_err(|e| SecurityError::InvalidPem {
            path: key_path.clone(),
            reason: e.to_string(),
        })?;
        (key_pair, false)
    } else {
        let key_pair = KeyPair::generate()?;
        write_private(&key_path, &key_pair.serialize_pem())?;
        info!(path = %key_path.display(), "generated private key");
        (key_pair, true)
    };

    let cert = if cert_path.exists() && !key_generated {
        let pem = read(&cert_path)?;
        CertificateDer::from_pem_slice(pem.as_bytes()).map_err(|e| SecurityError::InvalidPem {
            path: cert_path.clone(),
            reason: e.to_string(),
        })?
    } else {
        let cert = self_signed(&key_pair)?;
        write_private(&cert_path, &cert.pem())?;
        info!(path = %cert_path.display(), "generated certificate");
        CertificateDer::from(cert.der().to_vec())
    };

    debug!(dir = %dir.path().display(), "identity loaded");
    Ok(Identity::from_parts(cert, &key_pair))
}

fn self_signed(key_pair: &KeyPair) -> Result<rcgen::Certificate, SecurityError> {
    let mut params = CertificateParams::new(vec![SERVER_NAME.to_string()])?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, SERVER_NAME);
    params.distinguished_name = name;
    params.serial_number = Some(SerialNumber::from(SERIAL_NUMBER));
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    Ok(params.self_signed(key_pair)?)
}

fn read(path: &Path) -> Result<String, SecurityError> {
    std::fs::read_to_string(path).map_err(|e| SecurityError::io(path, e))
}

fn write_private(path: &Path, contents: &str) -> Result<(), SecurityError> {
    std::fs::write(path, contents).map_err(|e| SecurityError::io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| SecurityError::io(path, e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_key_and_certificate() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = AppDir::new(tmp.path().join("app"));

        let identity = certificate(&dir, KEY_FILE, CERT_FILE).unwrap();

        assert!(!identity.cert().is_empty());
        let key = std::fs::read_to_string(dir.path().join(KEY_FILE)).unwrap();
        let cert = std::fs::read_to_string(dir.path().join(CERT_FILE)).unwrap();
        assert!(key.contains("PRIVATE KEY"));
        assert!(cert.contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn existing_identity_is_reused() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = AppDir::new(tmp.path());

        let first = certificate(&dir, KEY_FILE, CERT_FILE).unwrap();
        let second = certificate(&dir, KEY_FILE, CERT_FILE).unwrap();
        assert_eq!(first.cert(), second.cert());
    }

    #[test]
    fn missing_certificate_is_regenerated_for_existing_key() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = AppDir::new(tmp.path());
        certificate(&dir, KEY_FILE, CERT_FILE).unwrap();
        let key_before = std::fs::read(dir.path().join(KEY_FILE)).unwrap();

        std::fs::remove_file(dir.path().join(CERT_FILE)).unwrap();
        let identity = certificate(&dir, KEY_FILE, CERT_FILE).unwrap();

        assert!(!identity.cert().is_empty());
        assert!(dir.path().join(CERT_FILE).is_file());
        assert_eq!(std::fs::read(dir.path().join(KEY_FILE)).unwrap(), key_before);
    }

    #[test]
    fn new_key_replaces_stale_certificate() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = AppDir::new(tmp.path());
        let first = certificate(&dir, KEY_FILE, CERT_FILE).unwrap();

        std::fs::remove_file(dir.path().join(KEY_FILE)).unwrap();
        let second = certificate(&dir, KEY_FILE, CERT_FILE).unwrap();
        assert_ne!(first.cert(), second.cert());
    }

    #[test]
    fn corrupt_key_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = AppDir::new(tmp.path());
        std::fs::write(dir.path().join(KEY_FILE), "not a key").unwrap();

        let err = certificate(&dir, KEY_FILE, CERT_FILE).unwrap_err();
        assert!(matches!(err, SecurityError::InvalidPem { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = AppDir::new(tmp.path());
        certificate(&dir, "puncher.key", "puncher.crt").unwrap();

        for name in ["puncher.key", "puncher.crt"] {
            let mode = std::fs::metadata(dir.path().join(name))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600, "{name}");
        }
    }
}
