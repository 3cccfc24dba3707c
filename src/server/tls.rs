use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::CertificateDer;

use super::TlsError;

/// Builds a TLS acceptor from a PEM certificate chain and private key.
///
/// The key may be PKCS#8, PKCS#1 (RSA) or SEC1 (EC).
pub fn build_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let read_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| TlsError::Read { path, source }
    };

    let mut cert_reader = BufReader::new(File::open(cert_path).map_err(read_err(cert_path))?);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(read_err(cert_path))?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
    }

    let mut key_reader = BufReader::new(File::open(key_path).map_err(read_err(key_path))?);
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(read_err(key_path))?
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.to_path_buf()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_files_are_reported() {
        let err = build_tls_acceptor(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"))
            .err().expect("expected an error");
        assert!(matches!(err, TlsError::Read { ref path, .. } if path.ends_with("cert.pem")));
    }

    #[test]
    fn test_empty_certificate_file_is_rejected() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "not a certificate").unwrap();
        let key = tempfile::NamedTempFile::new().unwrap();

        let err = build_tls_acceptor(cert.path(), key.path()).err().expect("expected an error");
        assert!(matches!(err, TlsError::NoCertificates(_)));
    }

    #[test]
    fn test_missing_private_key_is_rejected() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        // syntactically valid PEM block; never parsed as X.509 because the key is missing
        writeln!(cert, "-----BEGIN CERTIFICATE-----\nMAA=\n-----END CERTIFICATE-----").unwrap();
        let key = tempfile::NamedTempFile::new().unwrap();

        let err = build_tls_acceptor(cert.path(), key.path()).err().expect("expected an error");
        assert!(matches!(err, TlsError::NoPrivateKey(_)));
    }
}
