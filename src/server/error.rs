use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::auth::AuthError;
use crate::protocol::ProtocolError;

/// Errors that end a single client connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(#[source] io::Error),

    #[error("unexpected {0} message")]
    UnexpectedMessage(&'static str),

    #[error("client disconnected during startup")]
    Disconnected,
}

/// Errors loading TLS material at service start.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS configuration: {0}")]
    Config(#[from] tokio_rustls::rustls::Error),
}
