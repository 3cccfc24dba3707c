use thiserror::Error;

/// Protocol parsing errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message")]
    InvalidMessage,
    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(i32),
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("invalid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("unknown message type: 0x{0:02x}")]
    UnknownMessageType(u8),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
