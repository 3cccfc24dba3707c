use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;
use tokio_util::codec::Decoder;

use crate::protocol::codec::{
    PostgresCodec, StartupCodec, get_cstring, put_cstring, put_length_prefixed, put_message,
    split_typed_message,
};
use crate::protocol::error::ProtocolError;

/// SSLRequest magic number
pub const SSL_REQUEST_CODE: i32 = (1234 << 16) | 5679; // 80877103

/// GSSENCRequest magic number
pub const GSSENC_REQUEST_CODE: i32 = (1234 << 16) | 5680; // 80877104

/// CancelRequest magic number
pub const CANCEL_REQUEST_CODE: i32 = (1234 << 16) | 5678; // 80877102

/// Protocol version 3.0
pub const PROTOCOL_VERSION_3: i32 = 3 << 16;

/// Messages sent by the frontend (client) during startup phase.
#[derive(Debug)]
pub enum StartupMessage {
    /// SSLRequest - client wants to negotiate SSL
    SslRequest,
    /// GSSENCRequest - client wants GSSAPI encryption
    GssEncRequest,
    /// CancelRequest - client wants to cancel a query
    CancelRequest { process_id: i32, secret_key: i32 },
    /// StartupMessage - normal connection startup
    Startup {
        protocol_version: i32,
        parameters: StartupParameters,
    },
}

impl StartupMessage {
    /// Decodes a startup message from the buffer.
    /// The buffer should contain a complete message (length and code already validated).
    fn decode(src: &mut BytesMut) -> Result<Self, ProtocolError> {
        let _len = src.get_i32();
        let code = src.get_i32();

        match code {
            SSL_REQUEST_CODE => Ok(StartupMessage::SslRequest),
            GSSENC_REQUEST_CODE => Ok(StartupMessage::GssEncRequest),
            CANCEL_REQUEST_CODE => {
                if src.len() < 8 {
                    return Err(ProtocolError::InvalidMessage);
                }
                let process_id = src.get_i32();
                let secret_key = src.get_i32();
                Ok(StartupMessage::CancelRequest {
                    process_id,
                    secret_key,
                })
            }
            version if (version >> 16) == 3 => {
                let parameters = StartupParameters::decode(src)?;
                Ok(StartupMessage::Startup {
                    protocol_version: version,
                    parameters,
                })
            }
            _ => Err(ProtocolError::UnsupportedProtocolVersion(code)),
        }
    }

    /// Encodes this message as a client would send it.
    pub fn encode(&self, dst: &mut BytesMut) {
        put_length_prefixed(dst, |b| match self {
            StartupMessage::SslRequest => b.put_i32(SSL_REQUEST_CODE),
            StartupMessage::GssEncRequest => b.put_i32(GSSENC_REQUEST_CODE),
            StartupMessage::CancelRequest {
                process_id,
                secret_key,
            } => {
                b.put_i32(CANCEL_REQUEST_CODE);
                b.put_i32(*process_id);
                b.put_i32(*secret_key);
            }
            StartupMessage::Startup {
                protocol_version,
                parameters,
            } => {
                b.put_i32(*protocol_version);
                parameters.encode(b);
            }
        });
    }
}

/// Startup parameters from the client
#[derive(Debug, Clone, Default)]
pub struct StartupParameters {
    pub user: String,
    pub database: Option<String>,
    pub application_name: Option<String>,
    pub client_encoding: Option<String>,
    pub other: HashMap<String, String>,
}

impl StartupParameters {
    /// Creates parameters for `user`, optionally connecting to `database`.
    pub fn new(user: impl Into<String>, database: Option<&str>) -> Self {
        Self {
            user: user.into(),
            database: database.map(str::to_string),
            ..Self::default()
        }
    }

    /// Returns the requested database, which PostgreSQL defaults to the user name.
    pub fn database_or_user(&self) -> &str {
        self.database.as_deref().unwrap_or(&self.user)
    }

    /// Decodes startup parameters from the message buffer.
    fn decode(src: &mut BytesMut) -> Result<Self, ProtocolError> {
        let mut params = StartupParameters::default();

        loop {
            if src.is_empty() {
                break;
            }

            let name = get_cstring(src)?;

            // Empty name signals end of parameters
            if name.is_empty() {
                break;
            }

            let value = get_cstring(src)?;

            match name.as_str() {
                "user" => params.user = value,
                "database" => params.database = Some(value),
                "application_name" => params.application_name = Some(value),
                "client_encoding" => params.client_encoding = Some(value),
                _ => {
                    params.other.insert(name, value);
                }
            }
        }

        if params.user.is_empty() {
            return Err(ProtocolError::MissingParameter("user"));
        }

        Ok(params)
    }

    fn encode(&self, dst: &mut BytesMut) {
        let optional = [
            ("database", &self.database),
            ("application_name", &self.application_name),
            ("client_encoding", &self.client_encoding),
        ];

        put_cstring(dst, "user");
        put_cstring(dst, &self.user);
        for (name, value) in optional {
            if let Some(value) = value {
                put_cstring(dst, name);
                put_cstring(dst, value);
            }
        }
        for (name, value) in &self.other {
            put_cstring(dst, name);
            put_cstring(dst, value);
        }
        dst.put_u8(0);
    }
}

impl Decoder for StartupCodec {
    type Item = StartupMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least 8 bytes (length + code)
        if src.len() < 8 {
            return Ok(None);
        }

        // Peek at the length (don't consume yet)
        let len = i32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        if len < 8 || len as usize > self.max_message_size {
            return Err(ProtocolError::InvalidMessage);
        }
        let len = len as usize;

        if src.len() < len {
            return Ok(None);
        }

        let mut msg_buf = src.split_to(len);
        let msg = StartupMessage::decode(&mut msg_buf)?;
        Ok(Some(msg))
    }
}

/// Messages sent by the frontend (client) after startup.
#[derive(Debug, PartialEq, Eq)]
pub enum FrontendMessage {
    /// 'p' - Password response (here always an MD5 digest)
    Password(String),
    /// 'Q' - Simple query
    Query(String),
    /// 'X' - Termination
    Terminate,
}

impl FrontendMessage {
    /// Decodes a frontend message body for the given type tag.
    fn decode(msg_type: u8, src: &mut BytesMut) -> Result<Self, ProtocolError> {
        match msg_type {
            b'p' => Ok(FrontendMessage::Password(get_cstring(src)?)),
            b'Q' => Ok(FrontendMessage::Query(get_cstring(src)?)),
            b'X' => Ok(FrontendMessage::Terminate),
            _ => Err(ProtocolError::UnknownMessageType(msg_type)),
        }
    }

    /// Encodes this message as a client would send it.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            FrontendMessage::Password(password) => {
                put_message(dst, b'p', |b| put_cstring(b, password));
            }
            FrontendMessage::Query(query) => {
                put_message(dst, b'Q', |b| put_cstring(b, query));
            }
            FrontendMessage::Terminate => put_message(dst, b'X', |_| {}),
        }
    }
}

impl Decoder for PostgresCodec {
    type Item = FrontendMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match split_typed_message(src, self.max_message_size)? {
            Some((msg_type, mut body)) => FrontendMessage::decode(msg_type, &mut body).map(Some),
            None => Ok(None),
        }
    }
}
