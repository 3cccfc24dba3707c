use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::codec::{PostgresCodec, get_cstring, get_nullable_bytes, put_cstring, put_message};
use crate::protocol::types::{ErrorFieldCode, FormatCode, type_oid};
use crate::protocol::ProtocolError;

/// Messages sent by the backend (server) to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMessage {
    /// 'R' - Authentication succeeded
    AuthenticationOk,
    /// 'R' - Client must answer with an MD5-hashed password
    AuthenticationMd5Password { salt: [u8; 4] },
    /// 'K' - Backend key data for cancel requests
    BackendKeyData { process_id: i32, secret_key: i32 },
    /// 'S' - Parameter status notification
    ParameterStatus { name: String, value: String },
    /// 'Z' - Ready for query
    ReadyForQuery { status: TransactionStatus },
    /// 'T' - Result set column metadata
    RowDescription { fields: Vec<FieldDescription> },
    /// 'D' - One result row; `None` cells are SQL NULL
    DataRow { values: Vec<Option<String>> },
    /// 'C' - Command completion tag
    CommandComplete { tag: String },
    /// 'I' - Response to an empty query string
    EmptyQueryResponse,
    /// 'E' - Error response
    ErrorResponse { fields: Vec<ErrorField> },
}

impl BackendMessage {
    /// Builds a non-fatal ErrorResponse.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::error_with_severity("ERROR", code, message)
    }

    /// Builds an ErrorResponse that precedes closing the connection.
    pub fn fatal(code: &str, message: impl Into<String>) -> Self {
        Self::error_with_severity("FATAL", code, message)
    }

    fn error_with_severity(severity: &str, code: &str, message: impl Into<String>) -> Self {
        BackendMessage::ErrorResponse {
            fields: vec![
                ErrorField::new(ErrorFieldCode::Severity, severity),
                ErrorField::new(ErrorFieldCode::SeverityNonLocalized, severity),
                ErrorField::new(ErrorFieldCode::SqlState, code),
                ErrorField::new(ErrorFieldCode::Message, message),
            ],
        }
    }

    /// Returns the value of an error field, if this is an ErrorResponse carrying it.
    pub fn error_field(&self, code: ErrorFieldCode) -> Option<&str> {
        let BackendMessage::ErrorResponse { fields } = self else {
            return None;
        };
        fields
            .iter()
            .find(|f| f.code == code.as_u8())
            .map(|f| f.value.as_str())
    }

    /// Encodes this message into the buffer.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            BackendMessage::AuthenticationOk => {
                put_message(dst, b'R', |b| b.put_i32(0));
            }
            BackendMessage::AuthenticationMd5Password { salt } => {
                put_message(dst, b'R', |b| {
                    b.put_i32(5);
                    b.put_slice(salt);
                });
            }
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => {
                put_message(dst, b'K', |b| {
                    b.put_i32(*process_id);
                    b.put_i32(*secret_key);
                });
            }
            BackendMessage::ParameterStatus { name, value } => {
                put_message(dst, b'S', |b| {
                    put_cstring(b, name);
                    put_cstring(b, value);
                });
            }
            BackendMessage::ReadyForQuery { status } => {
                put_message(dst, b'Z', |b| b.put_u8(status.as_byte()));
            }
            BackendMessage::RowDescription { fields } => {
                put_message(dst, b'T', |b| {
                    b.put_i16(fields.len() as i16);
                    for field in fields {
                        put_cstring(b, &field.name);
                        b.put_i32(field.table_oid);
                        b.put_i16(field.column_id);
                        b.put_i32(field.type_oid);
                        b.put_i16(field.type_size);
                        b.put_i32(field.type_modifier);
                        b.put_i16(field.format.as_i16());
                    }
                });
            }
            BackendMessage::DataRow { values } => {
                put_message(dst, b'D', |b| {
                    b.put_i16(values.len() as i16);
                    for value in values {
                        match value {
                            Some(v) => {
                                b.put_i32(v.len() as i32);
                                b.put_slice(v.as_bytes());
                            }
                            None => b.put_i32(-1),
                        }
                    }
                });
            }
            BackendMessage::CommandComplete { tag } => {
                put_message(dst, b'C', |b| put_cstring(b, tag));
            }
            BackendMessage::EmptyQueryResponse => put_message(dst, b'I', |_| {}),
            BackendMessage::ErrorResponse { fields } => {
                put_message(dst, b'E', |b| {
                    for field in fields {
                        b.put_u8(field.code);
                        put_cstring(b, &field.value);
                    }
                    b.put_u8(0); // terminator
                });
            }
        }
    }

    /// Decodes a message body (tag and length already consumed).
    pub fn decode(tag: u8, src: &mut BytesMut) -> Result<Self, ProtocolError> {
        macro_rules! ensure_remaining {
            ($n:expr) => {
                if src.len() < $n {
                    return Err(ProtocolError::InvalidMessage);
                }
            };
        }

        match tag {
            b'R' => {
                ensure_remaining!(4);
                match src.get_i32() {
                    0 => Ok(BackendMessage::AuthenticationOk),
                    5 => {
                        ensure_remaining!(4);
                        let mut salt = [0u8; 4];
                        src.copy_to_slice(&mut salt);
                        Ok(BackendMessage::AuthenticationMd5Password { salt })
                    }
                    _ => Err(ProtocolError::InvalidMessage),
                }
            }
            b'K' => {
                ensure_remaining!(8);
                Ok(BackendMessage::BackendKeyData {
                    process_id: src.get_i32(),
                    secret_key: src.get_i32(),
                })
            }
            b'S' => Ok(BackendMessage::ParameterStatus {
                name: get_cstring(src)?,
                value: get_cstring(src)?,
            }),
            b'Z' => {
                ensure_remaining!(1);
                let status = TransactionStatus::from_byte(src.get_u8())
                    .ok_or(ProtocolError::InvalidMessage)?;
                Ok(BackendMessage::ReadyForQuery { status })
            }
            b'T' => {
                ensure_remaining!(2);
                let count = src.get_i16().max(0) as usize;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    let name = get_cstring(src)?;
                    ensure_remaining!(18);
                    fields.push(FieldDescription {
                        name,
                        table_oid: src.get_i32(),
                        column_id: src.get_i16(),
                        type_oid: src.get_i32(),
                        type_size: src.get_i16(),
                        type_modifier: src.get_i32(),
                        format: FormatCode::try_from(src.get_i16())
                            .map_err(|_| ProtocolError::InvalidMessage)?,
                    });
                }
                Ok(BackendMessage::RowDescription { fields })
            }
            b'D' => {
                ensure_remaining!(2);
                let count = src.get_i16().max(0) as usize;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    let value = get_nullable_bytes(src)?
                        .map(String::from_utf8)
                        .transpose()?;
                    values.push(value);
                }
                Ok(BackendMessage::DataRow { values })
            }
            b'C' => Ok(BackendMessage::CommandComplete {
                tag: get_cstring(src)?,
            }),
            b'I' => Ok(BackendMessage::EmptyQueryResponse),
            b'E' => {
                let mut fields = Vec::new();
                loop {
                    ensure_remaining!(1);
                    let code = src.get_u8();
                    if code == 0 {
                        break;
                    }
                    fields.push(ErrorField {
                        code,
                        value: get_cstring(src)?,
                    });
                }
                Ok(BackendMessage::ErrorResponse { fields })
            }
            _ => Err(ProtocolError::UnknownMessageType(tag)),
        }
    }
}

impl Encoder<BackendMessage> for PostgresCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: BackendMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}

/// Transaction status indicator for ReadyForQuery message.
///
/// Transaction commands are accepted as no-ops, so the server is always idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// 'I' - Idle (not in a transaction block)
    Idle,
}

impl TransactionStatus {
    fn as_byte(self) -> u8 {
        match self {
            TransactionStatus::Idle => b'I',
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'I' => Some(TransactionStatus::Idle),
            _ => None,
        }
    }
}

/// Column metadata in a RowDescription message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub name: String,
    /// OID of the source table, 0 when not a table column.
    pub table_oid: i32,
    /// Attribute number within the source table, 0 when not a table column.
    pub column_id: i16,
    pub type_oid: i32,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: FormatCode,
}

impl FieldDescription {
    /// Describes a text-format column of the given type.
    pub fn new(name: impl Into<String>, type_oid: i32) -> Self {
        Self {
            name: name.into(),
            table_oid: 0,
            column_id: 0,
            type_oid,
            type_size: type_oid::size(type_oid),
            type_modifier: -1,
            format: FormatCode::Text,
        }
    }
}

/// Error/Notice field codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorField {
    pub code: u8,
    pub value: String,
}

impl ErrorField {
    pub fn new(code: ErrorFieldCode, value: impl Into<String>) -> Self {
        Self {
            code: code.as_u8(),
            value: value.into(),
        }
    }
}
