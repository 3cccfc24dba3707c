use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::ProtocolError;

/// Maximum message size in bytes (16 MB).
/// PostgreSQL uses up to 1 GB, but 16 MB is a reasonable default for most use cases.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Read a null-terminated string from a BytesMut buffer.
/// Returns an error if there's not enough data (no null terminator found).
/// Returns the string (without the null terminator) if successful.
///
/// This function will search for a null byte within the buffer up to a maximum
/// length to prevent unbounded memory consumption from malicious input.
pub fn get_cstring(src: &mut BytesMut) -> Result<String, ProtocolError> {
    const MAX_CSTRING_LENGTH: usize = 1024 * 1024;

    let Some(null_pos) = src.iter().take(MAX_CSTRING_LENGTH).position(|&b| b == 0) else {
        return Err(ProtocolError::InvalidMessage);
    };

    let bytes = src.split_to(null_pos);
    src.advance(1);
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// Read a nullable byte array from a BytesMut buffer.
/// Returns None if the value is SQL NULL (length = -1).
///
/// Wire format: Int32 length (-1 for NULL, >= 0 for data), followed by data bytes if length >= 0
pub fn get_nullable_bytes(src: &mut BytesMut) -> Result<Option<Vec<u8>>, ProtocolError> {
    if src.len() < 4 {
        return Err(ProtocolError::InvalidMessage);
    }

    let len = src.get_i32();
    if len < 0 {
        return Ok(None);
    }

    let len = len as usize;
    if src.len() < len {
        return Err(ProtocolError::InvalidMessage);
    }
    let bytes = src.split_to(len);
    Ok(Some(bytes.to_vec()))
}

/// Write a null-terminated string to a BytesMut buffer.
pub fn put_cstring(dst: &mut BytesMut, s: &str) {
    dst.put_slice(s.as_bytes());
    dst.put_u8(0);
}

/// Writes a typed message: tag byte, then a length covering itself and the body.
pub fn put_message(dst: &mut BytesMut, tag: u8, body: impl FnOnce(&mut BytesMut)) {
    dst.put_u8(tag);
    put_length_prefixed(dst, body);
}

/// Writes a 4-byte big-endian length (including itself) followed by the body.
pub fn put_length_prefixed(dst: &mut BytesMut, body: impl FnOnce(&mut BytesMut)) {
    let start = dst.len();
    dst.put_i32(0);
    body(dst);
    let len = (dst.len() - start) as i32;
    dst[start..start + 4].copy_from_slice(&len.to_be_bytes());
}

/// Splits one complete typed message (tag + length + body) off the buffer.
///
/// Returns `Ok(None)` until the whole message is buffered. `max` bounds the
/// declared length.
pub fn split_typed_message(
    src: &mut BytesMut,
    max: usize,
) -> Result<Option<(u8, BytesMut)>, ProtocolError> {
    if src.len() < 5 {
        return Ok(None);
    }

    let len = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
    if len < 4 || len as usize > max {
        return Err(ProtocolError::InvalidMessage);
    }

    let total = 1 + len as usize;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    let mut msg = src.split_to(total);
    let tag = msg.get_u8();
    msg.advance(4);
    Ok(Some((tag, msg)))
}

/// Codec for the query phase of the PostgreSQL protocol.
/// Encodes BackendMessage (in backend.rs) and decodes FrontendMessage (in frontend.rs).
pub struct PostgresCodec {
    pub(crate) max_message_size: usize,
}

impl PostgresCodec {
    /// Creates a new PostgresCodec with the default maximum message size.
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl Default for PostgresCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Codec for the startup phase of the PostgreSQL protocol.
/// Decodes StartupMessage only (server doesn't receive backend messages during startup).
pub struct StartupCodec {
    pub(crate) max_message_size: usize,
}

impl StartupCodec {
    /// Creates a new StartupCodec with the default maximum message size.
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Uses a custom upper bound for declared message lengths.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Transitions to query phase codec after successful startup.
    pub fn ready(self) -> PostgresCodec {
        PostgresCodec {
            max_message_size: self.max_message_size,
        }
    }
}

impl Default for StartupCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_cstring() {
        let mut buf = BytesMut::from(&b"hello\0world"[..]);
        assert_eq!(get_cstring(&mut buf).unwrap(), "hello".to_string());
        assert_eq!(buf, b"world"[..]);
    }

    #[test]
    fn test_get_cstring_incomplete() {
        let mut buf = BytesMut::from(&b"hello"[..]);
        assert!(get_cstring(&mut buf).is_err());
    }

    #[test]
    fn test_get_nullable_bytes_null() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0xFF][..]); // -1
        assert_eq!(get_nullable_bytes(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_get_nullable_bytes_incomplete() {
        let mut buf = BytesMut::from(&[0, 0, 0, 10, b'h', b'i'][..]); // Says 10 bytes, only 2 available
        assert!(get_nullable_bytes(&mut buf).is_err());
    }

    #[test]
    fn test_put_message_patches_length() {
        let mut buf = BytesMut::new();
        put_message(&mut buf, b'C', |b| put_cstring(b, "SELECT 1"));
        assert_eq!(buf[0], b'C');
        assert_eq!(&buf[1..5], &[0, 0, 0, 13]);
        assert_eq!(&buf[5..], b"SELECT 1\0");
    }

    #[test]
    fn test_split_typed_message_waits_for_body() {
        let mut buf = BytesMut::from(&[b'Q', 0, 0, 0, 9, b'a'][..]);
        assert!(split_typed_message(&mut buf, 64).unwrap().is_none());

        buf.extend_from_slice(b"bcd\0");
        let (tag, body) = split_typed_message(&mut buf, 64).unwrap().unwrap();
        assert_eq!(tag, b'Q');
        assert_eq!(&body[..], b"abcd\0");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_split_typed_message_rejects_bad_length() {
        let mut buf = BytesMut::from(&[b'Q', 0, 0, 0, 3][..]);
        assert!(split_typed_message(&mut buf, 64).is_err());

        let mut buf = BytesMut::from(&[b'Q', 0, 0, 1, 0][..]);
        assert!(split_typed_message(&mut buf, 64).is_err());
    }
}
