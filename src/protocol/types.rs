/// Format code for result values in the PostgreSQL protocol.
///
/// Only text results are produced; binary is recognised when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i16)]
pub enum FormatCode {
    /// Text format (0)
    #[default]
    Text = 0,
    /// Binary format (1)
    Binary = 1,
}

impl TryFrom<i16> for FormatCode {
    type Error = i16;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FormatCode::Text),
            1 => Ok(FormatCode::Binary),
            _ => Err(value),
        }
    }
}

impl FormatCode {
    /// Converts the FormatCode to an i16 value.
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

/// Error and notice message field type codes.
/// See: https://www.postgresql.org/docs/current/protocol-error-fields.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorFieldCode {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    Severity = b'S',
    /// Severity (non-localized): Same as Severity but never localized
    SeverityNonLocalized = b'V',
    /// SQLSTATE code
    SqlState = b'C',
    /// Primary human-readable error message
    Message = b'M',
}

impl ErrorFieldCode {
    /// Converts the ErrorFieldCode to a u8 value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// PostgreSQL type OIDs reported in RowDescription.
pub mod type_oid {
    pub const BOOL: i32 = 16;
    pub const INT8: i32 = 20;
    pub const INT4: i32 = 23;
    pub const TEXT: i32 = 25;
    pub const FLOAT8: i32 = 701;
    pub const VARCHAR: i32 = 1043;
    pub const DATE: i32 = 1082;
    pub const TIMESTAMP: i32 = 1114;
    pub const UUID: i32 = 2950;

    /// Maps a configured column type name to the OID clients will see.
    /// Unrecognised names are reported as `text`.
    pub fn for_type_name(name: &str) -> i32 {
        match name.to_ascii_lowercase().as_str() {
            "int" | "integer" | "int4" | "serial" => INT4,
            "int8" | "bigint" => INT8,
            "bool" | "boolean" => BOOL,
            "float" | "float8" | "double" | "real" | "numeric" | "decimal" => FLOAT8,
            "uuid" => UUID,
            "timestamp" | "datetime" => TIMESTAMP,
            "date" => DATE,
            "varchar" => VARCHAR,
            _ => TEXT,
        }
    }

    /// Returns the `typlen` reported for an OID (-1 for variable length).
    pub fn size(oid: i32) -> i16 {
        match oid {
            BOOL => 1,
            INT4 | DATE => 4,
            INT8 | FLOAT8 | TIMESTAMP => 8,
            UUID => 16,
            _ => -1,
        }
    }
}

/// SQLSTATE codes used in ErrorResponse messages.
pub mod sql_state {
    pub const PROTOCOL_VIOLATION: &str = "08P01";
    pub const INVALID_CATALOG_NAME: &str = "3D000";
    pub const INVALID_PASSWORD: &str = "28P01";
    pub const SYNTAX_ERROR: &str = "42601";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_oid_for_type_name() {
        assert_eq!(type_oid::for_type_name("string"), type_oid::TEXT);
        assert_eq!(type_oid::for_type_name("int"), type_oid::INT4);
        assert_eq!(type_oid::for_type_name("bool"), type_oid::BOOL);
        assert_eq!(type_oid::for_type_name("float"), type_oid::FLOAT8);
        assert_eq!(type_oid::for_type_name("UUID"), type_oid::UUID);
        assert_eq!(type_oid::for_type_name("timestamp"), type_oid::TIMESTAMP);
        assert_eq!(type_oid::for_type_name("email"), type_oid::TEXT);
    }
}
