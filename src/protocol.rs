//! PostgreSQL wire protocol implementation.
//!
//! This module implements the subset of the PostgreSQL v3.0 wire protocol that
//! client drivers need for simple-query traffic: the startup packet (including
//! SSL negotiation), MD5 authentication, simple queries and their results.
//!
//! ## Architecture
//!
//! ```text
//! +----------+                           +----------+
//! |  Client  |  --- FrontendMessage -->  |  Server  |
//! |  (psql)  |  <-- BackendMessage  ---  | (mirage) |
//! +----------+                           +----------+
//!               ^                   ^
//!               |   PostgresCodec   |
//!               +-------------------+
//! ```
//!
//! ## Terminology
//!
//! - **FrontendMessage**: Messages from client to server (Query, Password, Terminate)
//! - **StartupMessage**: Special frontend messages for connection handshake (SSL, Startup, Cancel)
//! - **BackendMessage**: Messages from server to client (RowDescription, DataRow, etc.)
//! - **Codec**: Framing and serialization for the wire protocol

pub mod backend;
pub mod client;
pub mod codec;
pub mod error;
pub mod frontend;
pub mod types;

pub use backend::{BackendMessage, ErrorField, FieldDescription, TransactionStatus};
pub use client::ClientCodec;
pub use codec::{PostgresCodec, StartupCodec};
pub use error::ProtocolError;
pub use frontend::{FrontendMessage, PROTOCOL_VERSION_3, StartupMessage, StartupParameters};
pub use types::{ErrorFieldCode, FormatCode, sql_state, type_oid};
