//! TCP server for PostgreSQL-compatible connections.
//!
//! This module provides the network layer that accepts client connections
//! and drives each one through the PostgreSQL wire protocol.
//!
//! ## Architecture
//!
//! ```text
//! +--------+
//! | Server |  <- Accepts TCP connections, one task per client
//! +--------+
//!      |
//!      v
//! +-----------+     +---------------+
//! | Handshake | --> | Authenticator |  <- SSL/Startup negotiation, credentials
//! +-----------+     +---------------+
//!      |
//!      v
//! +------------+     +-------------+
//! | Connection | --> | Interpreter |  <- Simple-query loop
//! +------------+     +-------------+
//! ```
//!
//! ## Shutdown
//!
//! Cancelling the token passed to [`Server::run`] stops the accept loop and
//! closes the listening socket. A connection still in its handshake is
//! dropped at once. An authenticated one notices the cancellation the next
//! time it waits for a message. `run` returns once all of them have finished.

pub mod connection;
mod error;
pub mod handshake;
pub mod listener;
pub mod tls;

pub use error::{ConnectionError, TlsError};
pub use listener::{Server, ServerOptions};
pub use tls::build_tls_acceptor;
