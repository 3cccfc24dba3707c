//! Connection authentication: database check, trust mode, MD5 challenge.

use std::collections::HashMap;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::protocol::{
    BackendMessage, FrontendMessage, PostgresCodec, ProtocolError, StartupParameters, sql_state,
};

/// Authentication failures. A FATAL ErrorResponse has already been sent
/// where the protocol allows one.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("database \"{0}\" does not exist")]
    UnknownDatabase(String),
    #[error("role \"{0}\" does not exist")]
    UnknownUser(String),
    #[error("password authentication failed for user \"{0}\"")]
    PasswordMismatch(String),
    #[error("expected password message")]
    UnexpectedMessage,
    #[error("client disconnected during authentication")]
    Disconnected,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Computes the PostgreSQL MD5 password response:
/// `"md5" + hex(md5(hex(md5(password + user)) + salt))`.
pub fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let inner = format!("{:x}", md5::compute(format!("{password}{user}")));
    let mut outer = inner.into_bytes();
    outer.extend_from_slice(salt);
    format!("md5{:x}", md5::compute(outer))
}

/// Validates the startup parameters and runs the credential exchange.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    /// user -> plaintext password; empty means trust mode
    users: HashMap<String, String>,
    /// When set, clients must connect to exactly this database.
    database: Option<String>,
}

impl Authenticator {
    pub fn new(users: HashMap<String, String>, database: Option<String>) -> Self {
        Self { users, database }
    }

    /// Accepts every user and database.
    pub fn trust() -> Self {
        Self::default()
    }

    pub fn is_trust(&self) -> bool {
        self.users.is_empty()
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Authenticates the client and returns its user name.
    ///
    /// Sends AuthenticationOk on success. On failure a FATAL ErrorResponse is
    /// sent and the caller is expected to close the connection.
    pub async fn authenticate<S>(
        &self,
        framed: &mut Framed<S, PostgresCodec>,
        params: &StartupParameters,
    ) -> Result<String, AuthError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let user = params.user.as_str();

        if let Some(required) = &self.database {
            let requested = params.database_or_user();
            if requested != required {
                let err = AuthError::UnknownDatabase(requested.to_string());
                framed
                    .send(BackendMessage::fatal(sql_state::INVALID_CATALOG_NAME, err.to_string()))
                    .await?;
                return Err(err);
            }
        }

        if self.is_trust() {
            debug!(user, "trust authentication");
            framed.send(BackendMessage::AuthenticationOk).await?;
            return Ok(user.to_string());
        }

        let Some(password) = self.users.get(user) else {
            let err = AuthError::UnknownUser(user.to_string());
            framed
                .send(BackendMessage::fatal(sql_state::INVALID_PASSWORD, err.to_string()))
                .await?;
            return Err(err);
        };

        let salt: [u8; 4] = rand::random();
        framed
            .send(BackendMessage::AuthenticationMd5Password { salt })
            .await?;

        let response = match framed.next().await {
            Some(Ok(FrontendMessage::Password(response))) => response,
            Some(Ok(_)) => {
                framed
                    .send(BackendMessage::fatal(
                        sql_state::PROTOCOL_VIOLATION,
                        "expected password response",
                    ))
                    .await?;
                return Err(AuthError::UnexpectedMessage);
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(AuthError::Disconnected),
        };

        if response != md5_password(user, password, &salt) {
            let err = AuthError::PasswordMismatch(user.to_string());
            framed
                .send(BackendMessage::fatal(sql_state::INVALID_PASSWORD, err.to_string()))
                .await?;
            return Err(err);
        }

        debug!(user, "md5 authentication succeeded");
        framed.send(BackendMessage::AuthenticationOk).await?;
        Ok(user.to_string())
    }
}
