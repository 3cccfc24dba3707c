use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Framed;
use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::interp::{SERVER_VERSION, SessionInfo};
use crate::protocol::{
    BackendMessage, PostgresCodec, StartupCodec, StartupMessage, StartupParameters,
    TransactionStatus,
};
use crate::server::ConnectionError;

/// A client byte stream, plain or TLS.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type ClientStream = Box<dyn AsyncStream>;

pub enum HandshakeResult {
    /// Authenticated and ready for queries.
    Success {
        framed: Framed<ClientStream, PostgresCodec>,
        session: SessionInfo,
        secret_key: i32,
    },
    /// The connection only carried a CancelRequest.
    CancelRequested { pid: i32, secret_key: i32 },
}

/// Drives one client from its first byte to the first ReadyForQuery.
pub struct Handshake<'a> {
    framed: Framed<ClientStream, StartupCodec>,
    pid: i32,
    tls: Option<&'a TlsAcceptor>,
    encrypted: bool,
}

impl<'a> Handshake<'a> {
    pub fn new<S: AsyncStream + 'static>(
        socket: S,
        pid: i32,
        tls: Option<&'a TlsAcceptor>,
    ) -> Self {
        Self {
            framed: Framed::new(Box::new(socket) as ClientStream, StartupCodec::new()),
            pid,
            tls,
            encrypted: false,
        }
    }

    pub async fn run(mut self, auth: &Authenticator) -> Result<HandshakeResult, ConnectionError> {
        let parameters = loop {
            let message = match self.framed.next().await {
                Some(message) => message?,
                None => return Err(ConnectionError::Disconnected),
            };

            match message {
                StartupMessage::SslRequest => self = self.negotiate_tls().await?,
                StartupMessage::GssEncRequest => self.reply_raw(b'N').await?,
                StartupMessage::CancelRequest {
                    process_id,
                    secret_key,
                } => {
                    return Ok(HandshakeResult::CancelRequested {
                        pid: process_id,
                        secret_key,
                    });
                }
                StartupMessage::Startup { parameters, .. } => break parameters,
            }
        };

        info!(
            user = %parameters.user,
            database = parameters.database_or_user(),
            application_name = parameters.application_name.as_deref().unwrap_or(""),
            tls = self.encrypted,
            "startup"
        );

        let mut framed = self.framed.map_codec(StartupCodec::ready);
        let user = auth.authenticate(&mut framed, &parameters).await?;

        let secret_key = rand::random::<i32>();
        send_startup_info(&mut framed, &parameters, self.pid, secret_key).await?;

        Ok(HandshakeResult::Success {
            framed,
            session: SessionInfo::new(user, parameters.database_or_user()),
            secret_key,
        })
    }

    /// Answers an SSLRequest, upgrading the stream when TLS is configured.
    async fn negotiate_tls(mut self) -> Result<Self, ConnectionError> {
        let Some(acceptor) = self.tls.filter(|_| !self.encrypted) else {
            self.reply_raw(b'N').await?;
            return Ok(self);
        };

        // Bytes pipelined after the SSLRequest would bypass encryption.
        if !self.framed.read_buffer().is_empty() {
            return Err(ConnectionError::UnexpectedMessage("plaintext data after SSLRequest"));
        }
        self.reply_raw(b'S').await?;

        let stream = acceptor
            .accept(self.framed.into_inner())
            .await
            .map_err(ConnectionError::TlsHandshake)?;
        debug!(pid = self.pid, "tls established");

        Ok(Self {
            framed: Framed::new(Box::new(stream) as ClientStream, StartupCodec::new()),
            encrypted: true,
            ..self
        })
    }

    /// Writes the single unframed byte that answers SSL and GSSAPI requests.
    async fn reply_raw(&mut self, byte: u8) -> Result<(), ConnectionError> {
        let socket = self.framed.get_mut();
        socket.write_all(&[byte]).await?;
        socket.flush().await?;
        Ok(())
    }
}

async fn send_startup_info(
    framed: &mut Framed<ClientStream, PostgresCodec>,
    parameters: &StartupParameters,
    pid: i32,
    secret_key: i32,
) -> Result<(), ConnectionError> {
    let client_encoding = parameters.client_encoding.as_deref().unwrap_or("UTF8");
    let application_name = parameters.application_name.as_deref().unwrap_or("");
    let params = [
        ("server_version", SERVER_VERSION),
        ("server_encoding", "UTF8"),
        ("client_encoding", client_encoding),
        ("DateStyle", "ISO, MDY"),
        ("TimeZone", "UTC"),
        ("integer_datetimes", "on"),
        ("standard_conforming_strings", "on"),
        ("application_name", application_name),
    ];

    for (name, value) in params {
        framed
            .feed(BackendMessage::ParameterStatus {
                name: name.to_string(),
                value: value.to_string(),
            })
            .await?;
    }

    framed
        .feed(BackendMessage::BackendKeyData {
            process_id: pid,
            secret_key,
        })
        .await?;

    framed
        .feed(BackendMessage::ReadyForQuery {
            status: TransactionStatus::Idle,
        })
        .await?;

    framed.flush().await?;
    Ok(())
}
