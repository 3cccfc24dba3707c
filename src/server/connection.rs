use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::interp::{Interpreter, QueryResult, SessionInfo};
use crate::protocol::{
    BackendMessage, FieldDescription, FrontendMessage, PostgresCodec, ProtocolError,
    TransactionStatus, sql_state,
};
use crate::server::ConnectionError;
use crate::server::handshake::ClientStream;

/// A single authenticated client connection in its query phase.
pub struct Connection {
    framed: Framed<ClientStream, PostgresCodec>,
    pid: i32,
    session: SessionInfo,
    interpreter: Arc<Interpreter>,
}

impl Connection {
    pub fn new(
        framed: Framed<ClientStream, PostgresCodec>,
        pid: i32,
        session: SessionInfo,
        interpreter: Arc<Interpreter>,
    ) -> Self {
        Self {
            framed,
            pid,
            session,
            interpreter,
        }
    }

    /// Serves queries until the client leaves or `shutdown` fires.
    ///
    /// Shutdown is only observed while waiting for the next message, so a
    /// query that has been read is always answered.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), ConnectionError> {
        loop {
            let next = tokio::select! {
                next = self.framed.next() => next,
                _ = shutdown.cancelled() => {
                    debug!(pid = self.pid, "connection closed by shutdown");
                    return Ok(());
                }
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(self.reject(e).await),
                None => return Ok(()),
            };

            match message {
                FrontendMessage::Query(sql) => self.handle_query(&sql).await?,
                FrontendMessage::Terminate => return Ok(()),
                FrontendMessage::Password(_) => {
                    self.send_fatal("unexpected password message").await;
                    return Err(ConnectionError::UnexpectedMessage("password"));
                }
            }
        }
    }

    /// Sends a best-effort FATAL for a framing error and returns the error.
    async fn reject(&mut self, error: ProtocolError) -> ConnectionError {
        if !matches!(error, ProtocolError::Io(_)) {
            self.send_fatal(&error.to_string()).await;
        }
        error.into()
    }

    async fn send_fatal(&mut self, message: &str) {
        let fatal = BackendMessage::fatal(sql_state::PROTOCOL_VIOLATION, message);
        if let Err(e) = self.framed.send(fatal).await {
            debug!(pid = self.pid, error = %e, "failed to send fatal error");
        }
    }

    /// Answers one simple query, always ending with ReadyForQuery.
    async fn handle_query(&mut self, sql: &str) -> Result<(), ConnectionError> {
        debug!(pid = self.pid, query = sql, "query");

        match self.interpreter.execute(sql, &self.session) {
            Ok(None) => self.framed.feed(BackendMessage::EmptyQueryResponse).await?,
            Ok(Some(result)) => self.send_result(result).await?,
            Err(e) => {
                warn!(pid = self.pid, query = sql, error = %e, "query failed");
                self.framed
                    .feed(BackendMessage::error(e.sql_state(), e.to_string()))
                    .await?;
            }
        }

        self.framed
            .feed(BackendMessage::ReadyForQuery {
                status: TransactionStatus::Idle,
            })
            .await?;
        self.framed.flush().await?;
        Ok(())
    }

    async fn send_result(&mut self, result: QueryResult) -> Result<(), ConnectionError> {
        if result.returns_rows() {
            let fields = result
                .columns
                .into_iter()
                .map(|c| FieldDescription::new(c.name, c.type_oid))
                .collect();
            self.framed
                .feed(BackendMessage::RowDescription { fields })
                .await?;
        }

        for values in result.rows {
            self.framed.feed(BackendMessage::DataRow { values }).await?;
        }

        self.framed
            .feed(BackendMessage::CommandComplete { tag: result.tag })
            .await?;
        Ok(())
    }
}
