//! Test utilities for wire-level integration tests.
//!
//! Starts a seeded server on a free port and provides a minimal frontend
//! built on [`ClientCodec`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use mirage::auth::{Authenticator, md5_password};
use mirage::interp::Interpreter;
use mirage::protocol::{
    BackendMessage, ClientCodec, ErrorFieldCode, FrontendMessage, PROTOCOL_VERSION_3,
    StartupMessage, StartupParameters,
};
use mirage::server::{Server, ServerOptions};
use mirage::store::{Field, FieldType, Schema, Store, row};

/// Rows seeded into the `user` table.
pub const SEEDED_USERS: usize = 5;

/// A running server, shut down gracefully or aborted when dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<Store>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Starts a server in trust mode.
    pub async fn start() -> Self {
        Self::start_with(Authenticator::trust()).await
    }

    /// Starts a server that requires `user`/`password` on database `database`.
    pub async fn start_with_password(user: &str, password: &str, database: &str) -> Self {
        let users = HashMap::from([(user.to_string(), password.to_string())]);
        Self::start_with(Authenticator::new(users, Some(database.to_string()))).await
    }

    pub async fn start_with(auth: Authenticator) -> Self {
        let store = Arc::new(Store::new());
        let schema = Schema::new(
            "user",
            vec![
                Field::new("id", FieldType::String).primary_key(),
                Field::new("name", FieldType::String).indexed(),
            ],
        )
        .unwrap();
        store.create_table(schema).unwrap();

        let names = ["Alice", "Bob", "Carol", "Alice", "Dave"];
        for (i, name) in names.iter().enumerate().take(SEEDED_USERS) {
            let id = format!("u{}", i + 1);
            store.insert("user", row([("id", id.as_str()), ("name", *name)])).unwrap();
        }

        let interpreter = Arc::new(Interpreter::new(Arc::clone(&store)));
        let server = Server::bind(ServerOptions::new("test", "127.0.0.1:0"), interpreter, auth)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));

        Self {
            addr,
            store,
            shutdown,
            handle: Some(handle),
        }
    }

    pub async fn connect_raw(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Connects and authenticates as `user` in trust mode.
    pub async fn connect(&self, user: &str) -> TestClient {
        TestClient::connect(self.addr, StartupParameters::new(user, None), None)
            .await
            .unwrap()
    }

    /// Cancels the server and waits for it to drain, failing after `timeout`.
    pub async fn shutdown(&mut self, timeout: Duration) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(timeout, handle)
                .await
                .expect("server should stop within the timeout")
                .unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// Everything the server sent in answer to one simple query.
#[derive(Debug, Default)]
pub struct QueryOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub tag: Option<String>,
    pub error: Option<BackendMessage>,
    pub empty: bool,
}

impl QueryOutcome {
    pub fn sql_state(&self) -> Option<&str> {
        self.error.as_ref()?.error_field(ErrorFieldCode::SqlState)
    }
}

/// A frontend speaking the simple-query protocol.
pub struct TestClient {
    framed: Framed<TcpStream, ClientCodec>,
    pub process_id: i32,
}

impl TestClient {
    /// Runs the startup exchange, answering an MD5 challenge with `password`.
    ///
    /// Returns the server's ErrorResponse when it rejects the connection.
    pub async fn connect(
        addr: SocketAddr,
        parameters: StartupParameters,
        password: Option<&str>,
    ) -> Result<Self, BackendMessage> {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = Framed::new(stream, ClientCodec);
        let user = parameters.user.clone();
        framed
            .send(StartupMessage::Startup {
                protocol_version: PROTOCOL_VERSION_3,
                parameters,
            })
            .await
            .unwrap();

        let mut process_id = 0;
        loop {
            let message = framed
                .next()
                .await
                .expect("server closed during startup")
                .unwrap();
            match message {
                BackendMessage::AuthenticationMd5Password { salt } => {
                    let hashed = md5_password(&user, password.unwrap_or_default(), &salt);
                    framed.send(FrontendMessage::Password(hashed)).await.unwrap();
                }
                BackendMessage::BackendKeyData { process_id: pid, .. } => process_id = pid,
                BackendMessage::ErrorResponse { .. } => return Err(message),
                BackendMessage::ReadyForQuery { .. } => break,
                _ => {}
            }
        }

        Ok(Self { framed, process_id })
    }

    /// Sends a simple query and collects the response up to ReadyForQuery.
    pub async fn query(&mut self, sql: &str) -> QueryOutcome {
        self.framed
            .send(FrontendMessage::Query(sql.to_string()))
            .await
            .unwrap();

        let mut outcome = QueryOutcome::default();
        loop {
            let message = self
                .framed
                .next()
                .await
                .expect("server closed during query")
                .unwrap();
            match message {
                BackendMessage::RowDescription { fields } => {
                    outcome.columns = fields.into_iter().map(|f| f.name).collect();
                }
                BackendMessage::DataRow { values } => outcome.rows.push(values),
                BackendMessage::CommandComplete { tag } => outcome.tag = Some(tag),
                BackendMessage::EmptyQueryResponse => outcome.empty = true,
                BackendMessage::ErrorResponse { .. } => outcome.error = Some(message),
                BackendMessage::ReadyForQuery { .. } => return outcome,
                other => panic!("unexpected message during query: {other:?}"),
            }
        }
    }

    pub async fn terminate(mut self) {
        self.framed.send(FrontendMessage::Terminate).await.unwrap();
    }

    /// Waits for the server to close the connection.
    pub async fn expect_closed(&mut self, timeout: Duration) {
        let next = tokio::time::timeout(timeout, self.framed.next())
            .await
            .expect("connection should close within the timeout");
        assert!(
            !matches!(next, Some(Ok(_))),
            "expected end of stream, got {next:?}"
        );
    }
}
