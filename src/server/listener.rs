use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::auth::Authenticator;
use crate::interp::Interpreter;
use crate::server::connection::Connection;
use crate::server::handshake::{Handshake, HandshakeResult};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Listener settings for one service.
#[derive(Clone)]
pub struct ServerOptions {
    /// Service name, attached to every log line of its connections.
    pub name: String,
    pub listen: String,
    pub tls: Option<TlsAcceptor>,
}

impl ServerOptions {
    pub fn new(name: impl Into<String>, listen: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listen: listen.into(),
            tls: None,
        }
    }

    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }
}

/// State shared by every connection of one server.
struct Shared {
    interpreter: Arc<Interpreter>,
    auth: Authenticator,
    tls: Option<TlsAcceptor>,
}

/// TCP server implementing the PostgreSQL wire protocol.
pub struct Server {
    listener: TcpListener,
    name: String,
    next_pid: AtomicI32,
    shared: Arc<Shared>,
}

impl Server {
    /// Binds the listening socket. Port 0 picks a free port.
    pub async fn bind(
        options: ServerOptions,
        interpreter: Arc<Interpreter>,
        auth: Authenticator,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(&options.listen).await?;
        Ok(Self {
            listener,
            name: options.name,
            next_pid: AtomicI32::new(1),
            shared: Arc::new(Shared {
                interpreter,
                auth,
                tls: options.tls,
            }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` is cancelled, then stops
    /// listening and waits for every open connection to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        let tracker = TaskTracker::new();
        info!(
            service = %self.name,
            addr = ?self.listener.local_addr().ok(),
            tls = self.shared.tls.is_some(),
            "listening"
        );

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = shutdown.cancelled() => break,
            };

            let (socket, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(_) if shutdown.is_cancelled() => break,
                Err(e) => {
                    warn!(service = %self.name, error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
            let span = info_span!("connection", service = %self.name, pid, %peer);
            let shared = Arc::clone(&self.shared);
            let shutdown = shutdown.clone();
            tracker.spawn(serve_connection(socket, pid, shared, shutdown).instrument(span));
        }

        drop(self.listener);
        tracker.close();
        debug!(service = %self.name, open = tracker.len(), "draining connections");
        tracker.wait().await;
        info!(service = %self.name, "stopped");
    }
}

async fn serve_connection(
    socket: TcpStream,
    pid: i32,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    info!("accepted");
    if let Err(e) = socket.set_nodelay(true) {
        debug!(error = %e, "failed to set TCP_NODELAY");
    }

    let handshake = Handshake::new(socket, pid, shared.tls.as_ref());
    let outcome = tokio::select! {
        outcome = handshake.run(&shared.auth) => outcome,
        _ = shutdown.cancelled() => {
            debug!("handshake abandoned by shutdown");
            return;
        }
    };
    let (framed, session) = match outcome {
        Ok(HandshakeResult::Success { framed, session, .. }) => (framed, session),
        Ok(HandshakeResult::CancelRequested { pid: target, .. }) => {
            // queries finish synchronously, so there is never anything to cancel
            info!(target_pid = target, "cancel request ignored");
            return;
        }
        Err(e) => {
            warn!(error = %e, "handshake failed");
            return;
        }
    };

    info!(user = %session.user, database = %session.database, "ready");
    let mut connection = Connection::new(framed, pid, session, Arc::clone(&shared.interpreter));
    if let Err(e) = connection.run(shutdown).await {
        warn!(error = %e, "connection error");
    }
    info!("closed");
}
