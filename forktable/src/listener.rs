//! TCP listener: one session task per accepted connection.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::arbiter::Arbiter;
use crate::config::{ServerConfig, SessionConfig};
use crate::session::{ConnectionId, Session};

/// Pause after a failed accept (e.g. out of file descriptors) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound table server.
pub struct TableServer {
    listener: TcpListener,
    arbiter: Arbiter,
    session: SessionConfig,
}

impl TableServer {
    /// Bind the listening socket and set the table with all forks free.
    pub async fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let arbiter = Arbiter::new(config.forks)?;
        let listener = TcpListener::bind(config.addr()).await?;
        Ok(Self {
            listener,
            arbiter,
            session: config.session.clone(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    /// Accept connections until `shutdown` is cancelled, then cancel every
    /// session and wait for them to put their forks down.
    pub async fn run(self, shutdown: CancellationToken) {
        let addr = self
            .listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        info!(
            addr = %addr,
            forks = self.arbiter.forks(),
            on_malformed = %self.session.on_malformed,
            grant_timeout = ?self.session.grant_timeout,
            "Table open"
        );

        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.spawn_session(&mut sessions, stream, peer, shutdown.child_token());
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Session task failed");
                    }
                }
            }
        }

        info!(sessions = sessions.len(), "Closing table, draining sessions");
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Session task failed");
            }
        }

        let snapshot = self.arbiter.snapshot();
        info!(
            free_forks = snapshot.free_forks(),
            diners = snapshot.diners().len(),
            "Table closed"
        );
    }

    fn spawn_session(
        &self,
        sessions: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: CancellationToken,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let conn = ConnectionId::new();
        let span = info_span!("session", conn = %conn, peer = %peer);
        let mut session = Session::new(self.arbiter.clone(), self.session.clone(), shutdown);

        sessions.spawn(
            async move {
                info!("Philosopher connected");
                // Errors are logged by the session on close; other sessions carry on.
                let _ = session.run(stream).await;
            }
            .instrument(span),
        );
    }
}

/// Bind and serve until SIGINT/SIGTERM.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let server = TableServer::bind(&config).await?;
    let shutdown = CancellationToken::new();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    server.run(shutdown).await;
    info!("Server shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed, which only happens when the
/// tokio runtime is misconfigured. That should fail fast at startup.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler - is tokio runtime configured correctly?");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler - is tokio runtime configured correctly?")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
