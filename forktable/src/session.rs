//! Per-connection protocol state machine.
//!
//! ```text
//! Idle --REQUEST--> Waiting --granted--> Holding --DONE--> Idle
//!   any state --disconnect / error / shutdown--> Closed
//! ```
//!
//! The session binds to the philosopher id of its first accepted `REQUEST`.
//! A session that closes while `Holding` drops its [`ForkGrant`], which puts
//! the forks back on the table.

use std::io;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::arbiter::{Arbiter, ArbiterError, ForkGrant, PhilosopherId};
use crate::config::{MalformedLinePolicy, SessionConfig};
use crate::protocol::{ClientMessage, ParseError, ServerCodec, ServerMessage};

/// Unique identifier for a client connection.
///
/// UUID v4 keeps connection identity distinct from philosopher ids in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Waiting,
    Holding,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Holding => "holding",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line the session cannot act on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed line: {0}")]
    Malformed(#[from] ParseError),
    #[error("{message} is not allowed while {state}")]
    OutOfState {
        message: &'static str,
        state: SessionState,
    },
    #[error("session is bound to philosopher {bound}, line names {got}")]
    IdentityMismatch {
        bound: PhilosopherId,
        got: PhilosopherId,
    },
    #[error(transparent)]
    Seat(ArbiterError),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),
    #[error("no forks granted within {0:?}")]
    GrantTimeout(Duration),
}

/// One philosopher connection.
pub struct Session {
    arbiter: Arbiter,
    config: SessionConfig,
    shutdown: CancellationToken,
    state: SessionState,
    philosopher: Option<PhilosopherId>,
    grant: Option<ForkGrant>,
}

impl Session {
    pub fn new(arbiter: Arbiter, config: SessionConfig, shutdown: CancellationToken) -> Self {
        Self {
            arbiter,
            config,
            shutdown,
            state: SessionState::Idle,
            philosopher: None,
            grant: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The philosopher this session is bound to, once it has made a request.
    pub fn philosopher(&self) -> Option<PhilosopherId> {
        self.philosopher
    }

    /// Drive the protocol until the peer hangs up, an error closes the
    /// session, or the server shuts down. Always ends in `Closed` with no
    /// forks held.
    pub async fn run<T>(&mut self, io: T) -> Result<(), SessionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(io, ServerCodec::with_max_length(self.config.max_line_length));
        let result = self.serve(&mut framed).await;
        self.close(&result);
        result
    }

    async fn serve<T>(&mut self, framed: &mut Framed<T, ServerCodec>) -> Result<(), SessionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let frame = tokio::select! {
                frame = framed.next() => frame,
                _ = self.shutdown.cancelled() => {
                    debug!("Server shutting down");
                    return Ok(());
                }
            };

            let Some(frame) = frame else {
                debug!(state = %self.state, "Peer disconnected");
                return Ok(());
            };

            let message = match frame? {
                Ok(message) => message,
                Err(e) => {
                    self.reject(e.into())?;
                    continue;
                }
            };

            match message {
                ClientMessage::Request(id) => {
                    if let Err(e) = self.begin_request(id) {
                        self.reject(e)?;
                        continue;
                    }
                    if !self.wait_for_grant(framed, id).await? {
                        return Ok(());
                    }
                    framed.send(ServerMessage::Granted).await?;
                }
                ClientMessage::Release(id) => {
                    if let Err(e) = self.release(id) {
                        self.reject(e)?;
                    }
                }
            }
        }
    }

    /// Validate a request and move to `Waiting`.
    fn begin_request(&mut self, id: PhilosopherId) -> Result<(), ProtocolError> {
        if self.state != SessionState::Idle {
            return Err(ProtocolError::OutOfState {
                message: ClientMessage::REQUEST,
                state: self.state,
            });
        }
        if let Some(bound) = self.philosopher
            && bound != id
        {
            return Err(ProtocolError::IdentityMismatch { bound, got: id });
        }
        self.arbiter.pair_of(id).map_err(ProtocolError::Seat)?;

        if self.philosopher.is_none() {
            debug!(philosopher = %id, "Session bound to philosopher");
            self.philosopher = Some(id);
        }
        self.state = SessionState::Waiting;
        Ok(())
    }

    /// Block until the arbiter grants the pair. Keeps reading the connection
    /// meanwhile so a vanished peer abandons the wait.
    ///
    /// Returns `Ok(false)` if the wait was abandoned (hangup or shutdown).
    async fn wait_for_grant<T>(
        &mut self,
        framed: &mut Framed<T, ServerCodec>,
        id: PhilosopherId,
    ) -> Result<bool, SessionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let arbiter = self.arbiter.clone();
        let acquire = arbiter.acquire_within(id, self.config.grant_timeout);
        tokio::pin!(acquire);

        loop {
            tokio::select! {
                granted = &mut acquire => {
                    let grant = granted.map_err(|e| match e {
                        ArbiterError::Timeout(limit) => SessionError::GrantTimeout(limit),
                        other => ProtocolError::Seat(other).into(),
                    })?;
                    self.grant = Some(grant);
                    self.state = SessionState::Holding;
                    return Ok(true);
                }
                frame = framed.next() => {
                    let Some(frame) = frame else {
                        info!(philosopher = %id, "Peer disconnected while waiting for forks");
                        return Ok(false);
                    };
                    let violation = match frame? {
                        Ok(message) => ProtocolError::OutOfState {
                            message: message.kind(),
                            state: self.state,
                        },
                        Err(e) => e.into(),
                    };
                    self.reject(violation)?;
                }
                _ = self.shutdown.cancelled() => {
                    debug!(philosopher = %id, "Server shutting down, abandoning wait");
                    return Ok(false);
                }
            }
        }
    }

    fn release(&mut self, id: PhilosopherId) -> Result<(), ProtocolError> {
        if self.state != SessionState::Holding {
            return Err(ProtocolError::OutOfState {
                message: ClientMessage::RELEASE,
                state: self.state,
            });
        }
        if let Some(bound) = self.philosopher
            && bound != id
        {
            return Err(ProtocolError::IdentityMismatch { bound, got: id });
        }
        if let Some(grant) = self.grant.take() {
            grant.release();
        }
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Apply the malformed-line policy to a protocol violation.
    fn reject(&self, violation: ProtocolError) -> Result<(), SessionError> {
        match self.config.on_malformed {
            MalformedLinePolicy::Ignore => {
                warn!(state = %self.state, error = %violation, "Ignoring protocol violation");
                Ok(())
            }
            MalformedLinePolicy::Close => Err(violation.into()),
        }
    }

    fn close(&mut self, result: &Result<(), SessionError>) {
        if let Some(grant) = self.grant.take() {
            info!(philosopher = %grant.philosopher(), "Releasing forks of closing session");
            grant.release();
        }
        let from = self.state;
        self.state = SessionState::Closed;

        match result {
            Ok(()) => debug!(from = %from, "Session closed"),
            Err(e) => warn!(from = %from, error = %e, "Session closed"),
        }
    }
}
