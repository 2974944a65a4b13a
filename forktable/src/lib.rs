//! forktable: a centralized fork arbiter for networked dining philosophers.
//!
//! Philosophers connect over TCP and speak a line protocol (`REQUEST <id>`,
//! `DONE <id>`, `GRANTED`). A single [`Arbiter`] owns the ring of forks and
//! grants each philosopher its two adjacent forks atomically, so allocation
//! is race-free and deadlock-free by construction.

pub mod arbiter;
pub mod client;
pub mod config;
pub mod listener;
pub mod logging;
pub mod protocol;
pub mod session;

pub use arbiter::{Arbiter, ArbiterError, ForkGrant, PhilosopherId, TableSnapshot};
pub use client::{ClientError, PhilosopherClient};
pub use config::{ConfigError, MalformedLinePolicy, ServerConfig, SessionConfig};
pub use listener::{TableServer, serve};
pub use session::{ConnectionId, ProtocolError, Session, SessionError, SessionState};
