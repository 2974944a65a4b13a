//! Client side of the table protocol.
//!
//! A well-formed philosopher alternates `request` and `release`, always with
//! its own id, and never sends anything while a request is pending.

use std::io;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::arbiter::PhilosopherId;
use crate::protocol::{ClientCodec, ClientMessage, ParseError, ServerMessage};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error("server closed the connection")]
    ConnectionClosed,
    #[error("unexpected reply from server: {0}")]
    UnexpectedReply(#[from] ParseError),
}

/// Connection to the table for one philosopher.
pub struct PhilosopherClient<T = TcpStream> {
    framed: Framed<T, ClientCodec>,
    philosopher: PhilosopherId,
}

impl PhilosopherClient<TcpStream> {
    pub async fn connect(addr: impl ToSocketAddrs, philosopher: PhilosopherId) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream, philosopher))
    }
}

impl<T> PhilosopherClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn from_stream(io: T, philosopher: PhilosopherId) -> Self {
        Self {
            framed: Framed::new(io, ClientCodec::new()),
            philosopher,
        }
    }

    pub fn philosopher(&self) -> PhilosopherId {
        self.philosopher
    }

    /// Ask for both forks and wait until the server grants them.
    pub async fn request(&mut self) -> Result<(), ClientError> {
        self.framed
            .send(ClientMessage::Request(self.philosopher))
            .await?;
        self.await_grant().await
    }

    /// Wait for the `GRANTED` reply to a request already sent.
    pub async fn await_grant(&mut self) -> Result<(), ClientError> {
        match self.framed.next().await {
            Some(reply) => match reply?? {
                ServerMessage::Granted => Ok(()),
            },
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Put both forks down. The server sends no acknowledgement.
    pub async fn release(&mut self) -> Result<(), ClientError> {
        self.framed
            .send(ClientMessage::Release(self.philosopher))
            .await?;
        Ok(())
    }
}
