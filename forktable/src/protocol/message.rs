//! Wire messages.
//!
//! ```text
//! client -> server   REQUEST <id>
//! client -> server   DONE <id>        (RELEASE <id> is accepted too)
//! server -> client   GRANTED
//! ```

use std::fmt;
use std::str::FromStr;

use crate::arbiter::PhilosopherId;

/// A line the codec could not turn into a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("{0} is missing a philosopher id")]
    MissingId(&'static str),
    #[error("invalid philosopher id '{0}'")]
    InvalidId(String),
    #[error("unexpected trailing input '{0}'")]
    TrailingInput(String),
}

/// Messages a philosopher sends to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    Request(PhilosopherId),
    Release(PhilosopherId),
}

impl ClientMessage {
    pub const REQUEST: &'static str = "REQUEST";
    pub const RELEASE: &'static str = "DONE";
    const RELEASE_ALIAS: &'static str = "RELEASE";

    pub fn philosopher(&self) -> PhilosopherId {
        match self {
            Self::Request(id) | Self::Release(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => Self::REQUEST,
            Self::Release(_) => Self::RELEASE,
        }
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.philosopher())
    }
}

impl FromStr for ClientMessage {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_ascii_whitespace();
        let command = tokens.next().ok_or(ParseError::Empty)?;
        let (kind, build): (&'static str, fn(PhilosopherId) -> Self) = match command {
            Self::REQUEST => (Self::REQUEST, Self::Request),
            Self::RELEASE | Self::RELEASE_ALIAS => (Self::RELEASE, Self::Release),
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };

        let raw_id = tokens.next().ok_or(ParseError::MissingId(kind))?;
        let id = raw_id
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidId(raw_id.to_string()))?;

        if let Some(extra) = tokens.next() {
            return Err(ParseError::TrailingInput(extra.to_string()));
        }

        Ok(build(PhilosopherId::new(id)))
    }
}

/// Messages the table sends to a philosopher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    /// Both forks are now held by the requesting philosopher.
    Granted,
}

impl ServerMessage {
    pub const GRANTED: &'static str = "GRANTED";
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted => f.write_str(Self::GRANTED),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim() {
            "" => Err(ParseError::Empty),
            Self::GRANTED => Ok(Self::Granted),
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> PhilosopherId {
        PhilosopherId::new(n)
    }

    #[test]
    fn parses_request_and_release() {
        assert_eq!("REQUEST 3".parse::<ClientMessage>(), Ok(ClientMessage::Request(id(3))));
        assert_eq!("DONE 3".parse::<ClientMessage>(), Ok(ClientMessage::Release(id(3))));
        assert_eq!("RELEASE 0".parse::<ClientMessage>(), Ok(ClientMessage::Release(id(0))));
        assert_eq!("  REQUEST\t4  ".parse::<ClientMessage>(), Ok(ClientMessage::Request(id(4))));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!("".parse::<ClientMessage>(), Err(ParseError::Empty));
        assert_eq!("   ".parse::<ClientMessage>(), Err(ParseError::Empty));
        assert_eq!(
            "request 1".parse::<ClientMessage>(),
            Err(ParseError::UnknownCommand("request".into()))
        );
        assert_eq!(
            "REQUEST".parse::<ClientMessage>(),
            Err(ParseError::MissingId("REQUEST"))
        );
        assert_eq!(
            "DONE -1".parse::<ClientMessage>(),
            Err(ParseError::InvalidId("-1".into()))
        );
        assert_eq!(
            "REQUEST 1 2".parse::<ClientMessage>(),
            Err(ParseError::TrailingInput("2".into()))
        );
    }

    #[test]
    fn client_messages_render_canonical_lines() {
        assert_eq!(ClientMessage::Request(id(2)).to_string(), "REQUEST 2");
        assert_eq!(ClientMessage::Release(id(2)).to_string(), "DONE 2");
    }

    #[test]
    fn server_grant_line() {
        assert_eq!(ServerMessage::Granted.to_string(), "GRANTED");
        assert_eq!("GRANTED".parse::<ServerMessage>(), Ok(ServerMessage::Granted));
        assert!("DENIED".parse::<ServerMessage>().is_err());
    }
}
