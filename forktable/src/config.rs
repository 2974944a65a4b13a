//! Server and session configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::protocol::DEFAULT_MAX_LINE_LENGTH;

/// What a session does with a line it cannot act on: an unparseable line,
/// a message in the wrong state, or an id that does not match the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedLinePolicy {
    /// Log the line and close the connection. Held forks are released.
    #[default]
    Close,
    /// Log the line and carry on in the current state.
    Ignore,
}

impl MalformedLinePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Ignore => "ignore",
        }
    }
}

impl std::fmt::Display for MalformedLinePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown malformed-line policy '{0}', expected 'close' or 'ignore'")]
    UnknownPolicy(String),
}

impl FromStr for MalformedLinePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "close" => Ok(Self::Close),
            "ignore" => Ok(Self::Ignore),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

/// Per-connection behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub on_malformed: MalformedLinePolicy,
    /// Give up on a request that has not been granted within this long.
    /// `None` waits for as long as the connection stays open.
    pub grant_timeout: Option<Duration>,
    pub max_line_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            on_malformed: MalformedLinePolicy::default(),
            grant_timeout: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Number of forks (and seats) at the table.
    pub forks: usize,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 12345,
            forks: 5,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 12345);
        assert_eq!(config.forks, 5);
        assert_eq!(config.addr(), "0.0.0.0:12345");
        assert_eq!(config.session.on_malformed, MalformedLinePolicy::Close);
        assert!(config.session.grant_timeout.is_none());
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("close".parse::<MalformedLinePolicy>(), Ok(MalformedLinePolicy::Close));
        assert_eq!("IGNORE".parse::<MalformedLinePolicy>(), Ok(MalformedLinePolicy::Ignore));
        assert_eq!(
            "drop".parse::<MalformedLinePolicy>(),
            Err(ConfigError::UnknownPolicy("drop".into()))
        );
    }
}
