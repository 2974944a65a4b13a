//! philosopher: the think/eat loop of one diner at a forktable.

use std::str::FromStr;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::info;

use forktable::{ClientError, PhilosopherClient, PhilosopherId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DelayRangeError {
    #[error("expected '<min>..<max>' in milliseconds, got '{0}'")]
    Syntax(String),
    #[error("range start {min} is after its end {max}")]
    Inverted { min: u64, max: u64 },
}

/// Inclusive range of milliseconds to sleep, sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min_ms: u64,
    max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Result<Self, DelayRangeError> {
        if min_ms > max_ms {
            return Err(DelayRangeError::Inverted {
                min: min_ms,
                max: max_ms,
            });
        }
        Ok(Self { min_ms, max_ms })
    }

    pub fn sample(&self) -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }
}

impl Default for DelayRange {
    /// One to three seconds.
    fn default() -> Self {
        Self {
            min_ms: 1000,
            max_ms: 3000,
        }
    }
}

impl std::fmt::Display for DelayRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.min_ms, self.max_ms)
    }
}

impl FromStr for DelayRange {
    type Err = DelayRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || DelayRangeError::Syntax(s.to_string());
        let (min, max) = s.split_once("..").ok_or_else(syntax)?;
        let min = min.trim().parse().map_err(|_| syntax())?;
        let max = max.trim().parse().map_err(|_| syntax())?;
        Self::new(min, max)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DinerConfig {
    pub think: DelayRange,
    pub eat: DelayRange,
    /// Stop after this many meals; `None` dines until shut down.
    pub meals: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DinerReport {
    pub meals: u64,
    /// Total time spent between asking for forks and getting them.
    pub waited: Duration,
    /// Shut down with a request still outstanding.
    pub abandoned_request: bool,
}

/// Think, request forks, eat, put them down; repeat.
///
/// Returns when the meal limit is reached or `shutdown` is cancelled. A
/// shutdown mid-meal puts the forks down before returning. A shutdown while
/// a request is pending returns with `abandoned_request` set: the grant may
/// still be on its way, so the caller must drop the client, and the server
/// frees the forks when the connection closes.
pub async fn dine<T>(
    client: &mut PhilosopherClient<T>,
    config: &DinerConfig,
    shutdown: &CancellationToken,
) -> Result<DinerReport, ClientError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let id: PhilosopherId = client.philosopher();
    let mut report = DinerReport::default();

    while config.meals.is_none_or(|limit| report.meals < limit) {
        info!(philosopher = %id, "Thinking");
        tokio::select! {
            _ = tokio::time::sleep(config.think.sample()) => {}
            _ = shutdown.cancelled() => break,
        }

        info!(philosopher = %id, "Hungry, waiting for forks");
        let asked = Instant::now();
        tokio::select! {
            granted = client.request() => granted?,
            _ = shutdown.cancelled() => {
                report.abandoned_request = true;
                break;
            }
        }
        report.waited += asked.elapsed();

        info!(philosopher = %id, "Eating");
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(config.eat.sample()) => false,
            _ = shutdown.cancelled() => true,
        };

        client.release().await?;
        info!(philosopher = %id, "Done eating, forks down");
        if interrupted {
            break;
        }
        report.meals += 1;
    }

    Ok(report)
}
