use std::time::Duration;

use clap::Parser;
use tracing::info;

use forktable::config::{MalformedLinePolicy, ServerConfig, SessionConfig};
use forktable::logging::init_tracing;
use forktable::protocol::DEFAULT_MAX_LINE_LENGTH;

/// Centralized fork arbiter for networked dining philosophers.
#[derive(Debug, Parser)]
#[command(name = "forktable", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "FORKTABLE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, short, env = "FORKTABLE_PORT", default_value_t = 12345)]
    port: u16,

    /// Number of forks (and philosopher seats) at the table.
    #[arg(long, short, env = "FORKTABLE_FORKS", default_value_t = 5)]
    forks: usize,

    /// What to do with lines the session cannot act on: close or ignore.
    #[arg(long, env = "FORKTABLE_ON_MALFORMED", default_value_t = MalformedLinePolicy::Close)]
    on_malformed: MalformedLinePolicy,

    /// Close a session whose request is not granted within this many milliseconds.
    #[arg(long, env = "FORKTABLE_GRANT_TIMEOUT_MS")]
    grant_timeout_ms: Option<u64>,

    /// Longest accepted protocol line, in bytes.
    #[arg(long, env = "FORKTABLE_MAX_LINE_LENGTH", default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    max_line_length: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            forks: args.forks,
            session: SessionConfig {
                on_malformed: args.on_malformed,
                grant_timeout: args.grant_timeout_ms.map(Duration::from_millis),
                max_line_length: args.max_line_length,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    info!("forktable {}", env!("CARGO_PKG_VERSION"));

    forktable::serve(args.into()).await
}
