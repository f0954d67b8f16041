mod collections_cmd;
mod config_cmd;
mod inspect_cmd;
mod once_cmd;
mod run_cmd;

pub use collections_cmd::CollectionsCommand;
pub use config_cmd::ConfigCommand;
pub use inspect_cmd::InspectCommand;
pub use once_cmd::OnceCommand;
pub use run_cmd::RunCommand;

use std::sync::Arc;

use clap::ValueEnum;
use tokio_util::sync::CancellationToken;

use docsync::config::Config;
use docsync::db::{connect_sink, RelationalSink, SinkError};
use docsync::retrying::{RetryingSink, RetryingSource};
use docsync::source::{DocumentSource, MongoSource, SourceError};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Error type for commands
#[derive(Debug)]
pub enum CommandError {
    Source(SourceError),
    Sink(SinkError),
    /// A strict single cycle finished with failures.
    CycleFailed(usize),
}

impl From<SourceError> for CommandError {
    fn from(e: SourceError) -> Self {
        CommandError::Source(e)
    }
}

impl From<SinkError> for CommandError {
    fn from(e: SinkError) -> Self {
        CommandError::Sink(e)
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Source(e) => write!(f, "{}", e),
            CommandError::Sink(e) => write!(f, "{}", e),
            CommandError::CycleFailed(n) => write!(f, "Sync cycle finished with {} failure(s)", n),
        }
    }
}

impl std::error::Error for CommandError {}

/// Source and sink connected from the configuration.
pub struct Stores {
    pub source: Arc<dyn DocumentSource>,
    pub sink: Arc<dyn RelationalSink>,
}

/// Connects both stores, failing fast if either is unreachable.
///
/// Calls after the initial connection are retried on connection errors
/// according to the configured policy.
pub async fn connect(config: &Config, cancel: &CancellationToken) -> Result<Stores, CommandError> {
    let source = MongoSource::connect(
        &config.source_uri.value,
        config.source_database.value.as_deref(),
    )
    .await?;
    let sink = connect_sink(&config.sink_uri.value).await?;

    let policy = config.retry.policy();
    Ok(Stores {
        source: Arc::new(RetryingSource::new(
            Arc::new(source),
            policy.clone(),
            cancel.clone(),
        )),
        sink: Arc::new(RetryingSink::new(sink, policy, cancel.clone())),
    })
}

/// A token cancelled on ctrl-c.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, finishing current write");
            trigger.cancel();
        }
    });
    token
}
