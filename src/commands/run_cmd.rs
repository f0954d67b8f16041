use clap::Args;

use super::{connect, shutdown_token};
use docsync::config::Config;
use docsync::sync::SyncScheduler;

/// Replicate continuously until interrupted
#[derive(Args)]
pub struct RunCommand {
    /// Override the configured poll interval (seconds)
    #[arg(long)]
    interval: Option<u64>,
}

impl RunCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let cancel = shutdown_token();
        let stores = connect(config, &cancel).await?;

        let mut scheduler_config = config.scheduler_config();
        if let Some(secs) = self.interval {
            scheduler_config.interval = std::time::Duration::from_secs(secs);
        }

        let scheduler = SyncScheduler::new(stores.source, stores.sink, scheduler_config);
        scheduler.run(cancel).await?;
        Ok(())
    }
}
