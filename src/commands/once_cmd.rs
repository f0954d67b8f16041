use clap::Args;

use super::{connect, shutdown_token, CommandError, OutputFormat};
use docsync::config::Config;
use docsync::sync::{CycleReport, SyncScheduler};

/// Run a single sync cycle and print its report
#[derive(Args)]
pub struct OnceCommand {
    /// Exit with an error if any document or column failed
    #[arg(long)]
    strict: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl OnceCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let cancel = shutdown_token();
        let stores = connect(config, &cancel).await?;
        let scheduler = SyncScheduler::new(stores.source, stores.sink, config.scheduler_config());

        let report = scheduler.run_cycle(&cancel).await?;
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => print!("{}", report),
        }

        if self.strict && report.has_failures() {
            return Err(CommandError::CycleFailed(failure_count(&report)).into());
        }
        Ok(())
    }
}

fn failure_count(report: &CycleReport) -> usize {
    report.document_failures().count()
        + report.schema_failures().count()
        + report
            .collections
            .iter()
            .filter(|c| c.aborted.is_some())
            .count()
}
