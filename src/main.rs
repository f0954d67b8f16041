use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{CollectionsCommand, ConfigCommand, InspectCommand, OnceCommand, RunCommand};
use docsync::config::Config;

#[derive(Parser)]
#[command(name = "docsync")]
#[command(version)]
#[command(about = "Replicates MongoDB collections into relational tables", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replicate continuously until interrupted
    Run(RunCommand),

    /// Run a single sync cycle
    Once(OnceCommand),

    /// List source collections
    Collections(CollectionsCommand),

    /// Preview the columns for a collection
    Inspect(InspectCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so report output on stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Run(cmd)) => cmd.run(&config).await?,
        Some(Commands::Once(cmd)) => cmd.run(&config).await?,
        Some(Commands::Collections(cmd)) => cmd.run(&config).await?,
        Some(Commands::Inspect(cmd)) => cmd.run(&config).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config, cli_config_path)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
