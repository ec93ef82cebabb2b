use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use migrate_harness::{config, gha, orchestrate, registry};

#[derive(Parser, Debug)]
#[command(name = "migrate-harness")]
#[command(about = "Registry-resolved database migration runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve + cache the migration CLI and apply migrations to every
    /// configured database.
    Run,

    /// Resolve the configured version selector and print the result.
    Resolve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::HarnessConfig::from_env().context("load harness config")?;

    match cli.command {
        Command::Run => {
            let reporter = gha::WorkflowReporter::from_env();
            let result = orchestrate::run(&cfg, &reporter).await?;
            if result.any_failed {
                tracing::error!(
                    event = "harness.run.failed",
                    failed = result.outcomes.iter().filter(|o| !o.succeeded).count(),
                    total = result.outcomes.len(),
                    "one or more migrations failed"
                );
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Resolve => {
            let client = registry::RegistryClient::new(&cfg.registry_url);
            let resolved = client.resolve(&cfg.tool_package, &cfg.tool_version).await?;
            println!("{} {}", resolved.version, resolved.tarball_url);
            Ok(())
        }
    }
}
