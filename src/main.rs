//! # Back-office Main Entry Point
//!
//! `backoffice serve | migrate | seed`

use anyhow::Context;
use backoffice::{
    config::ConfigLoader,
    db::{init_pool, run_migrations},
    seeds::{seed_feature_flags, seed_pricing_plans},
    server::run_server,
    telemetry::init_tracing,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "backoffice", version, about = "Multi-tenant SaaS back office")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Apply pending migrations, then serve the HTTP API (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// Apply pending migrations and seed default plans and example flags
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);

    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;
    init_tracing(&config).context("Failed to initialize tracing")?;

    tracing::info!(profile = %config.profile, ?command, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = init_pool(&config).await?;
    run_migrations(&db).await?;

    match command {
        Command::Serve => run_server(config, db).await,
        Command::Migrate => Ok(()),
        Command::Seed => {
            let products = seed_pricing_plans(&db, &config.pricing).await?;
            let flags = seed_feature_flags(&db).await?;
            tracing::info!(products, flags, "Seeding finished");
            Ok(())
        }
    }
}
