use anyhow::{Context, Result};
use clap::Parser;
use scanhive_common::Config;

/// Applies every pending schema migration under `migrations/` and exits.
/// Run this before starting `scanhive-server` — the server never runs
/// migrations itself on startup, it only refuses to start against a
/// schema it doesn't recognize.
#[derive(Parser)]
#[command(name = "scanhive-migrate", about = "Applies Scan Orchestrator schema migrations")]
struct Cli {
    /// Print which migrations would run without applying them.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    scanhive_common::telemetry::init()?;

    let cli = Cli::parse();
    let config = Config::migrate_from_env();
    config.log_redacted();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.database_url)
        .await
        .context("connecting to database for migration")?;

    if cli.dry_run {
        let migrator = sqlx::migrate!("../../migrations");
        let names: Vec<&str> = migrator.migrations.iter().map(|m| m.description.as_ref()).collect();
        tracing::info!(count = names.len(), migrations = ?names, "dry run, no changes applied");
        return Ok(());
    }

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("running migrations")?;

    tracing::info!("migrations applied");
    Ok(())
}
