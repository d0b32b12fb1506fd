//! # Keeper Main Entry Point
//!
//! `keeper serve` (the default) runs the API and the periodic sweep; `keeper sweep`
//! performs a single pass; `keeper migrate` only applies the schema.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keeper::{config::ConfigLoader, db, server, sweep::SweepJob, telemetry};

#[derive(Parser)]
#[command(name = "keeper")]
#[command(about = "Dead-man's-switch monitoring for periodically reporting jobs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the periodic sweep
    Serve,
    /// Run one sweep pass and exit
    Sweep {
        /// Only count overdue ponies; change nothing and send nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing telemetry")?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let pool = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    db::health_check(&pool).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            db::run_migrations(&pool).await?;
            server::run_server(config, pool).await
        }
        Command::Sweep { dry_run } => {
            let started = Instant::now();
            let service = server::build_service(&config, pool)?;
            let job = SweepJob::new(
                service.clone(),
                config.sweep.grace_minutes,
                config.sweep.interval(),
            );

            let report = job.sweep(dry_run).await.context("running sweep")?;

            // Let queued notifications go out before the process exits.
            if tokio::time::timeout(Duration::from_secs(30), service.runner().wait_idle())
                .await
                .is_err()
            {
                tracing::warn!(
                    pending = service.runner().in_flight(),
                    "Exiting with undelivered notifications"
                );
            }

            println!("total ponies: {}", report.total);
            println!(
                "missing ponies: {}{}",
                report.missing,
                if dry_run { " (dry run)" } else { "" }
            );
            if report.failed > 0 {
                println!("failed ponies: {}", report.failed);
            }
            println!("execution time: {:.3}s", started.elapsed().as_secs_f64());
            Ok(())
        }
        Command::Migrate => db::run_migrations(&pool).await,
    }
}
