//! unidb - Main entry point.
//!
//! Loads adapter settings for the selected environment, runs one command
//! against them and shuts every adapter down before exiting.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use unidb::config::{Command, Config, DatabaseSettings};
use unidb::db::DatabaseManager;
use unidb::error::DbResult;
use unidb::models::QueryParam;

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // stdout carries command output; logs go to stderr.
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> DbResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| unidb::DbError::invalid_query(format!("Failed to encode output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Run the selected command. Returns whether it succeeded from the user's
/// point of view (an unhealthy adapter is not an error, but exits non-zero).
async fn run(manager: &DatabaseManager, command: Command) -> DbResult<bool> {
    match command {
        Command::Health => {
            let health = manager.health_check().await;
            print_json(&health)?;
            Ok(health.overall_health)
        }
        Command::Query { sql, params, main } => {
            let params: Vec<QueryParam> = params
                .iter()
                .map(|p| QueryParam::parse_literal(p))
                .collect();
            let result = manager.smart_query(&sql, &params, main).await?;
            print_json(&result)?;
            Ok(true)
        }
        Command::Schema { table, adapter } => {
            let adapter = manager.get_adapter(adapter.as_deref()).await?;
            let columns = adapter.get_schema(&table).await?;
            print_json(&columns)?;
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_tracing(&config);

    info!(
        environment = %config.environment,
        "Starting unidb v{}",
        env!("CARGO_PKG_VERSION")
    );

    let settings = match DatabaseSettings::from_env(config.environment) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid database configuration");
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let manager = DatabaseManager::new();
    let outcome = match manager.initialize(&settings).await {
        Ok(()) => run(&manager, config.command).await,
        Err(e) => Err(e),
    };

    manager.shutdown().await;

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, code = e.code(), "Command failed");
            eprintln!("Error: {}", e);
            if let Some(hint) = e.suggestion() {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}
