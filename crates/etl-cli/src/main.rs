//! ETL CLI - Main entry point

use clap::Parser;
use etl_cli::{commands, Cli, Commands};
use etl_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // .env values never override variables already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Verbose mode logs debug to the console, otherwise only warnings
    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        })
        .output(LogOutput::Console)
        .log_file_prefix("etl-cli")
        .build();

    // ETL_LOG_* variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok().flatten();

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> anyhow::Result<()> {
    let connection = &cli.connection;

    match &cli.command {
        Commands::Get {
            query,
            limit,
            output,
        } => commands::get::run(connection, query, *limit, output.clone()).await,

        Commands::Delete { query, limit } => commands::delete::run(connection, query, *limit).await,

        Commands::Send {
            file,
            action_type,
            options,
        } => commands::send::run(connection, file, action_type, options).await,

        Commands::Sql {
            file,
            output,
            schema,
            namespace,
            tables,
            chunk_size,
            append,
        } => {
            commands::sql::run(
                file,
                output,
                connection.subservice.as_deref(),
                schema,
                namespace,
                tables,
                *chunk_size,
                *append,
            )
            .await
        }

        Commands::Normalize {
            text,
            replacement,
            overrides,
        } => commands::normalize::run(text, replacement, overrides),
    }
}
