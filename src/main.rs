//! Hearsay CLI entry point.

use anyhow::Result;
use clap::Parser;
use hearsay::cli::{commands, Cli, Commands};
use hearsay::config::Settings;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("hearsay={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let config_path = cli.config.as_ref().map(PathBuf::from);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Ensure data directory exists
    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match &cli.command {
        Commands::Ingest {
            path,
            id,
            title,
            show,
            force,
        } => {
            commands::run_ingest(path, id.clone(), title.clone(), show.clone(), *force, settings)
                .await?;
        }

        Commands::Ask {
            document_id,
            question,
            model,
            limit,
            no_rewrite,
            json,
        } => {
            commands::run_ask(
                document_id,
                question,
                model.clone(),
                *limit,
                *no_rewrite,
                *json,
                settings,
            )
            .await?;
        }

        Commands::Search {
            document_id,
            query,
            limit,
            min_rank,
            json,
        } => {
            commands::run_search(document_id, query, *limit, *min_rank, *json, settings).await?;
        }

        Commands::Chat {
            document_id,
            model,
            speakers,
        } => {
            commands::run_chat(document_id, model.clone(), speakers.clone(), settings).await?;
        }

        Commands::List => {
            commands::run_list(settings).await?;
        }

        Commands::Quality { path } => {
            commands::run_quality(path, &settings)?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, config_path, settings)?;
        }
    }

    Ok(())
}
