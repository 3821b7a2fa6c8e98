// Scout research assistant
// Main entry point for the scout binary

use clap::Parser;
use scout_engine::cli::{Cli, Command};
use scout_engine::config::Config;
use scout_engine::handlers::{
    handle_documents, handle_forget, handle_history, handle_index, handle_run, handle_search,
    handle_summaries, handle_summary, handle_tools, OutputFormat,
};
use scout_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_or_create_at(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Scout v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Run {
            query,
            dry_run,
            save,
        } => {
            tracing::info!(dry_run, save, "Researching: {}", query);
            handle_run(query, dry_run, save, &config, format).await
        }

        Command::History { limit, kind } => {
            tracing::info!("Showing last {} records", limit);
            handle_history(limit, kind, &config, format).await
        }

        Command::Search {
            text,
            kind,
            include_forgotten,
            relevance,
            limit,
        } => {
            tracing::info!("Searching memory for: {}", text);
            handle_search(
                text,
                kind,
                include_forgotten,
                relevance,
                limit,
                &config,
                format,
            )
            .await
        }

        Command::Forget { id } => {
            tracing::info!("Forgetting record {}", id);
            handle_forget(id, &config, format).await
        }

        Command::Index { path } => {
            let path = path.unwrap_or_else(|| config.tools.documents.directory.clone());
            tracing::info!("Indexing {}", path.display());
            handle_index(&path, &config, format).await
        }

        Command::Documents => handle_documents(&config, format).await,

        Command::Tools => handle_tools(&config, format).await,

        Command::Summaries => handle_summaries(&config, format),

        Command::Summary { name } => handle_summary(&name, &config, format),
    }
}
