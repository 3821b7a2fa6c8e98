//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Plan and execute a research query
//! - history / search / forget: Inspect and curate memory
//! - index / documents: Manage the local document index
//! - tools: List registered research tools
//! - summaries / summary: Browse saved research summaries

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::conductor::{ManifestEntry, Plan, ResearchSession, RunOptions, RunOutcome, Summary};
use crate::config::Config;
use crate::db::{Database, MemoryFilter, MemoryKind, MemoryRecord};
use crate::llm::gateway::ModelGateway;
use crate::summaries::SummaryArchive;
use crate::tools::documents::DocumentIndex;
use crate::tools::ToolRegistry;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Everything a research run needs, wired from configuration
pub struct Runtime {
    pub database: Database,
    pub gateway: Arc<ModelGateway>,
    pub index: Arc<DocumentIndex>,
    pub registry: Arc<ToolRegistry>,
}

impl Runtime {
    pub async fn open(config: &Config) -> Result<Self> {
        let database = open_database(config).await?;
        let gateway = Arc::new(
            ModelGateway::from_config(&config.model).context("Failed to set up model gateway")?,
        );
        let index = Arc::new(
            DocumentIndex::from_config(config).context("Failed to open document index")?,
        );
        let registry = Arc::new(
            ToolRegistry::from_config(config, Arc::clone(&gateway), Arc::clone(&index))
                .context("Failed to set up tools")?,
        );

        Ok(Self {
            database,
            gateway,
            index,
            registry,
        })
    }

    pub fn session(&self, config: &Config) -> ResearchSession {
        ResearchSession::new(
            config,
            self.database.memory(),
            Arc::clone(&self.gateway),
            Arc::clone(&self.registry),
        )
    }
}

async fn open_database(config: &Config) -> Result<Database> {
    let db_path = config.database_path();
    Database::new(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))
}

/// Research a query
///
/// Ctrl-C stops the run between steps; whatever finished is still
/// summarized and remembered.
pub async fn handle_run(
    query: String,
    dry_run: bool,
    save: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let runtime = Runtime::open(config).await?;
    let session = runtime.session(config);

    let token = session.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            token.cancel();
        }
    });

    let outcome = session.run(&query, RunOptions { dry_run }).await;
    watcher.abort();
    let outcome = outcome.context("Research run failed")?;

    let saved = match (&outcome, save) {
        (RunOutcome::Completed(summary), true) => {
            Some(SummaryArchive::new(config.summaries_dir()).save(summary)?)
        }
        _ => None,
    };

    match format {
        OutputFormat::Text => {
            match &outcome {
                RunOutcome::Planned(plan) => print_plan(plan),
                RunOutcome::Completed(summary) => print_summary(summary),
            }
            if let Some(path) = &saved {
                println!();
                println!("Saved to {}", path.display());
            }
        }
        OutputFormat::Json => {
            let mut output = serde_json::to_value(&outcome)?;
            if let (Some(path), Some(fields)) = (&saved, output.as_object_mut()) {
                fields.insert("saved_to".to_string(), json!(path.display().to_string()));
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    runtime.database.close().await?;
    Ok(())
}

fn print_plan(plan: &Plan) {
    println!("Plan {} ({})", plan.id, plan.origin);
    println!("  Query: {}", plan.query);
    println!();

    for step in &plan.steps {
        println!("{}. {}", step.ordinal + 1, step.action);
        for (name, value) in &step.parameters {
            println!("     {}: {}", name, value);
        }
        if !step.rationale.is_empty() {
            println!("     why: {}", step.rationale);
        }
        let deps = step.dependencies();
        if !deps.is_empty() {
            let deps: Vec<String> = deps.iter().map(|d| (d + 1).to_string()).collect();
            println!("     after: {}", deps.join(", "));
        }
    }
}

fn print_summary(summary: &Summary) {
    println!("{}", summary.text.trim());
    println!();

    if !summary.citations.is_empty() {
        println!("Sources:");
        for citation in &summary.citations {
            match &citation.source {
                Some(source) => println!("  [{}] {} ({})", citation.number, citation.action, source),
                None => println!("  [{}] {}", citation.number, citation.action),
            }
        }
        println!();
    }

    println!("Steps:");
    for entry in &summary.manifest {
        println!("  {}", manifest_line(entry));
    }

    if summary.cancelled {
        println!();
        println!("Run was cancelled; remaining steps were skipped.");
    } else if summary.degraded {
        println!();
        println!("Summary assembled without model synthesis.");
    }
}

fn manifest_line(entry: &ManifestEntry) -> String {
    let mut line = format!(
        "{}. {:<16} {:<9} attempts: {}",
        entry.ordinal + 1,
        entry.action,
        entry.status.to_string(),
        entry.attempts
    );
    if let Some(error) = &entry.error {
        line.push_str(&format!("  error: {}", error));
    }
    line
}

/// Show the most recent memory records
pub async fn handle_history(
    limit: usize,
    kind: Option<MemoryKind>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;

    let mut filter = MemoryFilter::new().limit(limit);
    if let Some(kind) = kind {
        filter = filter.kind(kind);
    }
    let records = database
        .memory()
        .query(&filter)
        .await
        .context("Failed to fetch history")?;

    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No records in memory");
            } else {
                println!("Memory (last {} records):", limit);
                println!();
                print_records(&records);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "records": records,
                "count": records.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await?;
    Ok(())
}

/// Search memory by text
pub async fn handle_search(
    text: String,
    kind: Option<MemoryKind>,
    include_forgotten: bool,
    relevance: bool,
    limit: usize,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;

    let mut filter = MemoryFilter::new().text(text.as_str()).limit(limit);
    if let Some(kind) = kind {
        filter = filter.kind(kind);
    }
    if include_forgotten {
        filter = filter.include_tombstoned();
    }
    if relevance {
        filter = filter.by_relevance();
    }

    let records = database
        .memory()
        .query(&filter)
        .await
        .context("Failed to search memory")?;

    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No records match '{}'", text);
            } else {
                println!("{} record(s) match '{}':", records.len(), text);
                println!();
                print_records(&records);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "query": text,
                "records": records,
                "count": records.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await?;
    Ok(())
}

fn print_records(records: &[MemoryRecord]) {
    for record in records {
        let forgotten = if record.tombstoned { " (forgotten)" } else { "" };
        println!("#{} [{}]{}", record.id, record.kind, forgotten);
        println!("  Created: {}", record.created_at.format("%Y-%m-%d %H:%M:%S"));
        if let Some(source) = record.meta_str("source") {
            println!("  Source: {}", source);
        }
        for line in record.content.lines().take(6) {
            println!("  | {}", line);
        }
        println!();
    }
}

/// Tombstone a memory record
pub async fn handle_forget(id: i64, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let record = database
        .memory()
        .tombstone(id)
        .await
        .with_context(|| format!("Failed to forget record {}", id))?;
    database.close().await?;

    let Some(record) = record else {
        anyhow::bail!("No memory record with id {}", id);
    };

    match format {
        OutputFormat::Text => println!("Forgot record #{} [{}]", record.id, record.kind),
        OutputFormat::Json => {
            let output = json!({ "forgotten": record });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Index a file or directory for document search
pub async fn handle_index(path: &Path, config: &Config, format: OutputFormat) -> Result<()> {
    let gateway = ModelGateway::from_config(&config.model).context("Failed to set up model gateway")?;
    let index = DocumentIndex::from_config(config).context("Failed to open document index")?;

    let documents = index
        .index_path(path, &gateway)
        .await
        .with_context(|| format!("Failed to index {}", path.display()))?;

    match format {
        OutputFormat::Text => {
            if documents.is_empty() {
                println!("No supported documents found under {}", path.display());
            } else {
                for doc in &documents {
                    println!("Indexed {} ({} chunks)", doc.path.display(), doc.chunks);
                }
                println!();
                println!("{} document(s) indexed.", documents.len());
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "documents": documents,
                "count": documents.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// List indexed documents
pub async fn handle_documents(config: &Config, format: OutputFormat) -> Result<()> {
    let index = DocumentIndex::from_config(config).context("Failed to open document index")?;
    let documents = index.list().await;

    match format {
        OutputFormat::Text => {
            if documents.is_empty() {
                println!("No documents indexed. Use 'scout index <path>' to add some.");
                return Ok(());
            }
            println!("Indexed documents ({}):", documents.len());
            println!();
            for doc in &documents {
                let short_id: String = doc.id.chars().take(12).collect();
                println!("  {}  {} [{}]", short_id, doc.filename, doc.file_type);
                println!(
                    "    {} bytes, {} chunks, indexed {}",
                    doc.size_bytes,
                    doc.chunks,
                    doc.indexed_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "documents": documents,
                "count": documents.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// List registered research tools
pub async fn handle_tools(config: &Config, format: OutputFormat) -> Result<()> {
    let gateway = Arc::new(
        ModelGateway::from_config(&config.model).context("Failed to set up model gateway")?,
    );
    let index = Arc::new(DocumentIndex::from_config(config).context("Failed to open document index")?);
    let provider = gateway.primary_name().to_string();
    let model_healthy = gateway.check_health().await;
    let registry = ToolRegistry::from_config(config, gateway, index).context("Failed to set up tools")?;
    let capabilities = registry.capabilities();

    match format {
        OutputFormat::Text => {
            let health = if model_healthy { "reachable" } else { "not responding" };
            println!("Model provider: {} ({})", provider, health);
            println!();
            println!("Available tools ({}):", capabilities.len());
            println!();
            for cap in &capabilities {
                println!("  {}", cap.action);
                println!("    {}", cap.description);
                for param in &cap.parameters {
                    let required = if param.required { "required" } else { "optional" };
                    println!(
                        "      {} ({}, {}): {}",
                        param.name,
                        param.kind.as_str(),
                        required,
                        param.description
                    );
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "model": {"provider": provider, "healthy": model_healthy},
                "tools": capabilities,
                "count": capabilities.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// List saved summaries, newest first
pub fn handle_summaries(config: &Config, format: OutputFormat) -> Result<()> {
    let archive = SummaryArchive::new(config.summaries_dir());
    let summaries = archive.list()?;

    match format {
        OutputFormat::Text => {
            if summaries.is_empty() {
                println!("No saved summaries in {}", archive.dir().display());
                return Ok(());
            }
            println!("Saved summaries ({}):", summaries.len());
            println!();
            for saved in &summaries {
                println!("{}", summary_line(&saved.name, saved.date.as_deref(), saved.query.as_deref()));
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = summaries
                .iter()
                .map(|s| json!({"name": s.name, "date": s.date, "query": s.query}))
                .collect();
            let output = json!({
                "summaries": entries,
                "count": entries.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Show one saved summary
pub fn handle_summary(name: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let saved = SummaryArchive::new(config.summaries_dir()).load(name)?;

    match format {
        OutputFormat::Text => {
            println!("Summary: {}", saved.name);
            for (key, value) in &saved.metadata {
                println!("  {}: {}", key, value);
            }
            println!();
            println!("{}", saved.body);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&saved)?),
    }
    Ok(())
}

fn summary_line(name: &str, date: Option<&str>, query: Option<&str>) -> String {
    let query = query.unwrap_or("unknown query");
    let query = if query.chars().count() > 50 {
        format!("{}...", query.chars().take(50).collect::<String>())
    } else {
        query.to_string()
    };
    format!("  {:<40} {:<19}  {}", name, date.unwrap_or("unknown date"), query)
}
