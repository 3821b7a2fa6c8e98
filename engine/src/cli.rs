//! CLI interface for Scout
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::db::MemoryKind;

/// Scout research assistant
///
/// Turns a question into a research plan, runs it against web and local
/// document tools, and answers with citations. Findings are remembered across
/// sessions.
#[derive(Parser, Debug)]
#[command(name = "scout")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Research a query and print a cited summary
    Run {
        /// The research query
        query: String,

        /// Print the plan without executing it
        #[arg(long)]
        dry_run: bool,

        /// Save the summary as markdown under the data directory
        #[arg(long, conflicts_with = "dry_run")]
        save: bool,
    },

    /// Show recent memory records
    History {
        /// Number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Only show records of this kind (conversation, fact, document_reference)
        #[arg(short, long)]
        kind: Option<MemoryKind>,
    },

    /// Search memory
    Search {
        /// Text to look for
        text: String,

        /// Only search records of this kind
        #[arg(short, long)]
        kind: Option<MemoryKind>,

        /// Include forgotten (tombstoned) records
        #[arg(long)]
        include_forgotten: bool,

        /// Rank by relevance instead of recency
        #[arg(long)]
        relevance: bool,

        /// Maximum number of records
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Forget a memory record (it stays in the audit log)
    Forget {
        /// Record id
        id: i64,
    },

    /// Index a file or directory for document search
    Index {
        /// File or directory to index (defaults to the configured documents directory)
        path: Option<PathBuf>,
    },

    /// List indexed documents
    Documents,

    /// List registered research tools
    Tools,

    /// List saved research summaries
    Summaries,

    /// Show a saved research summary
    Summary {
        /// File name as listed by `summaries` (the .md extension is optional)
        name: String,
    },
}
