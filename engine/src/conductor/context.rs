//! Context Assembler
//!
//! Packs a bounded slice of memory into the planning prompt: the most recent
//! conversation turns plus the facts and document references most relevant
//! to the query.

use sdk::errors::ResearchError;
use serde::Serialize;

use crate::db::{MemoryFilter, MemoryKind, MemoryRecord, MemoryStore};

/// Longest excerpt of a single record placed in the prompt
const RECORD_PREVIEW_CHARS: usize = 300;

/// Memory handed to the planner for one query
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanningContext {
    /// Newest first
    pub recent_turns: Vec<MemoryRecord>,
    /// Best match first
    pub relevant_records: Vec<MemoryRecord>,
}

impl PlanningContext {
    pub fn is_empty(&self) -> bool {
        self.recent_turns.is_empty() && self.relevant_records.is_empty()
    }

    /// Prompt section, empty when there is no context
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        if !self.recent_turns.is_empty() {
            out.push_str("Recent conversation (newest first):\n");
            for record in &self.recent_turns {
                out.push_str(&format!("- {}\n", preview(&record.content)));
            }
        }
        if !self.relevant_records.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Known facts and sources:\n");
            for record in &self.relevant_records {
                match record.meta_str("source") {
                    Some(source) => out.push_str(&format!(
                        "- [{}] {} (source: {})\n",
                        record.kind,
                        preview(&record.content),
                        source
                    )),
                    None => out.push_str(&format!("- [{}] {}\n", record.kind, preview(&record.content))),
                }
            }
        }
        out
    }
}

fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > RECORD_PREVIEW_CHARS {
        format!("{}...", flat.chars().take(RECORD_PREVIEW_CHARS).collect::<String>())
    } else {
        flat
    }
}

pub struct ContextAssembler {
    memory: MemoryStore,
    turns: usize,
    facts: usize,
}

impl ContextAssembler {
    pub fn new(memory: MemoryStore, turns: usize, facts: usize) -> Self {
        Self {
            memory,
            turns,
            facts,
        }
    }

    /// Gather context for `query`; tombstoned records never appear
    pub async fn assemble(&self, query: &str) -> Result<PlanningContext, ResearchError> {
        let recent_turns = if self.turns == 0 {
            Vec::new()
        } else {
            self.memory
                .recent(MemoryKind::Conversation, self.turns)
                .await?
        };

        let relevant_records = if self.facts == 0 || query.trim().is_empty() {
            Vec::new()
        } else {
            let filter = MemoryFilter::new()
                .kinds([MemoryKind::Fact, MemoryKind::DocumentReference])
                .text(query)
                .by_relevance()
                .limit(self.facts);
            self.memory.query(&filter).await?
        };

        tracing::debug!(
            turns = recent_turns.len(),
            relevant = relevant_records.len(),
            "Planning context assembled"
        );
        Ok(PlanningContext {
            recent_turns,
            relevant_records,
        })
    }
}
