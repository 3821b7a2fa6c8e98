//! Conductor Executor
//!
//! Runs a plan's steps strictly in order through the Tool Registry, records
//! every attempt, and turns the successful results into a cited Summary.
//!
//! A failed step never stops the plan. Steps whose dependencies produced no
//! usable result are skipped. If synthesis fails the Summary falls back to the
//! raw step outputs and is flagged `degraded`. The only error that leaves
//! `execute` is a `StorageFailure` from the Memory Store.

use sdk::errors::ResearchError;
use sdk::types::{ToolError, ToolOutput};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conductor::planner::truncate_chars;
use crate::conductor::types::{Citation, Plan, PlanRun, StepResult, StepStatus, Summary};
use crate::config::ExecutorConfig;
use crate::db::{MemoryStore, NewMemoryRecord};
use crate::llm::gateway::{ModelGateway, ModelRequest};
use crate::tools::ToolRegistry;

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are the synthesis component of a research assistant. \
Answer the research query using only the numbered sources provided. Cite sources inline as [n]. \
Respond with a single JSON object: {\"summary\": \"<answer with [n] citations>\", \"citations\": [n, ...]}.";

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Extra attempts after a retryable step failure
    pub step_retries: u32,
    /// Longest excerpt of one step output placed in the synthesis prompt
    pub synthesis_chars_per_result: usize,
}

impl From<&ExecutorConfig> for ExecutorSettings {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            step_retries: config.step_retries,
            synthesis_chars_per_result: config.synthesis_chars_per_result,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

pub struct Executor {
    registry: Arc<ToolRegistry>,
    gateway: Arc<ModelGateway>,
    memory: MemoryStore,
    settings: ExecutorSettings,
}

impl Executor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        gateway: Arc<ModelGateway>,
        memory: MemoryStore,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            registry,
            gateway,
            memory,
            settings,
        }
    }

    /// Execute `plan` and summarize what it found
    ///
    /// `cancel` is only checked between steps; an in-flight tool call always
    /// runs to completion or timeout.
    pub async fn execute(&self, plan: &Plan, cancel: &CancellationToken) -> Result<Summary, ResearchError> {
        let mut run = PlanRun::new(plan);
        let mut memory_ids = Vec::new();
        let mut cancelled = false;

        for index in 0..run.records.len() {
            if cancel.is_cancelled() {
                info!(plan_id = %plan.id, remaining = run.records.len() - index, "Plan cancelled between steps");
                for record in &mut run.records[index..] {
                    record.status = StepStatus::Skipped;
                }
                cancelled = true;
                break;
            }

            let step = run.records[index].step.clone();
            let unmet: Vec<usize> = step
                .dependencies()
                .into_iter()
                .filter(|d| run.status_of(*d) != Some(StepStatus::Succeeded))
                .collect();
            if !unmet.is_empty() {
                info!(ordinal = step.ordinal, action = %step.action, unmet = ?unmet, "Skipping step, dependency has no result");
                run.records[index].status = StepStatus::Skipped;
                continue;
            }

            let input = step.to_input(|n, path| run.resolve(n, path));
            run.records[index].status = StepStatus::Running;
            debug!(ordinal = step.ordinal, action = %step.action, "Step running");

            let max_attempts = 1 + self.settings.step_retries;
            let mut status = StepStatus::Failed;
            for attempt in 1..=max_attempts {
                let started = Instant::now();
                let outcome = self
                    .registry
                    .dispatch(&input)
                    .await
                    .and_then(|output| {
                        if output.is_empty() {
                            Err(ToolError::Execution("tool returned no output".to_string()))
                        } else {
                            Ok(output)
                        }
                    });

                match outcome {
                    Ok(output) => {
                        run.records[index]
                            .results
                            .push(StepResult::succeeded(attempt, output, started.elapsed()));
                        status = StepStatus::Succeeded;
                        break;
                    }
                    Err(e) => {
                        warn!(
                            ordinal = step.ordinal,
                            action = %step.action,
                            attempt,
                            max_attempts,
                            kind = e.kind(),
                            error = %e,
                            "Step attempt failed"
                        );
                        let retryable = e.is_retryable();
                        run.records[index]
                            .results
                            .push(StepResult::failed(attempt, &e, started.elapsed()));
                        if !retryable {
                            break;
                        }
                    }
                }
            }
            run.records[index].status = status;

            if status == StepStatus::Succeeded {
                info!(ordinal = step.ordinal, action = %step.action, "Step succeeded");
                if let Some(id) = self.remember_step(plan, &run, index).await? {
                    memory_ids.push(id);
                }
            }
        }

        debug_assert!(run.records.iter().all(|r| r.status.is_terminal()));

        let citations = self.citations(&run);
        let (text, degraded) = if cancelled {
            (SummaryText::Raw(concatenate(&run)), true)
        } else {
            self.synthesize(plan, &run, &citations).await
        };

        let cited = match &text {
            SummaryText::Synthesized { cited, .. } => select_citations(citations, cited),
            SummaryText::Raw(_) => citations,
        };
        let text = text.into_text();

        let turn = NewMemoryRecord::conversation(format!("Q: {}\nA: {}", plan.query, text))
            .with_metadata("query", plan.query.as_str())
            .with_metadata("plan_id", plan.id.as_str())
            .with_metadata("degraded", degraded);
        let record = self.memory.append(turn).await?;
        memory_ids.push(record.id);

        info!(
            plan_id = %plan.id,
            degraded,
            cancelled,
            records = memory_ids.len(),
            "Plan executed"
        );
        Ok(Summary {
            plan_id: plan.id.clone(),
            query: plan.query.clone(),
            text,
            citations: cited,
            manifest: run.manifest(),
            degraded,
            cancelled,
            memory_ids,
        })
    }

    /// Persist a succeeded step when its tool declares a record kind
    async fn remember_step(&self, plan: &Plan, run: &PlanRun, index: usize) -> Result<Option<i64>, ResearchError> {
        let record = &run.records[index];
        let Some(output) = record.output() else {
            return Ok(None);
        };
        let Some(kind) = self
            .registry
            .resolve(&record.step.action)
            .and_then(|tool| tool.record_kind())
        else {
            return Ok(None);
        };

        let source = output.source.clone().map(Value::String).unwrap_or(Value::Null);
        let new = NewMemoryRecord::new(kind, output.text.clone())
            .with_metadata("action", record.step.action.as_str())
            .with_metadata("ordinal", record.step.ordinal as i64)
            .with_metadata("plan_id", plan.id.as_str())
            .with_metadata("source", source);
        let stored = self.memory.append(new).await?;
        debug!(record_id = stored.id, ordinal = record.step.ordinal, "Step result stored");
        Ok(Some(stored.id))
    }

    fn citations(&self, run: &PlanRun) -> Vec<Citation> {
        run.succeeded()
            .map(|(record, output)| Citation {
                number: record.step.ordinal + 1,
                ordinal: record.step.ordinal,
                action: record.step.action.clone(),
                source: output.source.clone(),
            })
            .collect()
    }

    async fn synthesize(&self, plan: &Plan, run: &PlanRun, citations: &[Citation]) -> (SummaryText, bool) {
        if citations.is_empty() {
            warn!(plan_id = %plan.id, "No step succeeded, nothing to synthesize");
            return (SummaryText::Raw(concatenate(run)), true);
        }

        let sources = run
            .succeeded()
            .map(|(record, output)| render_source(record.step.ordinal + 1, &record.step.action, output, self.settings.synthesis_chars_per_result))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!("Research query: {}\n\nSources:\n\n{}", plan.query, sources);
        let request = ModelRequest::structured(prompt, ["summary", "citations"]).with_system(SYNTHESIS_SYSTEM_PROMPT);

        let response = match self.gateway.generate(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(plan_id = %plan.id, error = %e, "Synthesis failed, returning raw results");
                return (SummaryText::Raw(concatenate(run)), true);
            }
        };

        match response.field_str("summary").map(str::trim).filter(|s| !s.is_empty()) {
            Some(summary) => {
                let cited = response
                    .field("citations")
                    .map(parse_citation_numbers)
                    .unwrap_or_default();
                (
                    SummaryText::Synthesized {
                        text: summary.to_string(),
                        cited,
                    },
                    false,
                )
            }
            None => {
                warn!(plan_id = %plan.id, "Synthesis returned an empty summary, returning raw results");
                (SummaryText::Raw(concatenate(run)), true)
            }
        }
    }
}

enum SummaryText {
    Synthesized { text: String, cited: Vec<usize> },
    Raw(String),
}

impl SummaryText {
    fn into_text(self) -> String {
        match self {
            SummaryText::Synthesized { text, .. } | SummaryText::Raw(text) => text,
        }
    }
}

fn render_source(number: usize, action: &str, output: &ToolOutput, max_chars: usize) -> String {
    let mut text = truncate_chars(&output.text, max_chars);
    if text.len() < output.text.len() {
        text.push_str("...");
    }
    match &output.source {
        Some(source) => format!("[{}] {} ({})\n{}", number, action, source, text),
        None => format!("[{}] {}\n{}", number, action, text),
    }
}

/// Degraded summary: succeeded step outputs in step order
fn concatenate(run: &PlanRun) -> String {
    run.succeeded()
        .map(|(_, output)| output.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Keep the sources the model cited, or every source when none of its
/// numbers match one
fn select_citations(citations: Vec<Citation>, cited: &[usize]) -> Vec<Citation> {
    let selected: Vec<Citation> = citations
        .iter()
        .filter(|c| cited.contains(&c.number))
        .cloned()
        .collect();
    if selected.is_empty() {
        if !cited.is_empty() {
            debug!(cited = ?cited, "Model cited no known source, citing every source");
        }
        citations
    } else {
        selected
    }
}

/// Accept `[1, 2]`, `["1", "[2]"]` and similar
fn parse_citation_numbers(value: &Value) -> Vec<usize> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    let mut numbers: Vec<usize> = items
        .iter()
        .filter_map(|item| match item {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .trim()
                .parse()
                .ok(),
            _ => None,
        })
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    numbers
}
