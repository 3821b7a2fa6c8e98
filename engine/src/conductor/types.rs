//! Conductor Types
//!
//! Plans, steps, per-attempt results and the Summary a run produces.

use chrono::{DateTime, Utc};
use sdk::types::{ParamValue, ToolError, ToolInput, ToolOutput};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::tools::DIRECT_ANSWER;

/// How a plan came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOrigin {
    /// Accepted on the first model response
    Generated,
    /// Accepted after one repair re-prompt
    Repaired,
    /// Single direct-answer step used when no model plan validated
    Fallback,
}

impl fmt::Display for PlanOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOrigin::Generated => write!(f, "generated"),
            PlanOrigin::Repaired => write!(f, "repaired"),
            PlanOrigin::Fallback => write!(f, "fallback"),
        }
    }
}

/// One tool invocation in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub ordinal: usize,
    pub action: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

impl Step {
    /// Declared dependencies plus those implied by `{{step:N}}` placeholders,
    /// with or without a field path
    pub fn dependencies(&self) -> Vec<usize> {
        let mut deps = self.depends_on.clone();
        for value in self.parameters.values() {
            collect_placeholders(value, &mut deps);
        }
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Tool input with placeholders replaced by `resolve(ordinal, path)`
    ///
    /// Placeholders whose step has no output are left as written.
    pub fn to_input(&self, resolve: impl Fn(usize, Option<&str>) -> Option<String>) -> ToolInput {
        let mut input = ToolInput::new(&self.action);
        for (name, value) in &self.parameters {
            input
                .params
                .insert(name.clone(), substitute_value(value, &resolve));
        }
        input
    }
}

/// An ordered sequence of steps produced for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub steps: Vec<Step>,
    pub origin: PlanOrigin,
    pub valid: bool,
}

impl Plan {
    pub fn new(query: impl Into<String>, steps: Vec<Step>, origin: PlanOrigin) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.into(),
            created_at: Utc::now(),
            steps,
            origin,
            valid: true,
        }
    }

    /// One `direct_answer` step that bypasses the research tools
    pub fn fallback(query: &str) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert("question".to_string(), ParamValue::from(query));

        Self::new(
            query,
            vec![Step {
                ordinal: 0,
                action: DIRECT_ANSWER.to_string(),
                parameters,
                rationale: "No validated research plan; answer directly".to_string(),
                depends_on: Vec::new(),
            }],
            PlanOrigin::Fallback,
        )
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == PlanOrigin::Fallback
    }
}

const PLACEHOLDER_OPEN: &str = "{{step:";
const PLACEHOLDER_CLOSE: &str = "}}";

/// Split the inside of a placeholder into ordinal and optional field path
///
/// `0` refers to step 0's text, `0.results.1.url` to a field of its data.
fn parse_reference(inner: &str) -> Option<(usize, Option<&str>)> {
    let inner = inner.trim();
    let (ordinal, path) = match inner.split_once('.') {
        Some((ordinal, path)) => (ordinal, Some(path.trim())),
        None => (inner, None),
    };
    let ordinal = ordinal.trim().parse().ok()?;
    match path {
        Some(path) if path.is_empty() || path.split('.').any(|s| s.trim().is_empty()) => None,
        path => Some((ordinal, path)),
    }
}

/// Find the step ordinals referenced by `{{step:N}}` or `{{step:N.path}}` in `text`
pub fn placeholders(text: &str) -> Vec<usize> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        let after = &rest[start + PLACEHOLDER_OPEN.len()..];
        match after.find(PLACEHOLDER_CLOSE) {
            Some(end) => {
                if let Some((n, _)) = parse_reference(&after[..end]) {
                    found.push(n);
                }
                rest = &after[end + PLACEHOLDER_CLOSE.len()..];
            }
            None => break,
        }
    }
    found
}

/// Replace every resolvable placeholder in `text`
///
/// `resolve` receives the step ordinal and the field path, if any.
/// Unresolvable placeholders are left as written.
pub fn substitute(text: &str, resolve: impl Fn(usize, Option<&str>) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + PLACEHOLDER_OPEN.len()..];
        let Some(end) = after.find(PLACEHOLDER_CLOSE) else {
            out.push_str(&rest[start..]);
            return out;
        };
        let token = &rest[start..start + PLACEHOLDER_OPEN.len() + end + PLACEHOLDER_CLOSE.len()];
        match parse_reference(&after[..end]).and_then(|(n, path)| resolve(n, path)) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(token),
        }
        rest = &after[end + PLACEHOLDER_CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

/// Follow a dotted path through JSON; numeric segments index arrays
///
/// Strings resolve to their contents, other scalars and containers to JSON
/// text. Missing fields and nulls resolve to nothing.
pub fn lookup_path(data: &Value, path: &str) -> Option<String> {
    let mut current = data;
    for segment in path.split('.').map(str::trim) {
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            Value::Object(fields) => fields.get(segment)?,
            _ => return None,
        };
    }
    match current {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn collect_placeholders(value: &ParamValue, into: &mut Vec<usize>) {
    match value {
        ParamValue::Text(text) => into.extend(placeholders(text)),
        ParamValue::List(items) => items.iter().for_each(|v| collect_placeholders(v, into)),
        _ => {}
    }
}

fn substitute_value(value: &ParamValue, resolve: &impl Fn(usize, Option<&str>) -> Option<String>) -> ParamValue {
    match value {
        ParamValue::Text(text) => ParamValue::Text(substitute(text, resolve)),
        ParamValue::List(items) => {
            ParamValue::List(items.iter().map(|v| substitute_value(v, resolve)).collect())
        }
        other => other.clone(),
    }
}

/// Lifecycle of a step: pending, running, then one terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: String,
    pub message: String,
}

/// Outcome of one attempt at a step; never changed once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub attempt: u32,
    pub output: Option<ToolOutput>,
    pub error: Option<StepError>,
    pub elapsed_ms: u64,
}

impl StepResult {
    pub fn succeeded(attempt: u32, output: ToolOutput, elapsed: Duration) -> Self {
        Self {
            attempt,
            output: Some(output),
            error: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failed(attempt: u32, error: &ToolError, elapsed: Duration) -> Self {
        Self {
            attempt,
            output: None,
            error: Some(StepError {
                kind: error.kind().to_string(),
                message: error.to_string(),
            }),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.output.is_some()
    }
}

/// A step with its status and every attempt made at it
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    pub results: Vec<StepResult>,
}

impl StepRecord {
    pub fn new(step: Step) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            results: Vec::new(),
        }
    }

    /// Output of the successful attempt, if any
    pub fn output(&self) -> Option<&ToolOutput> {
        if self.status != StepStatus::Succeeded {
            return None;
        }
        self.results
            .iter()
            .rev()
            .find(|r| r.is_success())
            .and_then(|r| r.output.as_ref())
    }

    pub fn last_error(&self) -> Option<&StepError> {
        self.results.iter().rev().find_map(|r| r.error.as_ref())
    }
}

/// Per-plan execution state, owned by one executor call
#[derive(Debug, Clone, Serialize)]
pub struct PlanRun {
    pub plan_id: String,
    pub records: Vec<StepRecord>,
}

impl PlanRun {
    pub fn new(plan: &Plan) -> Self {
        Self {
            plan_id: plan.id.clone(),
            records: plan.steps.iter().cloned().map(StepRecord::new).collect(),
        }
    }

    pub fn status_of(&self, ordinal: usize) -> Option<StepStatus> {
        self.records.get(ordinal).map(|r| r.status)
    }

    /// Text of step `ordinal`'s successful output
    pub fn output_text(&self, ordinal: usize) -> Option<&str> {
        self.records
            .get(ordinal)
            .and_then(StepRecord::output)
            .map(|o| o.text.as_str())
    }

    /// Structured data of step `ordinal`'s successful output
    pub fn output_data(&self, ordinal: usize) -> Option<&Value> {
        self.records
            .get(ordinal)
            .and_then(StepRecord::output)
            .map(|o| &o.data)
    }

    /// Value a placeholder stands for: the whole text, or one field of the data
    pub fn resolve(&self, ordinal: usize, path: Option<&str>) -> Option<String> {
        match path {
            None => self.output_text(ordinal).map(str::to_string),
            Some(path) => lookup_path(self.output_data(ordinal)?, path),
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&StepRecord, &ToolOutput)> {
        self.records
            .iter()
            .filter_map(|r| r.output().map(|output| (r, output)))
    }

    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.records
            .iter()
            .map(|r| ManifestEntry {
                ordinal: r.step.ordinal,
                action: r.step.action.clone(),
                status: r.status,
                attempts: r.results.len(),
                error: r.last_error().filter(|_| r.status == StepStatus::Failed).map(|e| e.message.clone()),
                source: r.output().and_then(|o| o.source.clone()),
            })
            .collect()
    }
}

/// One line of the per-step status manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub ordinal: usize,
    pub action: String,
    pub status: StepStatus,
    pub attempts: usize,
    pub error: Option<String>,
    pub source: Option<String>,
}

/// A numbered source the summary refers to as `[number]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub number: usize,
    pub ordinal: usize,
    pub action: String,
    pub source: Option<String>,
}

/// Final result of executing a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub plan_id: String,
    pub query: String,
    pub text: String,
    pub citations: Vec<Citation>,
    pub manifest: Vec<ManifestEntry>,
    /// Assembled without model synthesis
    pub degraded: bool,
    /// Stopped between steps by a cancellation request
    pub cancelled: bool,
    /// Memory records written for this run, in write order
    pub memory_ids: Vec<i64>,
}
