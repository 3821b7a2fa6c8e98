//! Conductor Planner
//!
//! Asks the Model Gateway for a research plan, validates it against the Tool
//! Registry, gives the model one chance to repair a rejected plan, and
//! otherwise falls back to a single direct-answer step. `plan` always returns
//! a valid Plan.

use sdk::errors::ResearchError;
use sdk::types::ParamValue;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::conductor::context::PlanningContext;
use crate::conductor::types::{Plan, PlanOrigin, Step};
use crate::config::PlannerConfig;
use crate::llm::gateway::{ModelGateway, ModelRequest};
use crate::tools::ToolRegistry;

const PLANNER_SYSTEM_PROMPT: &str = "You are the planning component of a research assistant. \
Break the user's query into a short ordered list of research steps using only the listed actions. \
Each step has an \"action\", a \"parameters\" object, a \"rationale\" string and an optional \
\"depends_on\" list of earlier step numbers (steps are numbered from 0). A parameter may use the \
text of an earlier step's result by writing {{step:N}}, or one field of its data by writing a \
dotted path such as {{step:0.results.0.url}} for the first web_search result's URL. Parameter values must be strings, numbers, \
booleans or lists of those. Respond with a single JSON object of the form \
{\"steps\": [{\"action\": \"...\", \"parameters\": {}, \"rationale\": \"...\"}]}.";

#[derive(Debug, Clone)]
pub struct PlannerSettings {
    pub max_steps: usize,
    pub max_query_chars: usize,
}

impl From<&PlannerConfig> for PlannerSettings {
    fn from(config: &PlannerConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            max_query_chars: config.max_query_chars,
        }
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self::from(&PlannerConfig::default())
    }
}

pub struct Planner {
    gateway: Arc<ModelGateway>,
    registry: Arc<ToolRegistry>,
    settings: PlannerSettings,
}

/// Why a model response was not turned into a plan
enum Rejection {
    /// Fixable by re-prompting with these violations
    Violations(Vec<String>),
    /// Nothing a re-prompt can fix
    Unrecoverable(ResearchError),
}

impl Planner {
    pub fn new(gateway: Arc<ModelGateway>, registry: Arc<ToolRegistry>, settings: PlannerSettings) -> Self {
        Self {
            gateway,
            registry,
            settings,
        }
    }

    /// Produce a valid plan for `query`
    pub async fn plan(&self, query: &str, context: &PlanningContext) -> Plan {
        let query = truncate_chars(query.trim(), self.settings.max_query_chars);
        let prompt = self.build_prompt(&query, context);

        let violations = match self.attempt(&prompt).await {
            Ok(steps) => {
                info!(steps = steps.len(), "Plan accepted");
                return Plan::new(query, steps, PlanOrigin::Generated);
            }
            Err(Rejection::Violations(violations)) => violations,
            Err(Rejection::Unrecoverable(e)) => {
                warn!(error = %e, "Planning failed, using direct-answer plan");
                return Plan::fallback(&query);
            }
        };

        warn!(
            error = %ResearchError::InvalidPlan(violations.clone()),
            "Plan rejected, asking for a repair"
        );
        let repair_prompt = format!(
            "{}\n\nYour previous plan was rejected for these reasons:\n{}\n\
             Return a corrected plan that fixes every problem.",
            prompt,
            violations
                .iter()
                .map(|v| format!("- {}", v))
                .collect::<Vec<_>>()
                .join("\n")
        );

        match self.attempt(&repair_prompt).await {
            Ok(steps) => {
                info!(steps = steps.len(), "Repaired plan accepted");
                Plan::new(query, steps, PlanOrigin::Repaired)
            }
            Err(Rejection::Violations(violations)) => {
                warn!(
                    error = %ResearchError::InvalidPlan(violations),
                    "Repaired plan rejected, using direct-answer plan"
                );
                Plan::fallback(&query)
            }
            Err(Rejection::Unrecoverable(e)) => {
                warn!(error = %e, "Plan repair failed, using direct-answer plan");
                Plan::fallback(&query)
            }
        }
    }

    async fn attempt(&self, prompt: &str) -> Result<Vec<Step>, Rejection> {
        let request = ModelRequest::structured(prompt, ["steps"]).with_system(PLANNER_SYSTEM_PROMPT);

        match self.gateway.generate(&request).await {
            Ok(response) => {
                let steps = response.field("steps").unwrap_or(&Value::Null);
                self.parse_steps(steps).map_err(Rejection::Violations)
            }
            Err(ResearchError::MalformedStructuredOutput(reason)) => {
                Err(Rejection::Violations(vec![reason]))
            }
            Err(e) => Err(Rejection::Unrecoverable(e)),
        }
    }

    fn build_prompt(&self, query: &str, context: &PlanningContext) -> String {
        let mut prompt = format!(
            "Available actions:\n\n{}\n\nAt most {} steps.\n",
            self.registry.describe(),
            self.settings.max_steps
        );
        let rendered = context.render();
        if !rendered.is_empty() {
            prompt.push('\n');
            prompt.push_str(&rendered);
        }
        prompt.push_str(&format!("\nResearch query: {}\n", query));
        prompt
    }

    /// Turn the wire shape into steps, or list every violation found
    pub fn parse_steps(&self, value: &Value) -> Result<Vec<Step>, Vec<String>> {
        let Some(items) = value.as_array() else {
            return Err(vec!["\"steps\" must be a list of step objects".to_string()]);
        };
        if items.is_empty() {
            return Err(vec!["plan has no steps".to_string()]);
        }
        if items.len() > self.settings.max_steps {
            return Err(vec![format!(
                "plan has {} steps, the maximum is {}",
                items.len(),
                self.settings.max_steps
            )]);
        }

        let mut violations = Vec::new();
        let mut steps = Vec::with_capacity(items.len());
        for (ordinal, item) in items.iter().enumerate() {
            match self.parse_step(ordinal, item) {
                Ok(step) => steps.push(step),
                Err(mut found) => violations.append(&mut found),
            }
        }

        if violations.is_empty() {
            debug!(steps = steps.len(), "Plan validated");
            Ok(steps)
        } else {
            Err(violations)
        }
    }

    fn parse_step(&self, ordinal: usize, item: &Value) -> Result<Step, Vec<String>> {
        let Some(object) = item.as_object() else {
            return Err(vec![format!("step {}: not an object", ordinal)]);
        };
        let mut violations = Vec::new();

        let action = match object.get("action").and_then(Value::as_str).map(str::trim) {
            Some(action) if !action.is_empty() => action.to_string(),
            _ => {
                violations.push(format!("step {}: \"action\" must be a non-empty string", ordinal));
                String::new()
            }
        };

        let mut parameters = BTreeMap::new();
        match object.get("parameters") {
            Some(Value::Object(map)) => {
                for (name, raw) in map {
                    match ParamValue::from_json(raw) {
                        Some(value) => {
                            parameters.insert(name.clone(), value);
                        }
                        None => violations.push(format!(
                            "step {}: parameter '{}' must be a string, number, boolean or list of those",
                            ordinal, name
                        )),
                    }
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => violations.push(format!("step {}: \"parameters\" must be an object", ordinal)),
        }

        let rationale = match object.get("rationale") {
            Some(Value::String(text)) => text.trim().to_string(),
            None | Some(Value::Null) => String::new(),
            Some(_) => {
                violations.push(format!("step {}: \"rationale\" must be a string", ordinal));
                String::new()
            }
        };

        let mut depends_on = Vec::new();
        match object.get("depends_on") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    match item.as_u64() {
                        Some(n) => depends_on.push(n as usize),
                        None => violations.push(format!(
                            "step {}: \"depends_on\" entries must be step numbers",
                            ordinal
                        )),
                    }
                }
            }
            Some(_) => violations.push(format!("step {}: \"depends_on\" must be a list", ordinal)),
        }

        if !action.is_empty() {
            violations.extend(
                self.registry
                    .validate(&action, &parameters)
                    .into_iter()
                    .map(|v| format!("step {}: {}", ordinal, v)),
            );
        }

        let step = Step {
            ordinal,
            action,
            parameters,
            rationale,
            depends_on,
        };
        for dep in step.dependencies() {
            if dep >= ordinal {
                violations.push(format!(
                    "step {}: depends on step {}, which does not come before it",
                    ordinal, dep
                ));
            }
        }

        if violations.is_empty() {
            Ok(step)
        } else {
            Err(violations)
        }
    }
}

/// First `max` chars of `text`
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
