//! Tool Registry
//!
//! Maps a step's action name to a research tool and enforces the calling
//! contract (declared parameters, kinds, timeout). The registry holds no tool
//! logic of its own and is read-only once built.

pub mod documents;
pub mod web;

pub use documents::{DocumentIndex, DocumentSearchTool, DocumentSummaryTool};
pub use web::{ExtractLinksTool, FetchWebpageTool, WebSearchTool};

use async_trait::async_trait;
use sdk::errors::ResearchError;
use sdk::types::{ParamValue, ToolError, ToolInput, ToolOutput};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::db::MemoryKind;
use crate::llm::gateway::{ModelGateway, ModelRequest};

/// Name of the tool used by fallback plans
pub const DIRECT_ANSWER: &str = "direct_answer";

/// Kind of value a parameter accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Text,
    Integer,
    Boolean,
    List,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Text => "text",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
            ParamKind::List => "list",
        }
    }

    /// Whether `value` is acceptable for this kind
    ///
    /// Integers also accept integral numbers; lists accept a single scalar.
    pub fn accepts(&self, value: &ParamValue) -> bool {
        match self {
            ParamKind::Text => matches!(value, ParamValue::Text(_)),
            ParamKind::Integer => matches!(value, ParamValue::Integer(_))
                || matches!(value, ParamValue::Number(n) if n.fract() == 0.0),
            ParamKind::Boolean => matches!(value, ParamValue::Bool(_)),
            ParamKind::List => true,
        }
    }
}

/// Declared parameter of a tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

/// Contract every research tool implements
#[async_trait]
pub trait ResearchTool: Send + Sync {
    /// Action name used in plans
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ParamSpec>;

    /// Memory record written for a successful call, if any
    fn record_kind(&self) -> Option<MemoryKind>;

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput, ToolError>;
}

/// One registered action, as advertised to the planner and the CLI
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub action: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_kind: Option<MemoryKind>,
}

impl Capability {
    pub fn required_parameters(&self) -> impl Iterator<Item = &ParamSpec> {
        self.parameters.iter().filter(|p| p.required)
    }
}

/// Registry settings passed in at construction
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub tool_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(30),
        }
    }
}

/// Dispatch table from action names to tools
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ResearchTool>>,
    settings: RegistrySettings,
}

impl ToolRegistry {
    /// Build a registry from tools
    ///
    /// A `direct_answer` tool is added when none is supplied.
    pub fn new(tools: Vec<Arc<dyn ResearchTool>>, settings: RegistrySettings) -> Self {
        let mut map: BTreeMap<String, Arc<dyn ResearchTool>> = BTreeMap::new();
        for tool in tools {
            let name = tool.name().to_string();
            if map.insert(name.clone(), tool).is_some() {
                warn!("Tool '{}' registered twice, keeping the last one", name);
            }
        }
        map.entry(DIRECT_ANSWER.to_string())
            .or_insert_with(|| Arc::new(DirectAnswerTool::offline()) as Arc<dyn ResearchTool>);

        debug!(tools = ?map.keys().collect::<Vec<_>>(), "Tool registry built");
        Self {
            tools: map,
            settings,
        }
    }

    /// Build the registry from config, wiring every enabled collaborator
    pub fn from_config(
        config: &Config,
        gateway: Arc<ModelGateway>,
        index: Arc<DocumentIndex>,
    ) -> Result<Self, ResearchError> {
        let mut tools: Vec<Arc<dyn ResearchTool>> =
            vec![Arc::new(DirectAnswerTool::new(Arc::clone(&gateway)))];

        if config.tools.web.enabled {
            let web = web::build_web_tools(&config.tools.web)
                .map_err(|e| ResearchError::Config(format!("web tools: {}", e)))?;
            tools.push(Arc::new(web.search));
            tools.push(Arc::new(web.fetch));
            tools.push(Arc::new(web.links));
        }

        if config.tools.documents.enabled {
            tools.push(Arc::new(DocumentSearchTool::new(
                Arc::clone(&index),
                Arc::clone(&gateway),
            )));
            tools.push(Arc::new(DocumentSummaryTool::new(index)));
        }

        Ok(Self::new(
            tools,
            RegistrySettings {
                tool_timeout: config.executor.tool_timeout(),
            },
        ))
    }

    /// Look up the tool for an action
    pub fn resolve(&self, action: &str) -> Option<Arc<dyn ResearchTool>> {
        self.tools.get(action).map(Arc::clone)
    }

    /// Every registered action with its declared parameters, sorted by name
    pub fn capabilities(&self) -> Vec<Capability> {
        self.tools
            .values()
            .map(|tool| Capability {
                action: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
                record_kind: tool.record_kind(),
            })
            .collect()
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Check a call against the action's parameter contract
    ///
    /// Returns one message per violation; empty means valid.
    pub fn validate(&self, action: &str, params: &BTreeMap<String, ParamValue>) -> Vec<String> {
        let Some(tool) = self.tools.get(action) else {
            return vec![format!(
                "unknown action '{}' (available: {})",
                action,
                self.action_names().join(", ")
            )];
        };

        let mut violations = Vec::new();
        for spec in tool.parameters() {
            match params.get(spec.name) {
                None if spec.required => violations.push(format!(
                    "action '{}' is missing required parameter '{}'",
                    action, spec.name
                )),
                Some(value) if !spec.kind.accepts(value) => violations.push(format!(
                    "parameter '{}' of action '{}' must be {}, got {}",
                    spec.name,
                    action,
                    spec.kind.as_str(),
                    value.kind_name()
                )),
                _ => {}
            }
        }
        violations
    }

    /// Prompt text listing the actions and their parameters
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        for cap in self.capabilities() {
            parts.push(format!("## {}", cap.action));
            parts.push(cap.description.clone());
            if cap.parameters.is_empty() {
                parts.push("Parameters: none".to_string());
            } else {
                parts.push("Parameters:".to_string());
                for p in &cap.parameters {
                    parts.push(format!(
                        "- {} ({}, {}): {}",
                        p.name,
                        p.kind.as_str(),
                        if p.required { "required" } else { "optional" },
                        p.description
                    ));
                }
            }
            parts.push(String::new());
        }
        parts.join("\n")
    }

    /// Run a tool call bounded by the tool timeout
    pub async fn dispatch(&self, input: &ToolInput) -> Result<ToolOutput, ToolError> {
        let tool = self.resolve(&input.action).ok_or_else(|| {
            warn!("Unknown tool requested: {}", input.action);
            ToolError::Unavailable(format!("no tool registered for '{}'", input.action))
        })?;

        debug!(action = %input.action, params = input.params.len(), "Dispatching tool");

        let limit = self.settings.tool_timeout;
        match tokio::time::timeout(limit, tool.execute(input)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(action = %input.action, timeout_secs = limit.as_secs(), "Tool timed out");
                Err(ToolError::Timeout(limit.as_secs()))
            }
        }
    }
}

/// Answers from the model's own knowledge without external tools
pub struct DirectAnswerTool {
    gateway: Option<Arc<ModelGateway>>,
}

impl DirectAnswerTool {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self {
            gateway: Some(gateway),
        }
    }

    /// A direct answer tool that only restates the question for synthesis
    pub fn offline() -> Self {
        Self { gateway: None }
    }
}

#[async_trait]
impl ResearchTool for DirectAnswerTool {
    fn name(&self) -> &str {
        DIRECT_ANSWER
    }

    fn description(&self) -> &str {
        "Answer the question directly from general knowledge without consulting external sources."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::optional(
            "question",
            ParamKind::Text,
            "The question to answer",
        )]
    }

    fn record_kind(&self) -> Option<MemoryKind> {
        None
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput, ToolError> {
        let question = input.param_str_opt("question").unwrap_or_default().trim();

        let Some(gateway) = &self.gateway else {
            return Ok(ToolOutput::text(format!(
                "No sources were consulted. Question: {}",
                question
            )));
        };
        if question.is_empty() {
            return Err(ToolError::MissingParameter("question".to_string()));
        }

        let request = ModelRequest::free_text(question).with_system(
            "Answer the question concisely from general knowledge. \
             Say so plainly if you are unsure.",
        );
        let response = gateway.generate(&request).await.map_err(|e| match e {
            ResearchError::ModelUnavailable { .. } => ToolError::Unavailable(e.to_string()),
            other => ToolError::Execution(other.to_string()),
        })?;

        Ok(ToolOutput::json(
            serde_json::json!({ "question": question, "answer": response.content }),
            response.content,
        )
        .with_source("model knowledge"))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubTool;
    use super::*;

    fn registry() -> ToolRegistry {
        ToolRegistry::new(
            vec![
                Arc::new(StubTool::new("web_search")),
                Arc::new(StubTool::new("count").with_params(vec![
                    ParamSpec::required("n", ParamKind::Integer, "A number"),
                    ParamSpec::optional("loud", ParamKind::Boolean, "Shout"),
                ])),
            ],
            RegistrySettings::default(),
        )
    }

    fn params(pairs: &[(&str, ParamValue)]) -> BTreeMap<String, ParamValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_direct_answer_always_registered() {
        let registry = ToolRegistry::new(Vec::new(), RegistrySettings::default());
        assert!(registry.resolve(DIRECT_ANSWER).is_some());
        assert_eq!(registry.action_names(), vec![DIRECT_ANSWER]);
    }

    #[test]
    fn test_capabilities_list_required_parameters() {
        let caps = registry().capabilities();
        let search = caps.iter().find(|c| c.action == "web_search").unwrap();
        let required: Vec<_> = search.required_parameters().map(|p| p.name).collect();
        assert_eq!(required, vec!["query"]);
    }

    #[test]
    fn test_validate_unknown_action() {
        let violations = registry().validate("teleport", &BTreeMap::new());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("unknown action 'teleport'"));
    }

    #[test]
    fn test_validate_missing_and_wrong_kind() {
        let reg = registry();
        assert!(reg.validate("web_search", &BTreeMap::new())[0].contains("missing required"));

        let violations = reg.validate(
            "count",
            &params(&[("n", "three".into()), ("loud", ParamValue::Integer(1))]),
        );
        assert_eq!(violations.len(), 2);

        assert!(reg
            .validate("count", &params(&[("n", ParamValue::Number(3.0))]))
            .is_empty());
    }

    #[test]
    fn test_describe_mentions_every_action() {
        let text = registry().describe();
        assert!(text.contains("## web_search"));
        assert!(text.contains("## count"));
        assert!(text.contains("- n (integer, required)"));
        assert!(text.contains("## direct_answer"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_action() {
        let err = registry()
            .dispatch(&ToolInput::new("teleport"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_timeout_is_tool_error() {
        let registry = ToolRegistry::new(
            vec![Arc::new(
                StubTool::new("slow").with_delay(Duration::from_secs(60)),
            )],
            RegistrySettings {
                tool_timeout: Duration::from_secs(5),
            },
        );

        let err = registry
            .dispatch(&ToolInput::new("slow").with_param("query", "x"))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Timeout(5));
    }

    #[tokio::test]
    async fn test_offline_direct_answer_restates_question() {
        let output = DirectAnswerTool::offline()
            .execute(&ToolInput::new(DIRECT_ANSWER).with_param("question", "why?"))
            .await
            .unwrap();
        assert!(output.text.contains("why?"));
    }
}
