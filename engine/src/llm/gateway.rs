//! Model Gateway
//!
//! The single entry point for model calls. One `RetryPolicy` is applied to
//! every call; a shared `RateWindow` delays calls that would exceed the
//! configured ceiling; a hard timeout bounds each call including its retries.
//!
//! Failures are never papered over: exhausted retries surface as
//! `ModelUnavailable`, and structured output that does not match the
//! requested schema surfaces as `MalformedStructuredOutput`. Callers own the
//! fallback path.

use serde_json::{Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use rand::Rng;
use sdk::errors::ResearchError;

use super::ollama::OllamaProvider;
use super::openai::OpenAIProvider;
use super::{extract_json_object, CompletionRequest, LLMProvider, Message};
use crate::config::{ModelConfig, RetryConfig};
use crate::rate_limiter::RateWindow;

/// How the response should be shaped
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationMode {
    FreeText,
    /// A JSON object that must contain every named field
    Structured { fields: Vec<String> },
}

/// Sampling parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: None,
            max_tokens: 2048,
        }
    }
}

/// A request to the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub mode: GenerationMode,
    /// `None` uses the gateway defaults from config
    pub sampling: Option<SamplingParams>,
}

impl ModelRequest {
    pub fn free_text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            mode: GenerationMode::FreeText,
            sampling: None,
        }
    }

    pub fn structured<I, S>(prompt: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prompt: prompt.into(),
            system: None,
            mode: GenerationMode::Structured {
                fields: fields.into_iter().map(Into::into).collect(),
            },
            sampling: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = Some(sampling);
        self
    }

    fn prompt_chars(&self) -> usize {
        self.prompt.chars().count() + self.system.as_deref().map_or(0, |s| s.chars().count())
    }
}

/// Call metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMeta {
    pub latency: Duration,
    /// Attempts beyond the first, across primary and fallback
    pub retries: u32,
    pub fallback_used: bool,
    pub provider: String,
}

/// A gateway response
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Raw generated text
    pub content: String,
    /// Parsed object, present in structured mode
    pub structured: Option<Map<String, Value>>,
    pub meta: ResponseMeta,
}

impl ModelResponse {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.structured.as_ref()?.get(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name)?.as_str()
    }
}

/// Retry policy shared by every gateway call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Exponential delay after failed attempt `attempt` (1-based), before jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay to sleep after failed attempt `attempt`; jitter picks from `[d/2, d]`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter && !delay.is_zero() {
            rand::thread_rng().gen_range(delay / 2..=delay)
        } else {
            delay
        }
    }
}

/// Gateway limits
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub max_prompt_chars: usize,
    pub call_timeout: Duration,
    pub default_sampling: SamplingParams,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            max_prompt_chars: 32_000,
            call_timeout: Duration::from_secs(180),
            default_sampling: SamplingParams::default(),
        }
    }
}

struct CallOutcome<T> {
    value: T,
    attempts: u32,
    fallback_used: bool,
    provider: String,
}

/// Retrying, rate-aware wrapper around the model providers
///
/// Safe to share across concurrent plans behind an `Arc`.
pub struct ModelGateway {
    primary: Arc<dyn LLMProvider>,
    fallback: Option<Arc<dyn LLMProvider>>,
    policy: RetryPolicy,
    window: Arc<RateWindow>,
    settings: GatewaySettings,
}

impl ModelGateway {
    pub fn new(primary: Arc<dyn LLMProvider>, policy: RetryPolicy, settings: GatewaySettings) -> Self {
        Self {
            primary,
            fallback: None,
            policy,
            window: Arc::new(RateWindow::per_minute("model", 1000)),
            settings,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn LLMProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_rate_window(mut self, window: Arc<RateWindow>) -> Self {
        self.window = window;
        self
    }

    /// Build the gateway and its providers from config
    pub fn from_config(config: &ModelConfig) -> Result<Self, ResearchError> {
        let primary = build_provider(&config.provider, config)?;
        let settings = GatewaySettings {
            max_prompt_chars: config.max_prompt_chars,
            call_timeout: config.call_timeout(),
            default_sampling: SamplingParams {
                temperature: config.temperature,
                top_p: None,
                max_tokens: config.max_output_tokens,
            },
        };
        let window = RateWindow::new(
            "model",
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        );

        let mut gateway = Self::new(primary, RetryPolicy::from_config(&config.retry), settings)
            .with_rate_window(Arc::new(window));

        if let Some(name) = &config.fallback_provider {
            gateway = gateway.with_fallback(build_provider(name, config)?);
        }

        Ok(gateway)
    }

    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    /// Whether the primary provider answers a health check
    pub async fn check_health(&self) -> bool {
        self.primary.check_health().await
    }

    /// Generate text or a structured object
    pub async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ResearchError> {
        let sampling = request
            .sampling
            .clone()
            .unwrap_or_else(|| self.settings.default_sampling.clone());
        self.validate(request, &sampling)?;

        let completion = build_completion(request, &sampling);
        let completion_ref = &completion;
        let started = Instant::now();

        let outcome = self
            .bounded("generate", move |provider| async move {
                provider.complete(completion_ref).await
            })
            .await?;

        let structured = match &request.mode {
            GenerationMode::FreeText => None,
            GenerationMode::Structured { fields } => {
                Some(parse_structured(&outcome.value, fields).inspect_err(|e| {
                    warn!(provider = %outcome.provider, error = %e, "Structured output rejected");
                })?)
            }
        };

        let meta = ResponseMeta {
            latency: started.elapsed(),
            retries: outcome.attempts.saturating_sub(1),
            fallback_used: outcome.fallback_used,
            provider: outcome.provider,
        };
        debug!(
            provider = %meta.provider,
            latency_ms = meta.latency.as_millis() as u64,
            retries = meta.retries,
            fallback_used = meta.fallback_used,
            "Model call completed"
        );

        Ok(ModelResponse {
            content: outcome.value,
            structured,
            meta,
        })
    }

    /// Embed text under the same retry, rate and timeout rules
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ResearchError> {
        if text.trim().is_empty() {
            return Err(ResearchError::InvalidModelRequest(
                "cannot embed empty text".to_string(),
            ));
        }
        let chars = text.chars().count();
        if chars > self.settings.max_prompt_chars {
            return Err(ResearchError::InvalidModelRequest(format!(
                "embedding input is {} chars, limit is {}",
                chars, self.settings.max_prompt_chars
            )));
        }

        let outcome = self
            .bounded("embed", move |provider| async move { provider.embed(text).await })
            .await?;

        Ok(outcome.value)
    }

    fn validate(&self, request: &ModelRequest, sampling: &SamplingParams) -> Result<(), ResearchError> {
        let invalid = |msg: String| Err(ResearchError::InvalidModelRequest(msg));

        if request.prompt.trim().is_empty() {
            return invalid("prompt is empty".to_string());
        }
        let chars = request.prompt_chars();
        if chars > self.settings.max_prompt_chars {
            return invalid(format!(
                "prompt is {} chars, limit is {}",
                chars, self.settings.max_prompt_chars
            ));
        }
        if !(0.0..=2.0).contains(&sampling.temperature) {
            return invalid(format!(
                "temperature {} is outside [0, 2]",
                sampling.temperature
            ));
        }
        if let Some(top_p) = sampling.top_p {
            if !(top_p > 0.0 && top_p <= 1.0) {
                return invalid(format!("top_p {} is outside (0, 1]", top_p));
            }
        }
        if sampling.max_tokens == 0 {
            return invalid("max_tokens must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Run `call` under the hard timeout
    async fn bounded<T, F, Fut>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<CallOutcome<T>, ResearchError>
    where
        F: Fn(Arc<dyn LLMProvider>) -> Fut,
        Fut: Future<Output = super::Result<T>>,
    {
        let attempts = AtomicU32::new(0);
        let limit = self.settings.call_timeout;

        match tokio::time::timeout(limit, self.with_retries(operation, &attempts, call)).await {
            Ok(result) => result,
            Err(_) => {
                let attempts = attempts.load(Ordering::SeqCst);
                warn!(operation, attempts, timeout_secs = limit.as_secs(), "Model call timed out");
                Err(ResearchError::ModelUnavailable {
                    reason: format!("{} exceeded the {}s call timeout", operation, limit.as_secs()),
                    attempts,
                })
            }
        }
    }

    async fn with_retries<T, F, Fut>(
        &self,
        operation: &'static str,
        attempts: &AtomicU32,
        call: F,
    ) -> Result<CallOutcome<T>, ResearchError>
    where
        F: Fn(Arc<dyn LLMProvider>) -> Fut,
        Fut: Future<Output = super::Result<T>>,
    {
        let max_attempts = self.policy.max_attempts;
        let providers = std::iter::once((&self.primary, false))
            .chain(self.fallback.iter().map(|p| (p, true)));
        let mut last_error = None;

        for (provider, is_fallback) in providers {
            if is_fallback {
                info!(
                    fallback = provider.name(),
                    operation, "Primary provider exhausted, trying fallback"
                );
            }

            for attempt in 1..=max_attempts {
                let waited = self.window.acquire().await;
                if !waited.is_zero() {
                    debug!(waited_ms = waited.as_millis() as u64, "Model call delayed by rate window");
                }

                let total = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                match call(Arc::clone(provider)).await {
                    Ok(value) => {
                        return Ok(CallOutcome {
                            value,
                            attempts: total,
                            fallback_used: is_fallback,
                            provider: provider.name().to_string(),
                        })
                    }
                    Err(e) => {
                        let retry = e.is_transient() && attempt < max_attempts;
                        warn!(
                            provider = provider.name(),
                            operation,
                            attempt,
                            max_attempts,
                            kind = e.kind(),
                            error = %e,
                            "Model call failed"
                        );
                        last_error = Some(e);

                        if !retry {
                            break;
                        }
                        let delay = self.policy.delay_for(attempt);
                        debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(ResearchError::ModelUnavailable {
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no provider attempted".to_string()),
            attempts: attempts.load(Ordering::SeqCst),
        })
    }
}

fn build_provider(name: &str, config: &ModelConfig) -> Result<Arc<dyn LLMProvider>, ResearchError> {
    match name {
        "ollama" => Ok(Arc::new(OllamaProvider::from_config(&config.ollama))),
        "openai" => Ok(Arc::new(OpenAIProvider::from_env(&config.openai))),
        other => Err(ResearchError::Config(format!("Unknown provider '{}'", other))),
    }
}

fn build_completion(request: &ModelRequest, sampling: &SamplingParams) -> CompletionRequest {
    let mut system = request.system.clone().unwrap_or_default();
    let json_mode = match &request.mode {
        GenerationMode::FreeText => false,
        GenerationMode::Structured { fields } => {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str(&format!(
                "Respond with a single JSON object containing the fields: {}. \
                 Do not add text outside the JSON object.",
                fields.join(", ")
            ));
            true
        }
    };

    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(request.prompt.clone()));

    CompletionRequest {
        messages,
        json_mode,
        temperature: sampling.temperature,
        top_p: sampling.top_p,
        max_tokens: sampling.max_tokens,
    }
}

fn parse_structured(content: &str, fields: &[String]) -> Result<Map<String, Value>, ResearchError> {
    let object = extract_json_object(content).ok_or_else(|| {
        ResearchError::MalformedStructuredOutput("response contains no JSON object".to_string())
    })?;

    let missing: Vec<&str> = fields
        .iter()
        .filter(|f| !object.contains_key(f.as_str()))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Ok(object)
    } else {
        Err(ResearchError::MalformedStructuredOutput(format!(
            "missing field(s): {}",
            missing.join(", ")
        )))
    }
}
