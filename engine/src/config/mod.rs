//! Configuration management
//!
//! This module handles loading, validation, and management of the Scout configuration.
//! Configuration is stored in TOML format at ~/.scout/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **model**: Provider selection, sampling defaults, retry and rate policy
//! - **planner**: Plan size and context window limits
//! - **executor**: Step retries, tool timeout, synthesis budget
//! - **tools**: Web and document tool settings
//!
//! Every section has defaults, so a partial file is valid. Tool settings are
//! handed to the tool registry at construction time; nothing reads them from
//! process-global state.
//!
//! # Examples
//!
//! ```no_run
//! use scout_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Provider: {}", config.model.provider);
//! # Ok(())
//! # }
//! ```

use sdk::errors::ResearchError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Model gateway configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Planner limits
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Executor limits
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Tool collaborator settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Model gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Primary provider (ollama, openai)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Provider tried after the primary exhausts its retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,

    /// Default sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Default output token ceiling
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Longest prompt the gateway accepts, in characters
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,

    /// Hard timeout for one gateway call, retries included
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub openai: OpenAIConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Chat model name
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Embedding model name
    #[serde(default = "default_ollama_embed_model")]
    pub embed_model: String,

    /// Per-request HTTP timeout
    #[serde(default = "default_ollama_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for the API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Chat model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Embedding model name
    #[serde(default = "default_openai_embed_model")]
    pub embed_model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_openai_api_key_env")]
    pub api_key_env: String,
}

/// Retry policy applied by the model gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

/// Rolling-window call ceiling for the model gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Plans with more steps than this are rejected
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Queries are truncated to this many characters
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Recent conversation turns included in the planning context
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    /// Relevant facts and document references included in the planning context
    #[serde(default = "default_context_facts")]
    pub context_facts: usize,
}

/// Executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Extra attempts for a failing step
    #[serde(default = "default_step_retries")]
    pub step_retries: u32,

    /// Timeout for a single tool call
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Characters of each step output passed to synthesis
    #[serde(default = "default_synthesis_chars_per_result")]
    pub synthesis_chars_per_result: usize,
}

/// Tool collaborator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub web: WebToolConfig,

    #[serde(default)]
    pub documents: DocumentToolConfig,
}

/// Web search and fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebToolConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Domains fetch_webpage may visit; empty allows every domain
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_web_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_web_rate_limit")]
    pub rate_limit_per_minute: usize,

    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,

    /// Search providers in cascade order
    #[serde(default = "default_search_providers")]
    pub search_providers: Vec<String>,

    #[serde(default = "default_google_api_key_env")]
    pub google_api_key_env: String,

    #[serde(default = "default_google_engine_id_env")]
    pub google_engine_id_env: String,

    /// Override for the Google Custom Search endpoint
    #[serde(default = "default_google_endpoint")]
    pub google_endpoint: String,

    /// Override for the DuckDuckGo HTML endpoint
    #[serde(default = "default_duckduckgo_endpoint")]
    pub duckduckgo_endpoint: String,
}

/// Local document index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentToolConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Default directory for `scout index` (supports ~ expansion)
    #[serde(default = "default_documents_dir")]
    pub directory: PathBuf,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.scout/data")
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    2048
}

fn default_max_prompt_chars() -> usize {
    32_000
}

fn default_call_timeout_secs() -> u64 {
    180
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_ollama_embed_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_ollama_request_timeout_secs() -> u64 {
    120
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_embed_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_openai_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_requests() -> usize {
    1000
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_steps() -> usize {
    8
}

fn default_max_query_chars() -> usize {
    500
}

fn default_context_turns() -> usize {
    5
}

fn default_context_facts() -> usize {
    5
}

fn default_step_retries() -> u32 {
    1
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_synthesis_chars_per_result() -> usize {
    1500
}

fn default_user_agent() -> String {
    format!("scout/{} (research assistant)", env!("CARGO_PKG_VERSION"))
}

fn default_web_request_timeout_secs() -> u64 {
    15
}

fn default_web_rate_limit() -> usize {
    10
}

fn default_results_per_query() -> usize {
    5
}

fn default_search_providers() -> Vec<String> {
    vec!["google".to_string(), "duckduckgo".to_string()]
}

fn default_google_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_google_engine_id_env() -> String {
    "GOOGLE_CSE_ID".to_string()
}

fn default_google_endpoint() -> String {
    "https://www.googleapis.com/customsearch/v1".to_string()
}

fn default_duckduckgo_endpoint() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("~/.scout/documents")
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            fallback_provider: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_prompt_chars: default_max_prompt_chars(),
            call_timeout_secs: default_call_timeout_secs(),
            ollama: OllamaConfig::default(),
            openai: OpenAIConfig::default(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            embed_model: default_ollama_embed_model(),
            request_timeout_secs: default_ollama_request_timeout_secs(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            embed_model: default_openai_embed_model(),
            api_key_env: default_openai_api_key_env(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_query_chars: default_max_query_chars(),
            context_turns: default_context_turns(),
            context_facts: default_context_facts(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_retries: default_step_retries(),
            tool_timeout_secs: default_tool_timeout_secs(),
            synthesis_chars_per_result: default_synthesis_chars_per_result(),
        }
    }
}

impl Default for WebToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_domains: Vec::new(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_web_request_timeout_secs(),
            rate_limit_per_minute: default_web_rate_limit(),
            results_per_query: default_results_per_query(),
            search_providers: default_search_providers(),
            google_api_key_env: default_google_api_key_env(),
            google_engine_id_env: default_google_engine_id_env(),
            google_endpoint: default_google_endpoint(),
            duckduckgo_endpoint: default_duckduckgo_endpoint(),
        }
    }
}

impl Default for DocumentToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_documents_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ModelConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl ExecutorConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const VALID_PROVIDERS: [&str; 2] = ["ollama", "openai"];
const VALID_SEARCH_PROVIDERS: [&str; 2] = ["google", "duckduckgo"];

impl Config {
    /// Load configuration from the default location (~/.scout/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, ResearchError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path, creating it if absent
    pub fn load_or_create_at(path: &Path) -> Result<Self, ResearchError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ResearchError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ResearchError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ResearchError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| ResearchError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, ResearchError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ResearchError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Write the unexpanded defaults so the file stays portable
        let toml_string = toml::to_string_pretty(&Self::default())
            .map_err(|e| ResearchError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ResearchError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = Self::default();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.scout/config.toml)
    fn default_config_path() -> Result<PathBuf, ResearchError> {
        let home = dirs::home_dir().ok_or_else(|| {
            ResearchError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(".scout").join("config.toml"))
    }

    /// Path of the memory database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("memory.db")
    }

    /// Directory holding saved research summaries
    pub fn summaries_dir(&self) -> PathBuf {
        self.core.data_dir.join("summaries")
    }

    /// Path of the document index inside the data directory
    pub fn document_index_path(&self) -> PathBuf {
        self.core.data_dir.join("documents.json")
    }

    /// Validate configuration values and expand paths
    fn validate_and_process(&mut self) -> Result<(), ResearchError> {
        if !VALID_LOG_LEVELS.contains(&self.core.log_level.as_str()) {
            return Err(ResearchError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let providers = std::iter::once(&self.model.provider)
            .chain(self.model.fallback_provider.as_ref());
        for provider in providers {
            if !VALID_PROVIDERS.contains(&provider.as_str()) {
                return Err(ResearchError::Config(format!(
                    "Invalid provider '{}'. Must be one of: {}",
                    provider,
                    VALID_PROVIDERS.join(", ")
                )));
            }
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ResearchError::Config(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if self.model.max_output_tokens == 0 {
            return Err(ResearchError::Config(
                "max_output_tokens must be greater than 0".to_string(),
            ));
        }
        if self.model.retry.max_attempts == 0 {
            return Err(ResearchError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.model.retry.base_delay_ms > self.model.retry.max_delay_ms {
            return Err(ResearchError::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        if self.model.rate_limit.window_secs == 0 || self.model.rate_limit.max_requests == 0 {
            return Err(ResearchError::Config(
                "rate_limit.window_secs and rate_limit.max_requests must be greater than 0"
                    .to_string(),
            ));
        }
        if self.model.call_timeout_secs == 0 || self.executor.tool_timeout_secs == 0 {
            return Err(ResearchError::Config(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        if self.planner.max_steps == 0 {
            return Err(ResearchError::Config(
                "planner.max_steps must be at least 1".to_string(),
            ));
        }

        for provider in &self.tools.web.search_providers {
            if !VALID_SEARCH_PROVIDERS.contains(&provider.as_str()) {
                return Err(ResearchError::Config(format!(
                    "Invalid search provider '{}'. Must be one of: {}",
                    provider,
                    VALID_SEARCH_PROVIDERS.join(", ")
                )));
            }
        }
        if self.tools.web.rate_limit_per_minute == 0 {
            return Err(ResearchError::Config(
                "tools.web.rate_limit_per_minute must be greater than 0".to_string(),
            ));
        }

        let docs = &self.tools.documents;
        if docs.chunk_size == 0 || docs.chunk_overlap >= docs.chunk_size {
            return Err(ResearchError::Config(format!(
                "tools.documents.chunk_overlap ({}) must be smaller than chunk_size ({})",
                docs.chunk_overlap, docs.chunk_size
            )));
        }

        self.tools.web.allowed_domains = self
            .tools
            .web
            .allowed_domains
            .iter()
            .map(|d| d.trim().to_lowercase())
            .map(|d| d.trim_start_matches("www.").to_string())
            .filter(|d| !d.is_empty())
            .collect();

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.tools.documents.directory = expand_path(&self.tools.documents.directory)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                ResearchError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ to home directory
fn expand_path(path: &Path) -> Result<PathBuf, ResearchError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ResearchError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            ResearchError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| ResearchError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn with_data_dir(extra: &str, dir: &TempDir) -> String {
        format!(
            "[core]\ndata_dir = '{}'\n{}",
            dir.path().join("data").display(),
            extra
        )
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.model.provider, "ollama");
        assert_eq!(config.model.retry.max_attempts, 3);
        assert_eq!(config.model.rate_limit.window_secs, 60);
        assert_eq!(config.planner.max_query_chars, 500);
        assert_eq!(config.executor.synthesis_chars_per_result, 1500);
        assert_eq!(config.tools.web.rate_limit_per_minute, 10);
        assert_eq!(config.tools.web.search_providers, vec!["google", "duckduckgo"]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_toml_str(&with_data_dir(
            "[planner]\nmax_steps = 3\n",
            &dir,
        ))
        .unwrap();

        assert_eq!(config.planner.max_steps, 3);
        assert_eq!(config.planner.context_turns, 5);
        assert_eq!(config.model.temperature, 0.7);
        assert!(config.core.data_dir.exists());
    }

    #[test]
    fn test_invalid_provider_rejected() {
        let dir = TempDir::new().unwrap();
        let result = Config::from_toml_str(&with_data_dir(
            "[model]\nprovider = \"carrier-pigeon\"\n",
            &dir,
        ));
        assert!(matches!(result, Err(ResearchError::Config(_))));
    }

    #[test]
    fn test_invalid_temperature_rejected() {
        let dir = TempDir::new().unwrap();
        let result =
            Config::from_toml_str(&with_data_dir("[model]\ntemperature = 2.5\n", &dir));
        assert!(matches!(result, Err(ResearchError::Config(_))));
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let dir = TempDir::new().unwrap();
        let result = Config::from_toml_str(&with_data_dir(
            "[model.retry]\nmax_attempts = 0\n",
            &dir,
        ));
        assert!(matches!(result, Err(ResearchError::Config(_))));
    }

    #[test]
    fn test_chunk_overlap_must_be_smaller() {
        let dir = TempDir::new().unwrap();
        let result = Config::from_toml_str(&with_data_dir(
            "[tools.documents]\nchunk_size = 100\nchunk_overlap = 100\n",
            &dir,
        ));
        assert!(matches!(result, Err(ResearchError::Config(_))));
    }

    #[test]
    fn test_allowed_domains_normalized() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_toml_str(&with_data_dir(
            "[tools.web]\nallowed_domains = [\"WWW.Example.com\", \" \", \" www.Gov.UK \"]\n",
            &dir,
        ))
        .unwrap();
        assert_eq!(config.tools.web.allowed_domains, vec!["example.com", "gov.uk"]);
    }

    #[test]
    fn test_load_or_create_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_or_create_at(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load_or_create_at(&path).unwrap();
        assert_eq!(created.model.provider, loaded.model.provider);
        assert_eq!(created.planner.max_steps, loaded.planner.max_steps);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.model.provider, deserialized.model.provider);
        assert_eq!(
            config.tools.web.search_providers,
            deserialized.tools.web.search_providers
        );
    }
}
