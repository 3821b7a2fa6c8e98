//! Scout Engine Library
//!
//! This library provides the core functionality of the Scout research
//! assistant. It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Rate limiting module
pub mod rate_limiter;

/// LLM provider abstraction layer and model gateway
pub mod llm;

/// Research tools and the tool registry
pub mod tools;

/// Conductor orchestration module
pub mod conductor;

/// Saved research summaries
pub mod summaries;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
