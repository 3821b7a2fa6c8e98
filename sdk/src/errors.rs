//! Error types and handling
//!
//! This module provides the error taxonomy shared by the Scout engine and its
//! tool collaborators. All errors implement the `ErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! # Propagation
//!
//! Only `StorageFailure` is allowed to cross the boundary of the research core.
//! Every other variant is either retried locally or converted into a degraded
//! result by the component that owns it:
//!
//! - **Model**: `ModelUnavailable`, `MalformedStructuredOutput`, `InvalidModelRequest`
//! - **Planning**: `InvalidPlan` (never leaves the planner)
//! - **Tools**: `ToolFailure` (recorded on the step, never thrown)
//! - **Storage**: `StorageFailure` (fatal for the affected operation)

use thiserror::Error;

/// Trait for Scout error extensions
///
/// Provides additional context for errors, including user-friendly hints and
/// recoverability information.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and never echoes raw model
    /// output, record content, or credentials.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors require manual intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main research error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{ErrorExt, ResearchError};
///
/// let error = ResearchError::ModelUnavailable {
///     reason: "connection refused".to_string(),
///     attempts: 3,
/// };
/// assert!(error.is_recoverable());
///
/// let fatal = ResearchError::StorageFailure {
///     record: "fact 'water boils at 100C'".to_string(),
///     reason: "disk full".to_string(),
/// };
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum ResearchError {
    // Model errors
    #[error("Model unavailable after {attempts} attempt(s): {reason}")]
    ModelUnavailable { reason: String, attempts: u32 },

    #[error("Malformed structured output: {0}")]
    MalformedStructuredOutput(String),

    #[error("Invalid model request: {0}")]
    InvalidModelRequest(String),

    // Planning errors
    #[error("Invalid plan: {}", .0.join("; "))]
    InvalidPlan(Vec<String>),

    // Tool errors
    #[error("Tool '{action}' failed ({kind}): {message}")]
    ToolFailure {
        action: String,
        kind: String,
        message: String,
    },

    // Storage errors
    #[error("Failed to durably store {record}: {reason}")]
    StorageFailure { record: String, reason: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResearchError {
    /// Build a storage failure for a record described by `record`
    pub fn storage(record: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::StorageFailure {
            record: record.into(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::MalformedStructuredOutput(_) => "malformed_structured_output",
            Self::InvalidModelRequest(_) => "invalid_model_request",
            Self::InvalidPlan(_) => "invalid_plan",
            Self::ToolFailure { .. } => "tool_failure",
            Self::StorageFailure { .. } => "storage_failure",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

impl ErrorExt for ResearchError {
    fn user_hint(&self) -> &str {
        match self {
            Self::ModelUnavailable { .. } => {
                "The language model could not be reached. Check that the model service is running"
            }
            Self::MalformedStructuredOutput(_) => {
                "The language model returned output in an unexpected format"
            }
            Self::InvalidModelRequest(_) => "The model request was rejected before sending",
            Self::InvalidPlan(_) => "The research plan could not be validated",
            Self::ToolFailure { .. } => "A research tool failed. Partial results were kept",
            Self::StorageFailure { .. } => {
                "Research memory could not be saved. Check disk space and permissions"
            }
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::StorageFailure { .. } | Self::Config(_))
    }
}
