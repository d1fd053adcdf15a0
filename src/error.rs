//! Error taxonomy for the pipeline orchestration core.
//!
//! Mirrors the five error families from the design: pipeline, provider, router,
//! template, and configuration errors. Every constructor logs at the point of
//! creation, so an error is observed exactly once at its origin rather than at
//! every layer that re-wraps it.

use crate::logging::{log_error, log_warn};
use std::path::PathBuf;

/// Broad category used for metrics/alerting, independent of the specific variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    BusinessLogic,
    External,
    Internal,
    Client,
    Transient,
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    // --- Pipeline errors ---
    #[error("invalid pipeline state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("phase {phase} failed")]
    PhaseFailed { phase: u8 },

    #[error("session cannot be resumed: {reason}")]
    ResumeNotPossible { reason: String },

    #[error("failed to persist pipeline state to {path}: {message}")]
    PersistenceFailed { path: PathBuf, message: String },

    // --- Provider errors ---
    #[error("provider {provider} connection failed: {message}")]
    ConnectionFailed { provider: String, message: String },

    #[error("provider {provider} session expired")]
    SessionExpired { provider: String },

    #[error("provider {provider} login failed: {message}")]
    LoginFailed { provider: String, message: String },

    #[error("provider {provider} response detection failed")]
    ResponseDetectionFailed { provider: String },

    #[error("provider {provider} rate limited, retry after {retry_after_seconds}s")]
    RateLimited {
        provider: String,
        retry_after_seconds: u64,
    },

    // --- Router errors ---
    #[error("no mapping for phase={phase}, task={task}, doc_type={doc_type}")]
    NoMapping {
        phase: u8,
        task: String,
        doc_type: String,
    },

    #[error("no provider registered for tag {tag}")]
    NoProvider { tag: String },

    // --- Template errors ---
    #[error("template {name} not found")]
    TemplateNotFound { name: String },

    #[error("template {name} failed to render: {message}")]
    TemplateRenderFailed { name: String, message: String },

    // --- Configuration errors ---
    #[error("missing configuration: {field}")]
    ConfigMissing { field: String },

    #[error("invalid configuration: {message}")]
    ConfigInvalid { message: String },
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidStateTransition { .. }
            | Self::PhaseFailed { .. }
            | Self::NoMapping { .. }
            | Self::NoProvider { .. } => ErrorCategory::BusinessLogic,

            Self::ConnectionFailed { .. }
            | Self::SessionExpired { .. }
            | Self::LoginFailed { .. }
            | Self::ResponseDetectionFailed { .. } => ErrorCategory::External,

            Self::RateLimited { .. } => ErrorCategory::Transient,

            Self::ResumeNotPossible { .. } | Self::PersistenceFailed { .. } => {
                ErrorCategory::Internal
            }

            Self::TemplateNotFound { .. } | Self::TemplateRenderFailed { .. } => {
                ErrorCategory::BusinessLogic
            }

            Self::ConfigMissing { .. } | Self::ConfigInvalid { .. } => ErrorCategory::Client,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::RateLimited { .. }
                | Self::ResponseDetectionFailed { .. }
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited {
                provider,
                retry_after_seconds,
            } => format!("{provider} is rate limiting requests, retry in {retry_after_seconds}s"),
            other => other.to_string(),
        }
    }

    pub fn persistence_failed(path: PathBuf, message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(path = %path.display(), message = %message, "pipeline state persistence failed");
        Self::PersistenceFailed { path, message }
    }

    pub fn no_mapping(phase: u8, task: impl Into<String>, doc_type: impl Into<String>) -> Self {
        let task = task.into();
        let doc_type = doc_type.into();
        log_warn!(phase, %task, %doc_type, "router has no mapping for this combination");
        Self::NoMapping {
            phase,
            task,
            doc_type,
        }
    }

    pub fn no_provider(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        log_warn!(%tag, "no provider registered for tag");
        Self::NoProvider { tag }
    }

    pub fn resume_not_possible(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        log_warn!(%reason, "session resume not possible");
        Self::ResumeNotPossible { reason }
    }
}
