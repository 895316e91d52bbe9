//! Error types for trustgate

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while a request crosses the trust boundary
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// Field outside the closed schema for the token's intent
    #[error("Schema violation in field '{field}': {reason}")]
    SchemaViolation { field: String, reason: String },

    /// Value failed a type or range constraint
    #[error("Type or range violation in field '{field}': {reason}")]
    TypeOrRangeViolation { field: String, reason: String },

    /// An injection signature matched a string-valued field
    #[error("Injection pattern detected in '{field}'")]
    InjectionDetected { field: String },

    /// A sandboxed payload exceeded a configured size or count cap
    #[error("Sandbox size limit exceeded: {0}")]
    SandboxSizeExceeded(String),

    /// A sandboxed payload did not match the expected structure
    #[error("Sandbox shape violation: {0}")]
    SandboxShapeViolation(String),

    /// The operation needs a user confirmation the caller did not supply
    #[error("User confirmation required for intent '{0}'")]
    ConfirmationRequired(String),

    /// The untrusted parser collaborator failed or timed out
    #[error("Upstream parser unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The privileged operation or its downstream service failed
    #[error("Downstream service unavailable: {0}")]
    DownstreamUnavailable(String),

    /// The audit sink rejected an append
    #[error("Audit write failed: {0}")]
    AuditWriteFailure(String),
}

/// Discriminant-only view of [`BoundaryError`], used in audit records and
/// sandbox verdicts where the payload must not leak to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaViolation,
    TypeOrRangeViolation,
    InjectionDetected,
    SandboxSizeExceeded,
    SandboxShapeViolation,
    ConfirmationRequired,
    UpstreamUnavailable,
    DownstreamUnavailable,
    AuditWriteFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::SchemaViolation => "SchemaViolation",
            ErrorKind::TypeOrRangeViolation => "TypeOrRangeViolation",
            ErrorKind::InjectionDetected => "InjectionDetected",
            ErrorKind::SandboxSizeExceeded => "SandboxSizeExceeded",
            ErrorKind::SandboxShapeViolation => "SandboxShapeViolation",
            ErrorKind::ConfirmationRequired => "ConfirmationRequired",
            ErrorKind::UpstreamUnavailable => "UpstreamUnavailable",
            ErrorKind::DownstreamUnavailable => "DownstreamUnavailable",
            ErrorKind::AuditWriteFailure => "AuditWriteFailure",
        };
        write!(f, "{}", name)
    }
}

impl BoundaryError {
    /// Map an error to its payload-free kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            BoundaryError::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            BoundaryError::TypeOrRangeViolation { .. } => ErrorKind::TypeOrRangeViolation,
            BoundaryError::InjectionDetected { .. } => ErrorKind::InjectionDetected,
            BoundaryError::SandboxSizeExceeded(_) => ErrorKind::SandboxSizeExceeded,
            BoundaryError::SandboxShapeViolation(_) => ErrorKind::SandboxShapeViolation,
            BoundaryError::ConfirmationRequired(_) => ErrorKind::ConfirmationRequired,
            BoundaryError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            BoundaryError::DownstreamUnavailable(_) => ErrorKind::DownstreamUnavailable,
            BoundaryError::AuditWriteFailure(_) => ErrorKind::AuditWriteFailure,
        }
    }
}

/// Result type alias for boundary operations
pub type Result<T> = std::result::Result<T, BoundaryError>;
