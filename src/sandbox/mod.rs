//! Sandbox layers
//!
//! Defense-in-depth checks wrapped around every privileged operation:
//! - **Input Sandbox**: re-validates parameters immediately before execution,
//!   independent of the Token Validator
//! - **API Sandbox**: constrains the shape and size of downstream responses
//! - **Output Sandbox**: filters and redacts the final response
//!
//! Each layer returns a [`SandboxVerdict`]; no layer ever mutates data
//! silently — every field change is recorded in the verdict.

pub mod api;
pub mod input;
pub mod output;

pub use api::ApiSandbox;
pub use input::InputSandbox;
pub use output::OutputSandbox;

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// What a sandbox did to a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionAction {
    /// Field name is on the deny-list; removed wholesale
    FieldRemoved,
    /// String carried an injection signature; content replaced
    InjectionMasked,
    /// String exceeded the output length bound; tail dropped
    Truncated,
}

/// One recorded field change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redaction {
    /// Dotted path to the field (e.g. `cars[2].description`)
    pub path: String,
    pub action: RedactionAction,
}

/// Per-layer sandbox result
#[derive(Debug)]
pub enum SandboxVerdict {
    /// Payload passes unchanged
    Allow,
    /// Payload refused wholesale; the detail never reaches the caller
    Deny { violation: ErrorKind, detail: String },
    /// Payload passes with the listed changes applied
    Redact {
        changes: Vec<Redaction>,
        sanitized: serde_json::Value,
    },
}

impl SandboxVerdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, SandboxVerdict::Allow)
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, SandboxVerdict::Deny { .. })
    }
}
