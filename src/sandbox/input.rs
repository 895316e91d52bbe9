//! Input Sandbox
//!
//! Re-validates the parameter set of a privileged operation immediately
//! before it executes. Deliberately does not assume the Token Validator ran
//! or ran correctly: length caps, hash shapes, and numeric bounds are checked
//! again here, and every string field is re-scanned for injection
//! signatures. Denies on first violation; no partial repair.

use super::SandboxVerdict;
use crate::config::{BoundaryConfig, SignatureSet};
use crate::error::ErrorKind;
use crate::token::{ParamValue, Parameters};
use regex::Regex;
use std::sync::Arc;

#[derive(Debug)]
pub struct InputSandbox {
    config: Arc<BoundaryConfig>,
    signatures: SignatureSet,
    license_hash_re: Option<Regex>,
}

impl InputSandbox {
    pub fn new(config: Arc<BoundaryConfig>) -> Self {
        let signatures = SignatureSet::compile(&config.injection_signatures);
        let license_hash_re = match Regex::new(&config.input_sandbox.license_hash_pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(error = %err, "Skipping invalid license hash pattern");
                None
            }
        };
        Self {
            config,
            signatures,
            license_hash_re,
        }
    }

    /// Check a parameter set. Returns Deny on the first violation.
    pub fn check(&self, parameters: &Parameters) -> SandboxVerdict {
        let bounds = &self.config.input_sandbox;

        for (field, value) in parameters {
            if let Some(text) = value.as_text() {
                if text.len() > bounds.max_string_length {
                    return deny(
                        ErrorKind::SandboxSizeExceeded,
                        format!("field '{}' exceeds {} chars", field, bounds.max_string_length),
                    );
                }
                if let Some(signature) = self.signatures.first_match(text) {
                    tracing::warn!(field = field.as_str(), signature, "Injection signature in operation parameter");
                    return deny(
                        ErrorKind::InjectionDetected,
                        format!("injection signature in field '{}'", field),
                    );
                }
            }

            match value {
                ParamValue::LicenseHash(hash) => {
                    let ok = self
                        .license_hash_re
                        .as_ref()
                        .map_or(false, |re| re.is_match(hash));
                    if !ok {
                        return deny(
                            ErrorKind::SandboxShapeViolation,
                            format!("field '{}' is not a fixed-length hex hash", field),
                        );
                    }
                }
                ParamValue::AmountCents(amount) => {
                    if *amount > bounds.max_numeric_value {
                        return deny(
                            ErrorKind::TypeOrRangeViolation,
                            format!("field '{}' exceeds numeric bound", field),
                        );
                    }
                }
                ParamValue::Date(date) => {
                    if !self.config.validator.date_in_window(*date) {
                        return deny(
                            ErrorKind::TypeOrRangeViolation,
                            format!("field '{}' outside the permitted date window", field),
                        );
                    }
                }
                _ => {}
            }
        }

        SandboxVerdict::Allow
    }
}

fn deny(violation: ErrorKind, detail: String) -> SandboxVerdict {
    SandboxVerdict::Deny { violation, detail }
}
