//! Trust Boundary Orchestrator
//!
//! Composes the sanitizer, validator, sandbox layers, and audit log into one
//! request lifecycle:
//!
//! ```text
//! Received → Sanitized → Proposed → Validated → {Blocked | Authorized}
//!          → Sandboxed → Executed → Audited → Done
//! ```
//!
//! This is the only component with authority to invoke a privileged
//! operation. Exactly one operation executes per authorized token; a blocked
//! token is never retried — a new proposal must restart the lifecycle.
//! Callers receive only generic reason codes, never detection detail.

use crate::audit::{AuditLog, AuditOutcome, AuditRecord, AuditSink, AuditStage, MemorySink};
use crate::config::BoundaryConfig;
use crate::error::{ErrorKind, Result};
use crate::sandbox::{ApiSandbox, InputSandbox, OutputSandbox, SandboxVerdict};
use crate::sanitizer::{sha256_hex, PatternSanitizer};
use crate::token::{CapabilityToken, Intent, Parameters, RiskLevel, TokenProposal};
use crate::validator::TokenValidator;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Caller-facing request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Executed,
    Blocked,
}

/// Generic reason categories. Deliberately coarse: exposing which signature
/// or threshold fired would give an adversary an oracle over the detection
/// logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    InvalidRequest,
    PolicyViolation,
    ConfirmationRequired,
    ServiceUnavailable,
}

/// Caller-facing result of one boundary crossing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    pub correlation_id: Uuid,
}

/// Whether the caller supplied a confirmation for this request. Absence of
/// a confirmation channel is treated as confirmation denied (fail closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    NotProvided,
    Granted,
}

/// Context handed to the upstream parser alongside the scrubbed text
#[derive(Debug, Clone)]
pub struct ParserContext {
    /// The closed intent set the parser may propose from
    pub allowed_intents: Vec<Intent>,
    /// Pre-computed license hash, so the parser never needs the plaintext
    pub license_hash: Option<String>,
}

/// The untrusted natural-language parser. Its output is a proposal in the
/// token schema — adversarial by construction, validated before use. The
/// output type is deliberately no richer than the validated schema allows,
/// so no field addition on the parser's side can widen the boundary.
#[async_trait]
pub trait IntentParser: Send + Sync {
    async fn propose(&self, scrubbed_text: &str, context: &ParserContext) -> Result<TokenProposal>;
}

/// A privileged operation registered under an intent. Invoked with only the
/// post-Input-Sandbox parameter set; its response must hold a shape the API
/// Sandbox can structurally validate.
#[async_trait]
pub trait PrivilegedOperation: Send + Sync {
    fn intent(&self) -> Intent;
    async fn execute(&self, parameters: &Parameters) -> Result<serde_json::Value>;
}

/// Writes a cancellation audit record if the request is dropped between
/// operation invocation and the terminal audit write
struct CrossingGuard {
    audit: Arc<AuditLog>,
    record: Option<AuditRecord>,
}

impl CrossingGuard {
    fn arm(audit: Arc<AuditLog>, record: AuditRecord) -> Self {
        Self {
            audit,
            record: Some(record),
        }
    }

    fn disarm(&mut self) {
        self.record = None;
    }
}

impl Drop for CrossingGuard {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            tracing::warn!(
                correlation_id = %record.correlation_id,
                "Request cancelled after operation invocation, result discarded"
            );
            let _ = self.audit.append(record);
        }
    }
}

/// The trust boundary. Per-request state lives on the stack of
/// [`TrustBoundary::process`]; the boundary itself holds only the immutable
/// configuration, the registered collaborators, and the audit log, so many
/// requests can run concurrently over one instance.
pub struct TrustBoundary {
    parser: Arc<dyn IntentParser>,
    operations: HashMap<Intent, Arc<dyn PrivilegedOperation>>,
    sanitizer: PatternSanitizer,
    validator: TokenValidator,
    input_sandbox: InputSandbox,
    api_sandbox: ApiSandbox,
    output_sandbox: OutputSandbox,
    audit: Arc<AuditLog>,
    allowed_intents: Vec<Intent>,
}

impl TrustBoundary {
    /// Build a boundary over the in-memory audit sink
    pub fn new(config: BoundaryConfig, parser: Arc<dyn IntentParser>) -> Self {
        Self::with_sink(config, parser, Arc::new(MemorySink::new()))
    }

    /// Build a boundary over a caller-supplied audit sink
    pub fn with_sink(
        config: BoundaryConfig,
        parser: Arc<dyn IntentParser>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let config = Arc::new(config);
        let allowed_intents = config
            .intent_schemas
            .keys()
            .filter(|i| **i != Intent::Unknown)
            .copied()
            .collect();
        Self {
            parser,
            operations: HashMap::new(),
            sanitizer: PatternSanitizer::new(&config.sanitizer),
            validator: TokenValidator::new(config.clone()),
            input_sandbox: InputSandbox::new(config.clone()),
            api_sandbox: ApiSandbox::new(config.clone()),
            output_sandbox: OutputSandbox::new(config.clone()),
            audit: Arc::new(AuditLog::new(sink)),
            allowed_intents,
        }
    }

    /// Register a privileged operation under its intent. Unregistered
    /// intents are denied by default.
    pub fn register_operation(&mut self, operation: Arc<dyn PrivilegedOperation>) {
        self.operations.insert(operation.intent(), operation);
    }

    /// The audit log for this boundary
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Drive one request through the full lifecycle.
    ///
    /// Never returns an error: adversarial or malformed input, upstream and
    /// downstream failures all map to a `Blocked` response with a generic
    /// reason code and exactly one audit record.
    pub async fn process(&self, raw_input: &str, confirmation: Confirmation) -> BoundaryResponse {
        let correlation_id = Uuid::new_v4();

        // Received → Sanitized
        let sanitized = self.sanitizer.sanitize(raw_input);
        let fingerprint = sha256_hex(&sanitized.scrubbed_text)[..16].to_string();

        // Sanitized → Proposed (untrusted parser, suspension point)
        let context = ParserContext {
            allowed_intents: self.allowed_intents.clone(),
            license_hash: sanitized.license_hash().map(str::to_string),
        };
        let proposal = match self.parser.propose(&sanitized.scrubbed_text, &context).await {
            Ok(proposal) => proposal,
            Err(err) => {
                tracing::warn!(correlation_id = %correlation_id, error = %err, "Upstream parser failed, failing closed");
                return self.block(
                    correlation_id,
                    &fingerprint,
                    AuditStage::Parser,
                    AuditOutcome::BlockedUpstream,
                    None,
                    Some(ErrorKind::UpstreamUnavailable),
                    ReasonCode::ServiceUnavailable,
                );
            }
        };

        // Proposed → Validated
        let report = self.validator.validate(&proposal, &sanitized);
        let token = report.token.clone();

        // Validated → Blocked: injection is terminal, the Input Sandbox is
        // never invoked for this token
        if token.injection_detected {
            return self.block(
                correlation_id,
                &fingerprint,
                AuditStage::Validator,
                AuditOutcome::BlockedInjection,
                Some(&token),
                Some(ErrorKind::InjectionDetected),
                ReasonCode::PolicyViolation,
            );
        }

        if token.intent == Intent::Unknown {
            return self.block(
                correlation_id,
                &fingerprint,
                AuditStage::Validator,
                AuditOutcome::BlockedPolicy,
                Some(&token),
                report.first_violation(),
                ReasonCode::InvalidRequest,
            );
        }

        let Some(operation) = self.operations.get(&token.intent) else {
            return self.block(
                correlation_id,
                &fingerprint,
                AuditStage::Boundary,
                AuditOutcome::BlockedPolicy,
                Some(&token),
                None,
                ReasonCode::InvalidRequest,
            );
        };

        if token.requires_confirmation() && confirmation != Confirmation::Granted {
            return self.block(
                correlation_id,
                &fingerprint,
                AuditStage::Boundary,
                AuditOutcome::AwaitingConfirmation,
                Some(&token),
                Some(ErrorKind::ConfirmationRequired),
                ReasonCode::ConfirmationRequired,
            );
        }

        // Authorized → Sandboxed
        if let SandboxVerdict::Deny { violation, detail } =
            self.input_sandbox.check(&token.parameters)
        {
            tracing::warn!(correlation_id = %correlation_id, detail, "Input sandbox denied parameters");
            return self.block(
                correlation_id,
                &fingerprint,
                AuditStage::InputSandbox,
                AuditOutcome::BlockedSandbox,
                Some(&token),
                Some(violation),
                ReasonCode::PolicyViolation,
            );
        }

        // Sandboxed → Executed. The guard covers cancellation between
        // invocation and the terminal audit write.
        let mut guard = CrossingGuard::arm(
            self.audit.clone(),
            self.record(
                correlation_id,
                &fingerprint,
                AuditStage::Operation,
                AuditOutcome::Cancelled,
                Some(&token),
                None,
            ),
        );

        let raw_response = match operation.execute(&token.parameters).await {
            Ok(response) => response,
            Err(err) => {
                guard.disarm();
                tracing::warn!(correlation_id = %correlation_id, error = %err, "Privileged operation failed");
                return self.block(
                    correlation_id,
                    &fingerprint,
                    AuditStage::Operation,
                    AuditOutcome::BlockedDownstream,
                    Some(&token),
                    Some(ErrorKind::DownstreamUnavailable),
                    ReasonCode::ServiceUnavailable,
                );
            }
        };

        if let SandboxVerdict::Deny { violation, detail } = self.api_sandbox.check(&raw_response) {
            guard.disarm();
            tracing::warn!(correlation_id = %correlation_id, detail, "API sandbox denied downstream response");
            return self.block(
                correlation_id,
                &fingerprint,
                AuditStage::ApiSandbox,
                AuditOutcome::BlockedSandbox,
                Some(&token),
                Some(violation),
                ReasonCode::PolicyViolation,
            );
        }

        let data = match self.output_sandbox.check(&raw_response) {
            SandboxVerdict::Allow => raw_response,
            SandboxVerdict::Redact { changes, sanitized } => {
                tracing::debug!(
                    correlation_id = %correlation_id,
                    redactions = changes.len(),
                    "Output sandbox redacted response fields"
                );
                sanitized
            }
            SandboxVerdict::Deny { violation, detail } => {
                guard.disarm();
                tracing::warn!(correlation_id = %correlation_id, detail, "Output sandbox denied response");
                return self.block(
                    correlation_id,
                    &fingerprint,
                    AuditStage::OutputSandbox,
                    AuditOutcome::BlockedSandbox,
                    Some(&token),
                    Some(violation),
                    ReasonCode::PolicyViolation,
                );
            }
        };

        // Executed → Audited → Done. A failed write is buffered inside the
        // log and must not block the already-made decision.
        guard.disarm();
        let _ = self.audit.append(self.record(
            correlation_id,
            &fingerprint,
            AuditStage::Boundary,
            AuditOutcome::Executed,
            Some(&token),
            None,
        ));

        BoundaryResponse {
            status: ResponseStatus::Executed,
            data: Some(data),
            reason: None,
            correlation_id,
        }
    }

    fn record(
        &self,
        correlation_id: Uuid,
        fingerprint: &str,
        stage: AuditStage,
        outcome: AuditOutcome,
        token: Option<&CapabilityToken>,
        violation: Option<ErrorKind>,
    ) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            correlation_id,
            stage,
            fingerprint: fingerprint.to_string(),
            outcome,
            risk_level: token.map_or(RiskLevel::Low, |t| t.risk_level),
            injection_detected: token.is_some_and(|t| t.injection_detected),
            violation,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn block(
        &self,
        correlation_id: Uuid,
        fingerprint: &str,
        stage: AuditStage,
        outcome: AuditOutcome,
        token: Option<&CapabilityToken>,
        violation: Option<ErrorKind>,
        reason: ReasonCode,
    ) -> BoundaryResponse {
        let _ = self.audit.append(self.record(
            correlation_id,
            fingerprint,
            stage,
            outcome,
            token,
            violation,
        ));
        BoundaryResponse {
            status: ResponseStatus::Blocked,
            data: None,
            reason: Some(reason),
            correlation_id,
        }
    }
}
