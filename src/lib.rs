//! # trustgate
//!
//! A trust boundary between untrusted natural-language input and privileged
//! travel and payment operations.
//!
//! ## Overview
//!
//! `trustgate` mediates every crossing from conversational input to a real
//! side effect. Free text is sanitized, an untrusted parser proposes a
//! capability token, the token is validated against a closed schema, and
//! three sandbox layers constrain what goes into and comes out of the
//! privileged operation. Every terminal decision leaves an audit record.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trustgate::{BoundaryConfig, Confirmation, TrustBoundary};
//! # use trustgate::{IntentParser, ParserContext, TokenProposal, Result};
//! # struct MyParser;
//! # #[async_trait::async_trait]
//! # impl IntentParser for MyParser {
//! #     async fn propose(&self, _: &str, _: &ParserContext) -> Result<TokenProposal> {
//! #         Ok(TokenProposal::default())
//! #     }
//! # }
//!
//! # async fn example() {
//! let mut boundary = TrustBoundary::new(BoundaryConfig::default(), Arc::new(MyParser));
//! // boundary.register_operation(Arc::new(CarSearchService::new(...)));
//!
//! let response = boundary
//!     .process("rent me an SUV in SFO on 2026-04-10", Confirmation::NotProvided)
//!     .await;
//! println!("{:?} ({})", response.status, response.correlation_id);
//! # }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! Received → Sanitized → Proposed → Validated → {Blocked | Authorized}
//!          → Sandboxed → Executed → Audited → Done
//! ```
//!
//! ## Architecture
//!
//! - **PatternSanitizer** — scrubs identity numbers, payment cards, and
//!   license codes into hashed placeholders before any text leaves process
//! - **TokenValidator** — turns untrusted proposals into validated
//!   [`CapabilityToken`]s; risk and injection flags only ever raise
//! - **InputSandbox / ApiSandbox / OutputSandbox** — independent re-checks
//!   around the privileged operation; deny inward, redact outward
//! - **TrustBoundary** — the orchestrator, the only component allowed to
//!   invoke a [`PrivilegedOperation`]
//! - **AuditLog** — append-only record of every terminal decision

pub mod audit;
pub mod boundary;
pub mod config;
pub mod error;
pub mod sandbox;
pub mod sanitizer;
pub mod token;
pub mod validator;

// Re-export core types
pub use audit::{AuditLog, AuditOutcome, AuditRecord, AuditSink, AuditStage, MemorySink};
pub use boundary::{
    BoundaryResponse, Confirmation, IntentParser, ParserContext, PrivilegedOperation, ReasonCode,
    ResponseStatus, TrustBoundary,
};
pub use config::{BoundaryConfig, IntentSchema, SanitizerConfig, SignaturePattern, ValidatorConfig};
pub use error::{BoundaryError, ErrorKind, Result};
pub use sandbox::{ApiSandbox, InputSandbox, OutputSandbox, Redaction, RedactionAction, SandboxVerdict};
pub use sanitizer::{PatternSanitizer, PlaceholderRecord, SanitizedInput, SensitiveClass};
pub use token::{
    CapabilityToken, CarClass, Intent, ParamKind, ParamValue, Parameters, RiskLevel, TokenProposal,
};
pub use validator::{TokenValidator, ValidationReport, Violation};
