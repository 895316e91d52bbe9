//! Boundary configuration
//!
//! All pattern sets, per-intent schemas, and sandbox bounds live here.
//! Config is loaded once at process start (by an external collaborator, or
//! from the built-in defaults), compiled into immutable regex sets, and
//! shared by `Arc` into every stage — there is no mutable global that stages
//! could diverge on mid-run.

use crate::token::{fields, Intent, ParamKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named injection signature. The name is used in audit detail and logs,
/// never in caller-facing responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignaturePattern {
    pub name: String,
    pub pattern: String,
}

impl SignaturePattern {
    fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

/// Injection signatures applied to every string-valued field crossing the
/// boundary, in either direction
pub fn default_injection_signatures() -> Vec<SignaturePattern> {
    vec![
        SignaturePattern::new(
            "instruction_override",
            r"(?i)ignore\s+(all\s+)?(previous|prior|above|earlier)\s+(instructions?|prompts?|rules|directives)",
        ),
        SignaturePattern::new(
            "role_hijack",
            r"(?i)you\s+are\s+now\s+|pretend\s+(you\s+are|to\s+be)|your\s+new\s+role",
        ),
        SignaturePattern::new("new_instructions", r"(?i)new\s+instructions?"),
        SignaturePattern::new("speaker_tag", r"(?i)\b(system|assistant)\s*:"),
        SignaturePattern::new("delimiter_injection", r"<\||\]\]\s*\[\["),
        SignaturePattern::new("code_execution", r"(?i)<script|javascript:|```"),
        SignaturePattern::new(
            "sql_metacharacters",
            r"(?i)drop\s+table|union\s+select|;\s*--",
        ),
        SignaturePattern::new(
            "jailbreak",
            r"(?i)jailbreak|DAN\s+mode|do\s+anything\s+now|bypass\s+(safety|filters?|restrictions?)",
        ),
    ]
}

/// Pre-compiled signature set. Patterns that fail to compile are skipped
/// with a warning so a bad config entry cannot take the boundary down.
#[derive(Debug)]
pub struct SignatureSet {
    patterns: Vec<(String, Regex)>,
}

impl SignatureSet {
    /// Compile a signature list
    pub fn compile(raw: &[SignaturePattern]) -> Self {
        let patterns = raw
            .iter()
            .filter_map(|sig| match Regex::new(&sig.pattern) {
                Ok(re) => Some((sig.name.clone(), re)),
                Err(err) => {
                    tracing::warn!(
                        name = sig.name.as_str(),
                        error = %err,
                        "Skipping invalid injection signature"
                    );
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// Name of the first signature matching `text`, if any
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Sensitive-literal patterns for the Pattern Sanitizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Identity-number shapes (dashed and contiguous 9-digit)
    pub identity_patterns: Vec<String>,
    /// Candidate payment-card digit runs; confirmed by Luhn checksum
    pub card_candidate_pattern: String,
    /// License-like alphanumeric code shapes
    pub license_patterns: Vec<String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            identity_patterns: vec![
                r"\b\d{3}-\d{2}-\d{4}\b".to_string(),
                r"\b\d{9}\b".to_string(),
            ],
            card_candidate_pattern: r"\b\d(?:[ \-]?\d){12,18}\b".to_string(),
            license_patterns: vec![r"\b[A-Z]{2}-(?:DL-)?\d{6,10}\b".to_string()],
        }
    }
}

/// Type/range bounds applied by the Token Validator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Reference date for the future window; `None` means today (UTC).
    /// Fixing it makes validation deterministic in tests and replays.
    pub reference_date: Option<chrono::NaiveDate>,
    /// Dates must fall within this many days after the reference date
    pub future_window_days: i64,
    /// Payment amounts must stay below this ceiling
    pub amount_ceiling_cents: u64,
    /// Allow-pattern for location values (gazetteer/airport-code shapes)
    pub location_pattern: String,
    /// Maximum location string length
    pub max_location_length: usize,
    /// Allow-pattern for booking references
    pub reference_pattern: String,
    /// Permitted license state/province codes
    pub allowed_regions: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            reference_date: None,
            future_window_days: 730,
            amount_ceiling_cents: 1_000_000,
            location_pattern: r"^[A-Za-z][A-Za-z0-9 ,.'\-]{0,99}$".to_string(),
            max_location_length: 100,
            reference_pattern: r"^[A-Z0-9\-]{4,24}$".to_string(),
            allowed_regions: default_regions(),
        }
    }
}

impl ValidatorConfig {
    /// The date the future window is anchored on
    pub fn reference(&self) -> chrono::NaiveDate {
        self.reference_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }

    /// Whether a calendar date falls inside the sane future window
    pub fn date_in_window(&self, date: chrono::NaiveDate) -> bool {
        let start = self.reference();
        let end = start + chrono::Duration::days(self.future_window_days);
        date >= start && date <= end
    }
}

fn default_regions() -> Vec<String> {
    [
        "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
        "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
        "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
        "VA", "WA", "WV", "WI", "WY", "BC", "ON", "QC", "AB", "MB", "SK",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Input Sandbox bounds (independent of validator bounds by design)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSandboxConfig {
    /// Maximum length of any string-valued parameter
    pub max_string_length: usize,
    /// License fields must match this hash shape, never a raw identifier
    pub license_hash_pattern: String,
    /// Upper bound on numeric parameters
    pub max_numeric_value: u64,
}

impl Default for InputSandboxConfig {
    fn default() -> Self {
        Self {
            max_string_length: 100,
            license_hash_pattern: r"^[a-f0-9]{64}$".to_string(),
            max_numeric_value: 1_000_000,
        }
    }
}

/// API Sandbox bounds for downstream responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSandboxConfig {
    /// Maximum serialized response size in bytes
    pub max_response_bytes: usize,
    /// Maximum element count in any returned collection
    pub max_collection_elements: usize,
    /// Maximum nesting depth of the response structure
    pub max_depth: usize,
}

impl Default for ApiSandboxConfig {
    fn default() -> Self {
        Self {
            max_response_bytes: 50_000,
            max_collection_elements: 50,
            max_depth: 8,
        }
    }
}

/// Output Sandbox deny-list and truncation bound
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSandboxConfig {
    /// Field names stripped from any response, regardless of origin or depth
    pub denied_fields: Vec<String>,
    /// Strings longer than this are truncated (output truncation is safe;
    /// no subsequent privileged decision depends on the tail)
    pub string_truncation_limit: usize,
}

impl Default for OutputSandboxConfig {
    fn default() -> Self {
        Self {
            denied_fields: [
                "ssn",
                "social_security",
                "credit_card",
                "card_number",
                "cvv",
                "raw_license",
                "password",
                "api_key",
                "secret",
                "private_key",
                "auth_token",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            string_truncation_limit: 500,
        }
    }
}

/// Closed field schema for one intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSchema {
    /// Permitted fields and the value kind each must carry
    pub allowed: BTreeMap<String, ParamKind>,
    /// Fields the intent cannot function without; a token missing one is
    /// invalid, not merely low-confidence
    pub required: Vec<String>,
}

impl IntentSchema {
    fn new(allowed: &[(&str, ParamKind)], required: &[&str]) -> Self {
        Self {
            allowed: allowed
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            required: required.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn empty() -> Self {
        Self {
            allowed: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

fn default_intent_schemas() -> BTreeMap<Intent, IntentSchema> {
    let car_fields = [
        (fields::PICKUP_LOCATION, ParamKind::Location),
        (fields::DROPOFF_LOCATION, ParamKind::Location),
        (fields::PICKUP_DATE, ParamKind::Date),
        (fields::DROPOFF_DATE, ParamKind::Date),
        (fields::CAR_CLASS, ParamKind::CarClass),
        (fields::LICENSE_HASH, ParamKind::LicenseHash),
        (fields::LICENSE_STATE, ParamKind::Region),
    ];

    let mut schemas = BTreeMap::new();
    schemas.insert(
        Intent::SearchCar,
        IntentSchema::new(&car_fields, &[fields::PICKUP_LOCATION, fields::PICKUP_DATE]),
    );
    schemas.insert(
        Intent::BookCar,
        IntentSchema::new(
            &car_fields,
            &[
                fields::PICKUP_LOCATION,
                fields::PICKUP_DATE,
                fields::LICENSE_HASH,
            ],
        ),
    );
    schemas.insert(
        Intent::SearchFlights,
        IntentSchema::new(
            &[
                (fields::ORIGIN, ParamKind::Location),
                (fields::DESTINATION, ParamKind::Location),
                (fields::DEPARTURE_DATE, ParamKind::Date),
                (fields::RETURN_DATE, ParamKind::Date),
            ],
            &[fields::ORIGIN, fields::DESTINATION],
        ),
    );
    schemas.insert(
        Intent::ProcessPayment,
        IntentSchema::new(
            &[
                (fields::AMOUNT_CENTS, ParamKind::AmountCents),
                (fields::BOOKING_REFERENCE, ParamKind::Reference),
            ],
            &[fields::AMOUNT_CENTS],
        ),
    );
    schemas.insert(
        Intent::CancelBooking,
        IntentSchema::new(
            &[(fields::BOOKING_REFERENCE, ParamKind::Reference)],
            &[fields::BOOKING_REFERENCE],
        ),
    );
    schemas.insert(
        Intent::GetItinerary,
        IntentSchema::new(&[(fields::BOOKING_REFERENCE, ParamKind::Reference)], &[]),
    );
    schemas.insert(Intent::Unknown, IntentSchema::empty());
    schemas
}

/// Complete boundary configuration.
///
/// `Default` carries built-in values for every bound and pattern, so the
/// boundary functions when the configuration collaborator supplies nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub sanitizer: SanitizerConfig,
    pub validator: ValidatorConfig,
    pub input_sandbox: InputSandboxConfig,
    pub api_sandbox: ApiSandboxConfig,
    pub output_sandbox: OutputSandboxConfig,
    /// Injection signatures shared by the validator and all sandbox layers
    pub injection_signatures: Vec<SignaturePattern>,
    /// Closed field schemas per intent
    pub intent_schemas: BTreeMap<Intent, IntentSchema>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            sanitizer: SanitizerConfig::default(),
            validator: ValidatorConfig::default(),
            input_sandbox: InputSandboxConfig::default(),
            api_sandbox: ApiSandboxConfig::default(),
            output_sandbox: OutputSandboxConfig::default(),
            injection_signatures: default_injection_signatures(),
            intent_schemas: default_intent_schemas(),
        }
    }
}

impl BoundaryConfig {
    /// Schema for an intent. Unknown intents get the empty schema, which
    /// strips every proposed field.
    pub fn intent_schema(&self, intent: Intent) -> IntentSchema {
        self.intent_schemas
            .get(&intent)
            .cloned()
            .unwrap_or_else(IntentSchema::empty)
    }
}
