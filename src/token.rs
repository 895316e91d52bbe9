//! Capability tokens
//!
//! A [`CapabilityToken`] is the only artifact permitted to cross the trust
//! boundary. It carries a closed intent enumeration, typed parameters (never
//! arbitrary free text), and sticky risk/injection flags that merge as a
//! monotone lattice: any stage may raise them, no stage may lower them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel the upstream parser emits for fields it cannot determine.
/// Sentinel-valued fields are stripped during validation, never guessed.
pub const UNRESOLVED: &str = "unresolved";

/// Canonical parameter field names
pub mod fields {
    pub const PICKUP_LOCATION: &str = "pickup_location";
    pub const DROPOFF_LOCATION: &str = "dropoff_location";
    pub const PICKUP_DATE: &str = "pickup_date";
    pub const DROPOFF_DATE: &str = "dropoff_date";
    pub const CAR_CLASS: &str = "car_class";
    pub const LICENSE_HASH: &str = "license_hash";
    pub const LICENSE_STATE: &str = "license_state";
    pub const ORIGIN: &str = "origin";
    pub const DESTINATION: &str = "destination";
    pub const DEPARTURE_DATE: &str = "departure_date";
    pub const RETURN_DATE: &str = "return_date";
    pub const AMOUNT_CENTS: &str = "amount_cents";
    pub const BOOKING_REFERENCE: &str = "booking_reference";
}

/// Closed set of permitted intents. Anything the upstream parser emits that
/// does not map onto one of these normalizes to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SearchCar,
    BookCar,
    SearchFlights,
    ProcessPayment,
    CancelBooking,
    GetItinerary,
    Unknown,
}

impl Intent {
    /// Parse an untrusted intent string; unmapped values become `Unknown`
    pub fn from_untrusted(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "search_car" => Intent::SearchCar,
            "book_car" => Intent::BookCar,
            "search_flights" => Intent::SearchFlights,
            "process_payment" => Intent::ProcessPayment,
            "cancel_booking" => Intent::CancelBooking,
            "get_itinerary" => Intent::GetItinerary,
            _ => Intent::Unknown,
        }
    }

    /// Write intents have real-world side effects and always require
    /// user confirmation, regardless of risk level.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Intent::BookCar | Intent::ProcessPayment | Intent::CancelBooking
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SearchCar => "search_car",
            Intent::BookCar => "book_car",
            Intent::SearchFlights => "search_flights",
            Intent::ProcessPayment => "process_payment",
            Intent::CancelBooking => "cancel_booking",
            Intent::GetItinerary => "get_itinerary",
            Intent::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered risk level. `merge` is `max`, so risk is monotonically
/// non-decreasing across pipeline stages; `High` is sticky.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Lattice merge: the higher of the two levels wins
    pub fn merge(self, other: RiskLevel) -> RiskLevel {
        self.max(other)
    }

    /// Parse an untrusted risk string; unmapped values are treated as the
    /// caller not having declared a risk (`Low`), which validation can only
    /// raise.
    pub fn from_untrusted(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "medium" => RiskLevel::Medium,
            "high" => RiskLevel::High,
            _ => RiskLevel::Low,
        }
    }
}

/// Permitted rental car classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarClass {
    Economy,
    Midsize,
    Suv,
    Luxury,
    Any,
}

impl CarClass {
    pub fn from_untrusted(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "economy" => Some(CarClass::Economy),
            "midsize" => Some(CarClass::Midsize),
            "suv" => Some(CarClass::Suv),
            "luxury" => Some(CarClass::Luxury),
            "any" => Some(CarClass::Any),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CarClass::Economy => "economy",
            CarClass::Midsize => "midsize",
            CarClass::Suv => "suv",
            CarClass::Luxury => "luxury",
            CarClass::Any => "any",
        }
    }
}

/// Expected value type for a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Date,
    Location,
    CarClass,
    LicenseHash,
    Region,
    AmountCents,
    Reference,
}

/// A typed, constrained parameter value. There is deliberately no free-text
/// variant: every value that crosses the boundary has a closed shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Date(NaiveDate),
    AmountCents(u64),
    Location(String),
    CarClass(CarClass),
    LicenseHash(String),
    Region(String),
    Reference(String),
}

impl ParamValue {
    /// The kind this value satisfies
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Date(_) => ParamKind::Date,
            ParamValue::AmountCents(_) => ParamKind::AmountCents,
            ParamValue::Location(_) => ParamKind::Location,
            ParamValue::CarClass(_) => ParamKind::CarClass,
            ParamValue::LicenseHash(_) => ParamKind::LicenseHash,
            ParamValue::Region(_) => ParamKind::Region,
            ParamValue::Reference(_) => ParamKind::Reference,
        }
    }

    /// String content for scanning, if this variant carries one
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Location(s)
            | ParamValue::LicenseHash(s)
            | ParamValue::Region(s)
            | ParamValue::Reference(s) => Some(s),
            _ => None,
        }
    }

    /// Render back to the untrusted wire shape (used for re-validation)
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            ParamValue::AmountCents(a) => serde_json::Value::Number((*a).into()),
            ParamValue::Location(s) | ParamValue::LicenseHash(s) | ParamValue::Region(s)
            | ParamValue::Reference(s) => serde_json::Value::String(s.clone()),
            ParamValue::CarClass(c) => serde_json::Value::String(c.as_str().to_string()),
        }
    }
}

/// Validated parameter set, keyed by canonical field name
pub type Parameters = BTreeMap<String, ParamValue>;

/// The untrusted shape the upstream parser emits. Nothing in here is
/// believed until [`crate::validator::TokenValidator::validate`] has run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenProposal {
    /// Proposed intent, as a raw string
    pub intent: String,
    /// Declared risk level, advisory only
    #[serde(default)]
    pub risk_level: String,
    /// Parser's best-effort injection flag; advisory, can only raise
    #[serde(default)]
    pub injection_detected: bool,
    /// Parser's confirmation hint; advisory, can only raise
    #[serde(default)]
    pub user_confirmation_required: bool,
    /// Proposed parameters, untyped
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// Validated capability token — the only thing allowed across the boundary.
///
/// Immutable after validation: the validator constructs it exactly once per
/// proposal, and re-validating it is a fixed point. A new privileged
/// operation requires a new token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub intent: Intent,
    pub parameters: Parameters,
    pub risk_level: RiskLevel,
    pub injection_detected: bool,
    pub user_confirmation_required: bool,
}

impl CapabilityToken {
    /// Terminal token for proposals that failed validation outright
    pub fn blocked() -> Self {
        Self {
            intent: Intent::Unknown,
            parameters: Parameters::new(),
            risk_level: RiskLevel::High,
            injection_detected: false,
            user_confirmation_required: true,
        }
    }

    /// Whether the boundary may authorize this token at all
    pub fn requires_confirmation(&self) -> bool {
        self.user_confirmation_required
            || self.risk_level == RiskLevel::High
            || self.intent.is_write()
    }

    /// Render back to the untrusted proposal shape. Used to verify the
    /// validator is a fixed point on already-valid tokens.
    pub fn to_proposal(&self) -> TokenProposal {
        TokenProposal {
            intent: self.intent.as_str().to_string(),
            risk_level: match self.risk_level {
                RiskLevel::Low => "low".to_string(),
                RiskLevel::Medium => "medium".to_string(),
                RiskLevel::High => "high".to_string(),
            },
            injection_detected: self.injection_detected,
            user_confirmation_required: self.user_confirmation_required,
            parameters: self
                .parameters
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_intent_normalizes() {
        assert_eq!(Intent::from_untrusted("search_car"), Intent::SearchCar);
        assert_eq!(Intent::from_untrusted("SEARCH_CAR"), Intent::SearchCar);
        assert_eq!(Intent::from_untrusted("launch_missiles"), Intent::Unknown);
        assert_eq!(Intent::from_untrusted(""), Intent::Unknown);
    }

    #[test]
    fn test_risk_merge_is_max() {
        assert_eq!(RiskLevel::Low.merge(RiskLevel::Medium), RiskLevel::Medium);
        assert_eq!(RiskLevel::High.merge(RiskLevel::Low), RiskLevel::High);
        assert_eq!(RiskLevel::Medium.merge(RiskLevel::Medium), RiskLevel::Medium);
    }

    #[test]
    fn test_risk_merge_never_lowers() {
        for a in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            for b in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
                assert!(a.merge(b) >= a);
                assert!(a.merge(b) >= b);
            }
        }
    }

    #[test]
    fn test_write_intents() {
        assert!(Intent::BookCar.is_write());
        assert!(Intent::ProcessPayment.is_write());
        assert!(Intent::CancelBooking.is_write());
        assert!(!Intent::SearchCar.is_write());
        assert!(!Intent::GetItinerary.is_write());
    }

    #[test]
    fn test_blocked_token_is_terminal() {
        let token = CapabilityToken::blocked();
        assert_eq!(token.intent, Intent::Unknown);
        assert_eq!(token.risk_level, RiskLevel::High);
        assert!(token.requires_confirmation());
        assert!(token.parameters.is_empty());
    }

    #[test]
    fn test_param_value_roundtrip_json() {
        let date = ParamValue::Date(NaiveDate::from_ymd_opt(2026, 4, 10).unwrap());
        assert_eq!(date.to_json(), serde_json::json!("2026-04-10"));

        let amount = ParamValue::AmountCents(12_500);
        assert_eq!(amount.to_json(), serde_json::json!(12_500));

        let class = ParamValue::CarClass(CarClass::Suv);
        assert_eq!(class.to_json(), serde_json::json!("suv"));
    }

    #[test]
    fn test_proposal_deserializes_with_defaults() {
        let proposal: TokenProposal =
            serde_json::from_str(r#"{"intent": "search_car"}"#).unwrap();
        assert_eq!(proposal.intent, "search_car");
        assert!(!proposal.injection_detected);
        assert!(proposal.parameters.is_empty());
    }

    #[test]
    fn test_token_serialization_roundtrip() {
        let mut parameters = Parameters::new();
        parameters.insert(
            fields::PICKUP_LOCATION.to_string(),
            ParamValue::Location("SFO".to_string()),
        );
        let token = CapabilityToken {
            intent: Intent::SearchCar,
            parameters,
            risk_level: RiskLevel::Low,
            injection_detected: false,
            user_confirmation_required: false,
        };
        let json = serde_json::to_string(&token).unwrap();
        let parsed: CapabilityToken = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, token);
    }
}
