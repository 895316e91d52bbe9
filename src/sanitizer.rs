//! Pattern Sanitizer
//!
//! Detects and irreversibly hashes sensitive literals (identity numbers,
//! payment-card numbers, license codes) in raw text before that text is
//! forwarded to the untrusted parser. Detection is purely syntactic — false
//! positives are preferred over false negatives. The hash, never the original
//! value, is the only form of a detected literal allowed to exist beyond this
//! module's scope.

use crate::config::SanitizerConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Classes of sensitive literals the sanitizer scrubs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveClass {
    /// Fixed-length identity numbers (e.g. 9-digit, dashed or contiguous)
    IdentityNumber,
    /// Card-like digit sequences passing the Luhn checksum
    PaymentCard,
    /// License-like alphanumeric codes
    LicenseCode,
}

impl SensitiveClass {
    fn label(&self) -> &'static str {
        match self {
            SensitiveClass::IdentityNumber => "IDENTITY",
            SensitiveClass::PaymentCard => "PAYMENT_CARD",
            SensitiveClass::LicenseCode => "LICENSE",
        }
    }
}

/// One scrubbed literal: the placeholder that replaced it and the one-way
/// hash of the original. No reverse mapping exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderRecord {
    pub placeholder: String,
    pub class: SensitiveClass,
    pub hash: String,
}

/// Raw text with sensitive literals replaced by placeholders, plus the
/// placeholder → hash side table. Dropped with the request.
#[derive(Debug)]
pub struct SanitizedInput {
    pub scrubbed_text: String,
    pub placeholders: Vec<PlaceholderRecord>,
}

impl SanitizedInput {
    /// No sensitive literals were found
    pub fn is_clean(&self) -> bool {
        self.placeholders.is_empty()
    }

    /// Hash of the first license-class literal, if one was scrubbed.
    /// This is what may be attached to a token — never the plaintext.
    pub fn license_hash(&self) -> Option<&str> {
        self.placeholders
            .iter()
            .find(|p| p.class == SensitiveClass::LicenseCode)
            .map(|p| p.hash.as_str())
    }
}

/// Lowercase hex SHA-256 of a string
pub(crate) fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Luhn checksum over a digit string; non-digits make it invalid
fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    let mut double = false;
    for ch in digits.chars().rev() {
        let Some(d) = ch.to_digit(10) else {
            return false;
        };
        let d = if double {
            let doubled = d * 2;
            if doubled > 9 {
                doubled - 9
            } else {
                doubled
            }
        } else {
            d
        };
        sum += d;
        double = !double;
    }
    sum % 10 == 0
}

#[derive(Debug)]
struct Detection {
    start: usize,
    end: usize,
    class: SensitiveClass,
}

/// Deterministic, order-preserving sensitive-literal scrubber
#[derive(Debug)]
pub struct PatternSanitizer {
    identity: Vec<Regex>,
    card: Option<Regex>,
    license: Vec<Regex>,
}

impl PatternSanitizer {
    /// Compile sanitizer patterns. Invalid patterns are skipped with a
    /// warning rather than failing construction.
    pub fn new(config: &SanitizerConfig) -> Self {
        let compile = |patterns: &[String], which: &str| -> Vec<Regex> {
            patterns
                .iter()
                .filter_map(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(err) => {
                        tracing::warn!(class = which, error = %err, "Skipping invalid sanitizer pattern");
                        None
                    }
                })
                .collect()
        };

        let card = match Regex::new(&config.card_candidate_pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(class = "card", error = %err, "Skipping invalid sanitizer pattern");
                None
            }
        };

        Self {
            identity: compile(&config.identity_patterns, "identity"),
            card,
            license: compile(&config.license_patterns, "license"),
        }
    }

    /// Scrub sensitive literals from `raw_text`.
    ///
    /// Each match is replaced by a placeholder unique per match, numbered per
    /// class in order of appearance, so identical input always produces
    /// identical output. Absence of matches is a normal result.
    pub fn sanitize(&self, raw_text: &str) -> SanitizedInput {
        let mut detections = Vec::new();

        for re in &self.license {
            for m in re.find_iter(raw_text) {
                detections.push(Detection {
                    start: m.start(),
                    end: m.end(),
                    class: SensitiveClass::LicenseCode,
                });
            }
        }
        if let Some(re) = &self.card {
            for m in re.find_iter(raw_text) {
                let digits: String = m.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
                if (13..=19).contains(&digits.len()) && luhn_valid(&digits) {
                    detections.push(Detection {
                        start: m.start(),
                        end: m.end(),
                        class: SensitiveClass::PaymentCard,
                    });
                }
            }
        }
        for re in &self.identity {
            for m in re.find_iter(raw_text) {
                detections.push(Detection {
                    start: m.start(),
                    end: m.end(),
                    class: SensitiveClass::IdentityNumber,
                });
            }
        }

        // Earliest match wins; on equal start the longer match wins.
        // Later overlapping matches are dropped.
        detections.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| b.end.cmp(&a.end))
        });
        let mut kept: Vec<Detection> = Vec::new();
        for d in detections {
            if kept.last().map_or(true, |prev| d.start >= prev.end) {
                kept.push(d);
            }
        }

        let mut scrubbed = String::with_capacity(raw_text.len());
        let mut placeholders = Vec::new();
        let mut counters = [0usize; 3];
        let mut cursor = 0usize;

        for d in &kept {
            let idx = match d.class {
                SensitiveClass::IdentityNumber => 0,
                SensitiveClass::PaymentCard => 1,
                SensitiveClass::LicenseCode => 2,
            };
            counters[idx] += 1;
            let placeholder = format!("[{}_{}]", d.class.label(), counters[idx]);

            scrubbed.push_str(&raw_text[cursor..d.start]);
            scrubbed.push_str(&placeholder);
            cursor = d.end;

            tracing::debug!(class = d.class.label(), "Scrubbed sensitive literal");
            placeholders.push(PlaceholderRecord {
                placeholder,
                class: d.class,
                hash: sha256_hex(&raw_text[d.start..d.end]),
            });
        }
        scrubbed.push_str(&raw_text[cursor..]);

        SanitizedInput {
            scrubbed_text: scrubbed,
            placeholders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sanitizer() -> PatternSanitizer {
        PatternSanitizer::new(&SanitizerConfig::default())
    }

    #[test]
    fn test_clean_text_passes_through() {
        let sanitizer = make_sanitizer();
        let result = sanitizer.sanitize("Rent me an SUV in SFO from April 10 to April 15");
        assert!(result.is_clean());
        assert_eq!(
            result.scrubbed_text,
            "Rent me an SUV in SFO from April 10 to April 15"
        );
    }

    #[test]
    fn test_identity_number_scrubbed() {
        let sanitizer = make_sanitizer();
        let result = sanitizer.sanitize("My SSN is 123-45-6789, please book");
        assert!(!result.scrubbed_text.contains("123-45-6789"));
        assert!(result.scrubbed_text.contains("[IDENTITY_1]"));
        assert_eq!(result.placeholders.len(), 1);
        assert_eq!(
            result.placeholders[0].class,
            SensitiveClass::IdentityNumber
        );
    }

    #[test]
    fn test_card_number_scrubbed_when_luhn_valid() {
        let sanitizer = make_sanitizer();
        // 4111 1111 1111 1111 passes Luhn
        let result = sanitizer.sanitize("Charge card 4111 1111 1111 1111 for the booking");
        assert!(!result.scrubbed_text.contains("4111 1111 1111 1111"));
        assert!(result.scrubbed_text.contains("[PAYMENT_CARD_1]"));
        assert_eq!(result.placeholders.len(), 1);
        assert_eq!(result.placeholders[0].class, SensitiveClass::PaymentCard);
    }

    #[test]
    fn test_luhn_invalid_run_not_treated_as_card() {
        let sanitizer = make_sanitizer();
        let result = sanitizer.sanitize("Tracking id 4111 1111 1111 1112 arrived");
        assert!(result
            .placeholders
            .iter()
            .all(|p| p.class != SensitiveClass::PaymentCard));
    }

    #[test]
    fn test_license_code_scrubbed_and_hash_exposed() {
        let sanitizer = make_sanitizer();
        let result = sanitizer.sanitize("My license is CA-DL-1234567, state CA");
        assert!(!result.scrubbed_text.contains("CA-DL-1234567"));
        assert!(result.scrubbed_text.contains("[LICENSE_1]"));
        let hash = result.license_hash().unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_is_stable_across_runs() {
        let sanitizer = make_sanitizer();
        let a = sanitizer.sanitize("card 4111-1111-1111-1111 thanks");
        let b = sanitizer.sanitize("card 4111-1111-1111-1111 thanks");
        assert_eq!(a.scrubbed_text, b.scrubbed_text);
        assert_eq!(a.placeholders[0].hash, b.placeholders[0].hash);
    }

    #[test]
    fn test_placeholders_are_order_preserving() {
        let sanitizer = make_sanitizer();
        let result =
            sanitizer.sanitize("First 111-22-3333 then 444-55-6666 in one request");
        assert_eq!(result.placeholders.len(), 2);
        assert_eq!(result.placeholders[0].placeholder, "[IDENTITY_1]");
        assert_eq!(result.placeholders[1].placeholder, "[IDENTITY_2]");
        let first = result.scrubbed_text.find("[IDENTITY_1]").unwrap();
        let second = result.scrubbed_text.find("[IDENTITY_2]").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_card_not_double_matched_as_identity() {
        let sanitizer = make_sanitizer();
        let result = sanitizer.sanitize("pay with 4111111111111111 now");
        assert_eq!(result.placeholders.len(), 1);
        assert_eq!(result.placeholders[0].class, SensitiveClass::PaymentCard);
    }

    #[test]
    fn test_no_reverse_mapping_in_side_table() {
        let sanitizer = make_sanitizer();
        let result = sanitizer.sanitize("SSN 123-45-6789");
        let serialized = serde_json::to_string(&result.placeholders).unwrap();
        assert!(!serialized.contains("123-45-6789"));
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111111111111111"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid("411a111111111111"));
    }
}
