//! API Sandbox
//!
//! Constrains whatever a downstream service returns before that result is
//! used further. The service is trusted as a capability but untrusted as
//! data: oversized or malformed responses are denied wholesale, never
//! truncated — partial data from an untrusted source may itself be
//! attacker-shaped.

use super::SandboxVerdict;
use crate::config::BoundaryConfig;
use crate::error::ErrorKind;
use std::sync::Arc;

#[derive(Debug)]
pub struct ApiSandbox {
    config: Arc<BoundaryConfig>,
}

impl ApiSandbox {
    pub fn new(config: Arc<BoundaryConfig>) -> Self {
        Self { config }
    }

    /// Check a raw downstream response against size, count, and shape caps
    pub fn check(&self, response: &serde_json::Value) -> SandboxVerdict {
        let bounds = &self.config.api_sandbox;

        let serialized_len = serde_json::to_vec(response).map(|v| v.len()).unwrap_or(0);
        if serialized_len > bounds.max_response_bytes {
            return SandboxVerdict::Deny {
                violation: ErrorKind::SandboxSizeExceeded,
                detail: format!(
                    "response is {} bytes, cap is {}",
                    serialized_len, bounds.max_response_bytes
                ),
            };
        }

        if !response.is_object() {
            return SandboxVerdict::Deny {
                violation: ErrorKind::SandboxShapeViolation,
                detail: "response is not a JSON object".to_string(),
            };
        }

        if let Some(verdict) = self.walk(response, 0) {
            return verdict;
        }

        SandboxVerdict::Allow
    }

    fn walk(&self, value: &serde_json::Value, depth: usize) -> Option<SandboxVerdict> {
        let bounds = &self.config.api_sandbox;
        if depth > bounds.max_depth {
            return Some(SandboxVerdict::Deny {
                violation: ErrorKind::SandboxShapeViolation,
                detail: format!("nesting deeper than {}", bounds.max_depth),
            });
        }
        match value {
            serde_json::Value::Array(items) => {
                if items.len() > bounds.max_collection_elements {
                    return Some(SandboxVerdict::Deny {
                        violation: ErrorKind::SandboxSizeExceeded,
                        detail: format!(
                            "collection has {} elements, cap is {}",
                            items.len(),
                            bounds.max_collection_elements
                        ),
                    });
                }
                items.iter().find_map(|item| self.walk(item, depth + 1))
            }
            serde_json::Value::Object(map) => {
                map.values().find_map(|item| self.walk(item, depth + 1))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_sandbox() -> ApiSandbox {
        ApiSandbox::new(Arc::new(BoundaryConfig::default()))
    }

    #[test]
    fn test_well_shaped_response_allowed() {
        let sandbox = make_sandbox();
        let response = json!({
            "cars": [
                {"car_id": "c1", "make": "Toyota", "daily_rate_cents": 4500},
                {"car_id": "c2", "make": "Honda", "daily_rate_cents": 5200},
            ],
            "search_id": "abc-123",
        });
        assert!(sandbox.check(&response).is_allow());
    }

    #[test]
    fn test_oversized_collection_denied_not_truncated() {
        let sandbox = make_sandbox();
        let cars: Vec<_> = (0..10_000).map(|i| json!({"car_id": i})).collect();
        let response = json!({ "cars": cars });
        match sandbox.check(&response) {
            SandboxVerdict::Deny { violation, .. } => {
                assert_eq!(violation, ErrorKind::SandboxSizeExceeded)
            }
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_oversized_collection_denied() {
        let sandbox = make_sandbox();
        let inner: Vec<_> = (0..100).map(|i| json!(i)).collect();
        let response = json!({ "cars": [{"features": inner}] });
        assert!(sandbox.check(&response).is_deny());
    }

    #[test]
    fn test_non_object_response_denied() {
        let sandbox = make_sandbox();
        match sandbox.check(&json!(["not", "an", "object"])) {
            SandboxVerdict::Deny { violation, .. } => {
                assert_eq!(violation, ErrorKind::SandboxShapeViolation)
            }
            other => panic!("expected deny, got {:?}", other),
        }
        assert!(sandbox.check(&json!("plain string")).is_deny());
    }

    #[test]
    fn test_oversized_payload_denied() {
        let sandbox = make_sandbox();
        let response = json!({ "blob": "x".repeat(100_000) });
        match sandbox.check(&response) {
            SandboxVerdict::Deny { violation, .. } => {
                assert_eq!(violation, ErrorKind::SandboxSizeExceeded)
            }
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[test]
    fn test_excessive_nesting_denied() {
        let sandbox = make_sandbox();
        let mut value = json!({"leaf": true});
        for _ in 0..20 {
            value = json!({ "inner": value });
        }
        assert!(sandbox.check(&value).is_deny());
    }
}
