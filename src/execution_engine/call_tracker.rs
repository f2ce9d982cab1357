//! Call signature tracking
//!
//! A call signature is the tool name plus its parameters serialized with
//! sorted keys, so `{"a":1,"b":2}` and `{"b":2,"a":1}` are the same call.
//!
//! - `DuplicateCallDetector`: refuses identical calls inside a time window
//! - `FailureTracker`: consecutive failures per signature

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{Map, Value as JsonValue};

/// Canonical signature of a call
pub fn call_signature(tool: &str, params: &Map<String, JsonValue>) -> String {
    let mut out = String::with_capacity(tool.len() + 32);
    out.push_str(tool);
    out.push(':');
    write_canonical_object(params, &mut out);
    out
}

fn write_canonical_object(map: &Map<String, JsonValue>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&JsonValue::String(key.clone()).to_string());
        out.push(':');
        if let Some(value) = map.get(key) {
            write_canonical(value, out);
        }
    }
    out.push('}');
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => write_canonical_object(map, out),
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Refuses identical calls made within the TTL
#[derive(Debug)]
pub struct DuplicateCallDetector {
    recent: HashMap<String, Instant>,
    ttl: Duration,
}

impl DuplicateCallDetector {
    pub fn new(ttl: Duration) -> Self {
        Self {
            recent: HashMap::new(),
            ttl,
        }
    }

    /// Record the call, or return the refusal message if it is a duplicate
    pub fn check_and_record(
        &mut self,
        tool: &str,
        params: &Map<String, JsonValue>,
    ) -> Result<(), String> {
        self.check_and_record_at(tool, params, Instant::now())
    }

    pub(crate) fn check_and_record_at(
        &mut self,
        tool: &str,
        params: &Map<String, JsonValue>,
        now: Instant,
    ) -> Result<(), String> {
        self.sweep_expired(now);

        let signature = call_signature(tool, params);
        if let Some(last) = self.recent.get(&signature) {
            let ago = now.saturating_duration_since(*last).as_secs();
            return Err(format!(
                "Tool '{}' was already attempted {}s ago with identical parameters",
                tool, ago
            ));
        }
        self.recent.insert(signature, now);
        Ok(())
    }

    pub fn sweep_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.recent
            .retain(|_, seen| now.saturating_duration_since(*seen) < ttl);
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    pub fn clear(&mut self) {
        self.recent.clear();
    }
}

/// Consecutive failure count per signature
#[derive(Debug, Default)]
pub struct FailureTracker {
    failures: HashMap<String, usize>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the new count
    pub fn record_failure(&mut self, signature: &str) -> usize {
        let count = self.failures.entry(signature.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn record_success(&mut self, signature: &str) {
        self.failures.remove(signature);
    }

    pub fn count(&self, signature: &str) -> usize {
        self.failures.get(signature).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.failures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_signature_ignores_key_order() {
        let a = call_signature("t", &params(json!({"a": 1, "b": {"y": 2, "x": [1, {"q": 0, "p": 1}]}})));
        let b = call_signature("t", &params(json!({"b": {"x": [1, {"p": 1, "q": 0}], "y": 2}, "a": 1})));
        assert_eq!(a, b);
        assert_ne!(a, call_signature("u", &params(json!({"a": 1}))));
    }

    #[test]
    fn test_duplicate_within_window_rejected() {
        let mut detector = DuplicateCallDetector::new(Duration::from_secs(60));
        let now = Instant::now();
        let p = params(json!({"command": "ls"}));
        assert!(detector.check_and_record_at("execution", &p, now).is_ok());

        let err = detector
            .check_and_record_at("execution", &p, now + Duration::from_secs(5))
            .unwrap_err();
        assert!(err.contains("already attempted 5s ago"));
    }

    #[test]
    fn test_duplicate_allowed_after_ttl() {
        let mut detector = DuplicateCallDetector::new(Duration::from_secs(60));
        let now = Instant::now();
        let p = params(json!({"command": "ls"}));
        assert!(detector.check_and_record_at("execution", &p, now).is_ok());
        assert!(detector
            .check_and_record_at("execution", &p, now + Duration::from_secs(61))
            .is_ok());
        assert_eq!(detector.len(), 1);
    }

    #[test]
    fn test_different_params_allowed() {
        let mut detector = DuplicateCallDetector::new(Duration::from_secs(60));
        assert!(detector
            .check_and_record("execution", &params(json!({"command": "ls"})))
            .is_ok());
        assert!(detector
            .check_and_record("execution", &params(json!({"command": "pwd"})))
            .is_ok());
    }

    #[test]
    fn test_failure_tracker() {
        let mut tracker = FailureTracker::new();
        assert_eq!(tracker.record_failure("sig"), 1);
        assert_eq!(tracker.record_failure("sig"), 2);
        tracker.record_success("sig");
        assert_eq!(tracker.count("sig"), 0);
    }
}
