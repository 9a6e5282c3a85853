// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Header carriers read by extraction and written by injection.
//!
//! A carrier is whatever transports headers between services: an HTTP header map, the
//! metadata object of a queued message, and so on. Lookups are case-insensitive and keys
//! are stored lowercase, matching HTTP header semantics (`TraceParent` and `traceparent`
//! are the same header).
//!
//! Implementations are provided for `HashMap<String, String>` and for JSON objects
//! (`serde_json::Value`); non-object JSON values behave as empty, read-only carriers.

use std::collections::HashMap;

use serde_json::Value;

pub trait Injector {
    /// Sets `key` to `value`, replacing any previous value.
    fn set(&mut self, key: &str, value: String);
}

pub trait Extractor {
    fn get(&self, key: &str) -> Option<&str>;

    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect::<Vec<_>>()
    }
}

impl Injector for Value {
    fn set(&mut self, key: &str, value: String) {
        if let Value::Object(map) = self {
            map.insert(key.to_lowercase(), Value::String(value));
        }
    }
}

impl Extractor for Value {
    fn get(&self, key: &str) -> Option<&str> {
        match self {
            Value::Object(map) => map.get(&key.to_lowercase()).and_then(Value::as_str),
            _ => None,
        }
    }

    fn keys(&self) -> Vec<&str> {
        match self {
            Value::Object(map) => map.keys().map(String::as_str).collect::<Vec<_>>(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn hash_map_is_case_insensitive() {
        let mut carrier: HashMap<String, String> = HashMap::new();
        carrier.set("TraceState", "sw=1000100010001000-01".to_string());

        assert_eq!(
            Extractor::get(&carrier, "TRACESTATE"),
            Some("sw=1000100010001000-01")
        );
        assert_eq!(Extractor::keys(&carrier), vec!["tracestate"]);
    }

    #[test]
    fn hash_map_set_replaces() {
        let mut carrier: HashMap<String, String> = HashMap::new();
        carrier.set("tracestate", "vendor1=foo".to_string());
        carrier.set("tracestate", "sw=1000100010001000-01,vendor1=foo".to_string());

        assert_eq!(
            Extractor::get(&carrier, "tracestate"),
            Some("sw=1000100010001000-01,vendor1=foo")
        );
    }

    #[test]
    fn json_object_carrier() {
        let mut carrier = json!({ "traceparent": "00-11112222333344445555666677778888-1000100010001000-01" });
        carrier.set("X-Trace-Options", "trigger-trace".to_string());

        assert_eq!(Extractor::get(&carrier, "x-trace-options"), Some("trigger-trace"));
        let mut keys = Extractor::keys(&carrier);
        keys.sort_unstable();
        assert_eq!(keys, vec!["traceparent", "x-trace-options"]);
    }

    #[test]
    fn json_non_object_carrier_is_empty() {
        let mut carrier = json!(["traceparent"]);
        carrier.set("traceparent", "ignored".to_string());

        assert_eq!(Extractor::get(&carrier, "traceparent"), None);
        assert!(Extractor::keys(&carrier).is_empty());
        assert_eq!(carrier, json!(["traceparent"]));
    }
}
