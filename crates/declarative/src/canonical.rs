//! Canonicalization of structured (JSON-valued) fields.
//!
//! A canonical tree is the parsed value with every pair the
//! [`DefaultFieldPolicy`] recognizes as a server-injected default removed,
//! recursively. Object key order is irrelevant; array order is kept.
//!
//! The canonical serialization sorts object keys by the byte order of their
//! UTF-8 encoding and uses compact separators, so two trees are equal exactly
//! when their serializations are byte-equal.

use crate::error::ParseError;
use crate::policy::{Context, DefaultFieldPolicy};
use serde_json::{Map, Value};
use std::fmt;

/// A JSON value with injected defaults stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTree(Value);

impl CanonicalTree {
    /// Borrow the underlying value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the underlying value.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Deterministic compact serialization with sorted keys.
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        write_sorted(&self.0, &mut out);
        out
    }
}

impl fmt::Display for CanonicalTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

/// Parse `text` and canonicalize it under `policy`.
///
/// The input is never modified. A parse failure reports the line and column
/// where parsing stopped.
pub fn canonicalize(text: &str, policy: &DefaultFieldPolicy) -> Result<CanonicalTree, ParseError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(canonicalize_value(&value, policy))
}

/// Canonicalize an already parsed value under `policy`.
pub fn canonicalize_value(value: &Value, policy: &DefaultFieldPolicy) -> CanonicalTree {
    let mut context = Context::root();
    CanonicalTree(strip(value, policy, &mut context))
}

/// Rules are tested against the canonical child so that a container which
/// only held defaults is judged by what remains of it.
fn strip<'a>(value: &'a Value, policy: &DefaultFieldPolicy, context: &mut Context<'a>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                context.push_key(key);
                let canonical = strip(child, policy, context);
                context.pop();

                if policy.is_default(key, &canonical, context) {
                    log::trace!("dropping injected default {context} -> {key} = {canonical}");
                    continue;
                }
                out.insert(key.clone(), canonical);
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                context.push_index(i);
                out.push(strip(item, policy, context));
                context.pop();
            }
            Value::Array(out)
        }
        other => other.clone(),
    }
}

fn write_sorted(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push('{');
            for (i, (key, child)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_sorted(child, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_sorted(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{alert_condition, none};
    use serde_json::json;

    #[test]
    fn test_strips_root_defaults() {
        let tree = canonicalize(
            r#"{"absentFor": 0, "alertOnAbsent": false, "op": ">"}"#,
            alert_condition(),
        )
        .unwrap();
        assert_eq!(tree.as_value(), &json!({"op": ">"}));
    }

    #[test]
    fn test_strips_nested_and_positional_defaults() {
        let text = r#"{
            "compositeQuery": {
                "builderQueries": {
                    "A": {"hidden": true, "groupBy": [], "IsAnomaly": false, "expression": "A"},
                    "B": {"hidden": true, "reduceTo": ""},
                    "F1": {"reduceTo": "", "spaceAggregation": "", "timeAggregation": "", "QueriesUsedInFormula": null}
                }
            }
        }"#;
        let tree = canonicalize(text, alert_condition()).unwrap();
        assert_eq!(
            tree.as_value(),
            &json!({
                "compositeQuery": {
                    "builderQueries": {
                        "A": {"expression": "A"},
                        "B": {"hidden": true, "reduceTo": ""},
                        "F1": {}
                    }
                }
            })
        );
    }

    #[test]
    fn test_arrays_keep_order() {
        let tree = canonicalize(r#"[3, {"groupBy": []}, 1]"#, alert_condition()).unwrap();
        assert_eq!(tree.as_value(), &json!([3, {}, 1]));
    }

    #[test]
    fn test_sorted_serialization() {
        let tree = canonicalize(r#"{"b": 2, "a": {"d": [1, 2], "c": "x"}}"#, none()).unwrap();
        assert_eq!(tree.to_canonical_string(), r#"{"a":{"c":"x","d":[1,2]},"b":2}"#);
    }

    #[test]
    fn test_serialization_escapes_keys_and_strings() {
        let tree = canonicalize(r#"{"quote\"key": "line\nbreak"}"#, none()).unwrap();
        assert_eq!(tree.to_canonical_string(), r#"{"quote\"key":"line\nbreak"}"#);
    }

    #[test]
    fn test_idempotent() {
        let texts = [
            r#"{"groupBy": [], "x": {"groupBy": [], "y": [ {"absentFor": 0} ]}}"#,
            r#"{"compositeQuery": {"builderQueries": {"A": {"hidden": true}}}}"#,
            r#"[1, "two", null, {"z": 1, "a": 2}]"#,
            r#""scalar""#,
        ];
        for text in texts {
            let once = canonicalize(text, alert_condition()).unwrap();
            let twice = canonicalize(&once.to_canonical_string(), alert_condition()).unwrap();
            assert_eq!(once, twice, "not idempotent for {text}");
        }
    }

    #[test]
    fn test_input_not_mutated() {
        let value = json!({"groupBy": [], "x": 1});
        let before = value.clone();
        let _ = canonicalize_value(&value, alert_condition());
        assert_eq!(value, before);
    }

    #[test]
    fn test_parse_error_location() {
        let err = canonicalize("{\n  \"a\": 1,\n  oops\n}", none()).unwrap_err();
        assert_eq!(err.line, 3);
    }
}
