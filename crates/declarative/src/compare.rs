//! Semantic comparison of structured fields.
//!
//! Two texts are equivalent when their canonical serializations are
//! byte-equal. A text that does not parse is never equivalent to anything,
//! itself included, and the comparator never fails.

use crate::canonical::{canonicalize, CanonicalTree};
use crate::policy::DefaultFieldPolicy;
use serde_json::Value;

/// Recursion limit for difference reporting. Deeper differences are reported
/// at the limit's path.
const MAX_DIFF_DEPTH: usize = 128;

/// Outcome of comparing two structured texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    /// Whether the texts are semantically equivalent.
    pub equivalent: bool,
    /// Dotted paths that differ after canonicalization. `$` is the root.
    pub differences: Vec<String>,
}

impl Comparison {
    fn same() -> Self {
        Self {
            equivalent: true,
            differences: Vec::new(),
        }
    }
}

/// Check whether two JSON texts describe the same configuration under `policy`.
pub fn equivalent(a: &str, b: &str, policy: &DefaultFieldPolicy) -> bool {
    compare(a, b, policy).equivalent
}

/// Compare two JSON texts under `policy`, reporting the paths that differ.
///
/// Differences are logged at debug level: a path that differs only because
/// the server injected a value no rule knows about shows up here first.
pub fn compare(a: &str, b: &str, policy: &DefaultFieldPolicy) -> Comparison {
    let (left, right) = match (canonicalize(a, policy), canonicalize(b, policy)) {
        (Ok(left), Ok(right)) => (left, right),
        (left, right) => {
            log::debug!(
                "comparison under {} failed to parse (left ok: {}, right ok: {})",
                policy.name(),
                left.is_ok(),
                right.is_ok()
            );
            return Comparison {
                equivalent: false,
                differences: vec!["$".to_string()],
            };
        }
    };
    compare_trees(&left, &right, policy)
}

/// Compare two canonical trees.
pub fn compare_trees(left: &CanonicalTree, right: &CanonicalTree, policy: &DefaultFieldPolicy) -> Comparison {
    if left.to_canonical_string() == right.to_canonical_string() {
        return Comparison::same();
    }

    let mut differences = Vec::new();
    diff_paths(left.as_value(), right.as_value(), "$".to_string(), &mut differences, 0);
    for path in &differences {
        log::debug!("policy {}: significant difference at {path}", policy.name());
    }

    Comparison {
        equivalent: false,
        differences,
    }
}

fn child_path(path: &str, key: &str) -> String {
    format!("{path}.{key}")
}

fn diff_paths(left: &Value, right: &Value, path: String, out: &mut Vec<String>, depth: usize) {
    if depth > MAX_DIFF_DEPTH {
        if left != right {
            out.push(path);
        }
        return;
    }

    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            for (key, lv) in l {
                match r.get(key) {
                    Some(rv) => diff_paths(lv, rv, child_path(&path, key), out, depth + 1),
                    None => out.push(child_path(&path, key)),
                }
            }
            for key in r.keys() {
                if !l.contains_key(key) {
                    out.push(child_path(&path, key));
                }
            }
        }
        (Value::Array(l), Value::Array(r)) if l.len() == r.len() => {
            for (i, (lv, rv)) in l.iter().zip(r).enumerate() {
                diff_paths(lv, rv, format!("{path}[{i}]"), out, depth + 1);
            }
        }
        _ => {
            if left != right {
                out.push(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{alert_condition, none};

    #[test]
    fn test_default_suppression() {
        assert!(equivalent(r#"{"groupBy": [], "x": 1}"#, r#"{"x": 1}"#, alert_condition()));
    }

    #[test]
    fn test_key_order_tolerance() {
        assert!(equivalent(r#"{"a":1,"b":2}"#, r#"{"b":2,"a":1}"#, none()));
    }

    #[test]
    fn test_whitespace_tolerance() {
        assert!(equivalent("{\"a\":\n   [1,2]}", r#"{ "a" : [1, 2] }"#, none()));
    }

    #[test]
    fn test_array_order_significant() {
        assert!(!equivalent("[1,2]", "[2,1]", none()));
    }

    #[test]
    fn test_user_set_value_not_suppressed() {
        // `hidden: true` is only a default for query A
        let a = r#"{"builderQueries": {"B": {"hidden": true}}}"#;
        let b = r#"{"builderQueries": {"B": {}}}"#;
        assert!(!equivalent(a, b, alert_condition()));
    }

    #[test]
    fn test_malformed_is_never_equivalent() {
        assert!(!equivalent("{", "{", none()));
        assert!(!equivalent("{}", "{", none()));
        let c = compare("not json", "{}", none());
        assert_eq!(c.differences, vec!["$".to_string()]);
    }

    #[test]
    fn test_equivalence_relation() {
        let samples = [
            r#"{"a":1,"groupBy":[]}"#,
            r#"{"a":1}"#,
            r#"{ "a" : 1 , "absentFor": 0 }"#,
            r#"{"a":2}"#,
            r#"[1,2]"#,
            r#"[2,1]"#,
            r#"{"b":{"x":[],"y":null}}"#,
            r#"{"b":{"y":null,"x":[]}}"#,
        ];
        let policy = alert_condition();
        for a in samples {
            assert!(equivalent(a, a, policy), "not reflexive: {a}");
            for b in samples {
                assert_eq!(equivalent(a, b, policy), equivalent(b, a, policy), "not symmetric: {a} {b}");
                for c in samples {
                    if equivalent(a, b, policy) && equivalent(b, c, policy) {
                        assert!(equivalent(a, c, policy), "not transitive: {a} {b} {c}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_reports_difference_paths() {
        let c = compare(
            r#"{"a": {"b": 1, "c": 2}, "d": [1, 2]}"#,
            r#"{"a": {"b": 1, "c": 3, "e": 0}, "d": [1, 5]}"#,
            none(),
        );
        assert!(!c.equivalent);
        assert_eq!(c.differences, vec!["$.a.c", "$.a.e", "$.d[1]"]);
    }
}
