//! Default-field policy: which key/value pairs are server-injected defaults.
//!
//! A policy is a closed table of [`DefaultFieldRule`]s. Each rule names a key,
//! the exact default value the remote system injects for it, and the
//! structural position where that injection happens. A pair that matches no
//! rule is always significant, so a user who deliberately sets an empty or
//! false value only loses it when a rule author has confirmed the server
//! injects that exact value at that position.
//!
//! Built-in tables are process-wide statics initialized once and never
//! mutated; custom policies are built with [`DefaultFieldPolicy::with_rule`].

use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

/// The injected value a rule matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// `[]`
    EmptyArray,
    /// `{}`
    EmptyObject,
    /// `""`
    EmptyString,
    /// `null`
    Null,
    /// Numeric zero (`0` or `0.0`)
    Zero,
    /// `true` or `false`
    Bool(bool),
}

impl DefaultValue {
    /// Check whether `value` is exactly this default.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::EmptyArray => value.as_array().is_some_and(Vec::is_empty),
            Self::EmptyObject => value.as_object().is_some_and(serde_json::Map::is_empty),
            Self::EmptyString => value.as_str() == Some(""),
            Self::Null => value.is_null(),
            Self::Zero => value.as_f64() == Some(0.0),
            Self::Bool(b) => value.as_bool() == Some(*b),
        }
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyArray => write!(f, "[]"),
            Self::EmptyObject => write!(f, "{{}}"),
            Self::EmptyString => write!(f, "\"\""),
            Self::Null => write!(f, "null"),
            Self::Zero => write!(f, "0"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Where in the tree a rule applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// At any depth.
    Anywhere,
    /// Only somewhere below an object key named `.0`.
    Under(String),
    /// Only directly inside the container stored at key `name`, which itself
    /// sits under key `parent` (e.g. query `A` in `builderQueries`).
    Named {
        /// Key of the enclosing collection.
        parent: String,
        /// Key identifying the container inside that collection.
        name: String,
    },
}

impl Scope {
    fn applies(&self, context: &Context<'_>) -> bool {
        match self {
            Self::Anywhere => true,
            Self::Under(ancestor) => context.has_ancestor(ancestor),
            Self::Named { parent, name } => context.is_directly_in(parent, name),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anywhere => write!(f, "anywhere"),
            Self::Under(ancestor) => write!(f, "under `{ancestor}`"),
            Self::Named { parent, name } => write!(f, "in `{parent}.{name}`"),
        }
    }
}

/// One step of the path from the document root to the current object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Object key
    Key(&'a str),
    /// Array position
    Index(usize),
}

/// Structural position of a key/value pair: the ancestors of the object that
/// holds it, root first.
#[derive(Debug, Clone, Default)]
pub struct Context<'a> {
    path: Vec<Segment<'a>>,
}

impl<'a> Context<'a> {
    /// Context of the document root.
    pub fn root() -> Self {
        Self { path: Vec::new() }
    }

    /// Context built from an explicit path.
    pub fn from_path(path: Vec<Segment<'a>>) -> Self {
        Self { path }
    }

    /// Enter a child by key.
    pub fn push_key(&mut self, key: &'a str) {
        self.path.push(Segment::Key(key));
    }

    /// Enter a child by array position.
    pub fn push_index(&mut self, index: usize) {
        self.path.push(Segment::Index(index));
    }

    /// Leave the innermost child.
    pub fn pop(&mut self) {
        self.path.pop();
    }

    /// Ancestor path, root first.
    pub fn path(&self) -> &[Segment<'a>] {
        &self.path
    }

    fn has_ancestor(&self, key: &str) -> bool {
        self.path.iter().any(|s| *s == Segment::Key(key))
    }

    fn is_directly_in(&self, parent: &str, name: &str) -> bool {
        matches!(
            self.path.as_slice(),
            [.., Segment::Key(p), Segment::Key(n)] if *p == parent && *n == name
        )
    }
}

impl fmt::Display for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return write!(f, "$");
        }
        for (i, segment) in self.path.iter().enumerate() {
            match segment {
                Segment::Key(k) if i == 0 => write!(f, "{k}")?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}

/// A single server-injected default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultFieldRule {
    key: String,
    value: DefaultValue,
    scope: Scope,
}

impl DefaultFieldRule {
    /// Rule that applies at any depth.
    pub fn new(key: impl Into<String>, value: DefaultValue) -> Self {
        Self {
            key: key.into(),
            value,
            scope: Scope::Anywhere,
        }
    }

    /// Restrict the rule to objects below `ancestor`.
    pub fn under(mut self, ancestor: impl Into<String>) -> Self {
        self.scope = Scope::Under(ancestor.into());
        self
    }

    /// Restrict the rule to the container `parent.name`.
    pub fn named(mut self, parent: impl Into<String>, name: impl Into<String>) -> Self {
        self.scope = Scope::Named {
            parent: parent.into(),
            name: name.into(),
        };
        self
    }

    /// Key this rule matches
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Injected value this rule matches
    pub fn value(&self) -> &DefaultValue {
        &self.value
    }

    /// Position where the rule applies
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Check the rule against one key/value pair.
    pub fn matches(&self, key: &str, value: &Value, context: &Context<'_>) -> bool {
        self.key == key && self.value.matches(value) && self.scope.applies(context)
    }
}

impl fmt::Display for DefaultFieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} ({})", self.key, self.value, self.scope)
    }
}

/// A named, closed table of default-field rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultFieldPolicy {
    name: String,
    rules: Vec<DefaultFieldRule>,
}

impl DefaultFieldPolicy {
    /// Create an empty policy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Add a rule.
    pub fn with_rule(mut self, rule: DefaultFieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Policy name, for display.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All rules in declaration order.
    pub fn rules(&self) -> &[DefaultFieldRule] {
        &self.rules
    }

    /// Whether the policy has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check whether a key/value pair at `context` is an injected default.
    pub fn is_default(&self, key: &str, value: &Value, context: &Context<'_>) -> bool {
        self.rules.iter().any(|r| r.matches(key, value, context))
    }
}

static NONE: LazyLock<DefaultFieldPolicy> = LazyLock::new(|| DefaultFieldPolicy::new("none"));

static ALERT_CONDITION: LazyLock<DefaultFieldPolicy> = LazyLock::new(|| {
    use DefaultValue::{Bool, EmptyArray, EmptyString, Null, Zero};

    DefaultFieldPolicy::new("alert-condition")
        .with_rule(DefaultFieldRule::new("groupBy", EmptyArray))
        .with_rule(DefaultFieldRule::new("IsAnomaly", Bool(false)))
        .with_rule(DefaultFieldRule::new("QueriesUsedInFormula", Null))
        .with_rule(DefaultFieldRule::new("absentFor", Zero))
        .with_rule(DefaultFieldRule::new("alertOnAbsent", Bool(false)))
        .with_rule(DefaultFieldRule::new("hidden", Bool(true)).named("builderQueries", "A"))
        .with_rule(DefaultFieldRule::new("reduceTo", EmptyString).named("builderQueries", "F1"))
        .with_rule(
            DefaultFieldRule::new("spaceAggregation", EmptyString).named("builderQueries", "F1"),
        )
        .with_rule(
            DefaultFieldRule::new("timeAggregation", EmptyString).named("builderQueries", "F1"),
        )
});

/// Policy with no rules: canonicalization only normalizes key order.
pub fn none() -> &'static DefaultFieldPolicy {
    &NONE
}

/// Defaults the remote system injects into alert rule conditions.
pub fn alert_condition() -> &'static DefaultFieldPolicy {
    &ALERT_CONDITION
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(keys: &[&'a str]) -> Context<'a> {
        Context::from_path(keys.iter().copied().map(Segment::Key).collect())
    }

    #[test]
    fn test_default_value_matches() {
        assert!(DefaultValue::EmptyArray.matches(&json!([])));
        assert!(!DefaultValue::EmptyArray.matches(&json!([1])));
        assert!(!DefaultValue::EmptyArray.matches(&json!({})));
        assert!(DefaultValue::EmptyObject.matches(&json!({})));
        assert!(DefaultValue::EmptyString.matches(&json!("")));
        assert!(!DefaultValue::EmptyString.matches(&json!(null)));
        assert!(DefaultValue::Null.matches(&json!(null)));
        assert!(DefaultValue::Zero.matches(&json!(0)));
        assert!(DefaultValue::Zero.matches(&json!(0.0)));
        assert!(!DefaultValue::Zero.matches(&json!("0")));
        assert!(DefaultValue::Bool(false).matches(&json!(false)));
        assert!(!DefaultValue::Bool(false).matches(&json!(true)));
    }

    #[test]
    fn test_anywhere_rule() {
        let policy = alert_condition();
        assert!(policy.is_default("groupBy", &json!([]), &Context::root()));
        assert!(policy.is_default("groupBy", &json!([]), &ctx(&["compositeQuery"])));
        assert!(!policy.is_default("groupBy", &json!(["service"]), &Context::root()));
    }

    #[test]
    fn test_named_rule_only_applies_in_position() {
        let policy = alert_condition();
        let in_a = ctx(&["compositeQuery", "builderQueries", "A"]);
        let in_b = ctx(&["compositeQuery", "builderQueries", "B"]);
        let in_f1 = ctx(&["compositeQuery", "builderQueries", "F1"]);

        assert!(policy.is_default("hidden", &json!(true), &in_a));
        assert!(!policy.is_default("hidden", &json!(true), &in_b));
        assert!(!policy.is_default("hidden", &json!(false), &in_a));

        assert!(policy.is_default("reduceTo", &json!(""), &in_f1));
        assert!(!policy.is_default("reduceTo", &json!(""), &in_a));
        assert!(!policy.is_default("reduceTo", &json!("avg"), &in_f1));
    }

    #[test]
    fn test_under_rule() {
        let policy = DefaultFieldPolicy::new("test")
            .with_rule(DefaultFieldRule::new("limit", DefaultValue::Zero).under("queries"));
        assert!(policy.is_default("limit", &json!(0), &ctx(&["queries", "x"])));
        assert!(!policy.is_default("limit", &json!(0), &ctx(&["other"])));
    }

    #[test]
    fn test_unknown_key_is_significant() {
        let policy = alert_condition();
        assert!(!policy.is_default("disabled", &json!(false), &Context::root()));
        assert!(!none().is_default("groupBy", &json!([]), &Context::root()));
    }

    #[test]
    fn test_context_display() {
        let mut c = ctx(&["compositeQuery", "builderQueries"]);
        c.push_index(2);
        assert_eq!(c.to_string(), "compositeQuery.builderQueries[2]");
        assert_eq!(Context::root().to_string(), "$");
    }

    #[test]
    fn test_rule_display() {
        let rule = DefaultFieldRule::new("hidden", DefaultValue::Bool(true)).named("builderQueries", "A");
        assert_eq!(rule.to_string(), "hidden = true (in `builderQueries.A`)");
    }
}
