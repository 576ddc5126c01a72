//! SigNoz resource kinds
//!
//! Each kind implements [`declarative::ResourceType`] for the reconciler and
//! adds what only a manifest needs: client-side defaults and validation of
//! declared values.

use declarative::{Address, FieldKind, Record, Registry, ResourceType, Schema};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub mod alert;
pub mod dashboard;

pub use alert::Alert;
pub use dashboard::Dashboard;

/// A declared record that cannot be applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown resource kind `{0}` (expected `alert` or `dashboard`)")]
    UnknownKind(String),

    #[error("{address}: unknown field `{field}`")]
    UnknownField { address: Address, field: String },

    #[error("{address}: `{field}` is required")]
    Missing { address: Address, field: String },

    #[error("{address}: `{field}` is set by the server and cannot be declared")]
    ServerField { address: Address, field: String },

    #[error("{address}: `{field}` must be {expected}")]
    WrongType {
        address: Address,
        field: String,
        expected: &'static str,
    },

    #[error("{address}: `{field}` must be {expected}, got `{value}`")]
    Invalid {
        address: Address,
        field: String,
        value: String,
        expected: String,
    },
}

/// Expected JSON shape of a declared attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Text,
    Flag,
    /// Array of strings
    List,
    /// Object with string values
    Map,
}

impl Shape {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Text => value.is_string(),
            Self::Flag => value.is_boolean(),
            Self::List => value.as_array().is_some_and(|a| a.iter().all(Value::is_string)),
            Self::Map => value.as_object().is_some_and(|m| m.values().all(Value::is_string)),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Text => "a string",
            Self::Flag => "a boolean",
            Self::List => "a list of strings",
            Self::Map => "a table of strings",
        }
    }
}

/// The resource kinds settle manages, bound to one SigNoz endpoint
#[derive(Debug, Clone)]
pub struct Catalog {
    alert: Arc<Alert>,
    dashboard: Arc<Dashboard>,
}

impl Catalog {
    pub fn new(endpoint: &str) -> Self {
        Self {
            alert: Arc::new(Alert::new(endpoint)),
            dashboard: Arc::new(Dashboard::new(endpoint)),
        }
    }

    /// Registry handed to the planner and executor
    pub fn registry(&self) -> Registry {
        Registry::new()
            .with(self.alert.clone())
            .with(self.dashboard.clone())
    }

    /// Field schema of a kind
    pub fn schema(&self, kind: &str) -> Result<&Schema, ValidationError> {
        match kind {
            "alert" => Ok(self.alert.schema()),
            "dashboard" => Ok(self.dashboard.schema()),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }

    /// Check a declared record and fill in client-side defaults.
    pub fn prepare(&self, address: &Address, record: &mut Record) -> Result<(), ValidationError> {
        match address.kind.as_str() {
            "alert" => {
                check_declarable(self.alert.schema(), alert::SHAPES, address, record)?;
                self.alert.apply_defaults(address, record);
                self.alert.validate(address, record)
            }
            "dashboard" => {
                check_declarable(self.dashboard.schema(), dashboard::SHAPES, address, record)?;
                self.dashboard.apply_defaults(address, record);
                Ok(())
            }
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// Reject unknown fields, server-computed fields and values of the wrong shape.
fn check_declarable(
    schema: &Schema,
    shapes: &[(&str, Shape)],
    address: &Address,
    record: &Record,
) -> Result<(), ValidationError> {
    for (field, value) in &record.fields {
        let Some(spec) = schema.field(field) else {
            return Err(ValidationError::UnknownField {
                address: address.clone(),
                field: field.clone(),
            });
        };
        let expected = match spec.kind {
            FieldKind::Computed => {
                return Err(ValidationError::ServerField {
                    address: address.clone(),
                    field: field.clone(),
                });
            }
            FieldKind::Document(_) => Shape::Text,
            FieldKind::Attribute | FieldKind::Derived => shapes
                .iter()
                .find(|(name, _)| name == field)
                .map_or(Shape::Text, |(_, shape)| *shape),
        };
        if !expected.accepts(value) {
            return Err(ValidationError::WrongType {
                address: address.clone(),
                field: field.clone(),
                expected: expected.describe(),
            });
        }
    }
    Ok(())
}

/// Fail unless the field is unset or one of `allowed`.
fn check_one_of(address: &Address, record: &Record, field: &str, allowed: &[&str]) -> Result<(), ValidationError> {
    match record.get_str(field) {
        Some(value) if !allowed.contains(&value) => Err(ValidationError::Invalid {
            address: address.clone(),
            field: field.to_string(),
            value: value.to_string(),
            expected: format!("one of {}", allowed.join(", ")),
        }),
        _ => Ok(()),
    }
}

/// Fail if a required field is unset.
fn require(address: &Address, record: &Record, field: &str) -> Result<(), ValidationError> {
    if record.is_set(field) {
        Ok(())
    } else {
        Err(ValidationError::Missing {
            address: address.clone(),
            field: field.to_string(),
        })
    }
}

/// Set a field only when the user left it out.
fn default_to(record: &mut Record, field: &str, value: impl Into<Value>) {
    if !record.is_set(field) {
        record.set(field, value);
    }
}

/// Remote identifiers arrive as strings or numbers depending on the server version.
fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Copy a response value into a record. A `null` or missing value clears the
/// field, since [`Record::set`] drops nulls.
fn observe(record: &mut Record, field: &str, value: &Value) {
    record.set(field, value.clone());
}
