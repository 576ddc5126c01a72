//! Resource types and their field schemas
//!
//! A [`ResourceType`] tells the reconciler which fields a kind of resource
//! has, how each one is reconciled, and how records map to and from the
//! remote API's payloads. The comparison strategy of every structured field
//! is declared here once and never branched on elsewhere.

use crate::compare;
use crate::canonical::canonicalize;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::policy::DefaultFieldPolicy;
use crate::types::Record;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// How a structured field is compared and persisted
#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    /// Canonicalize under a default-field policy. The persisted value is the
    /// user's text, so server reformatting can be masked.
    Canonical(&'static DefaultFieldPolicy),
    /// Persist a content digest of the canonical serialization.
    Digest,
}

impl Strategy {
    /// Value to persist for a user-supplied text.
    pub fn persist(&self, field: &str, text: &str) -> Result<String> {
        match self {
            Self::Canonical(policy) => {
                canonicalize(text, policy).map_err(|e| Error::malformed(field, text, e))?;
                Ok(text.to_string())
            }
            Self::Digest => Digest::of_text(text)
                .map(|d| d.to_string())
                .map_err(|e| Error::malformed(field, text, e)),
        }
    }

    /// Value to persist for a server-observed text when nothing better is known.
    pub fn observe(&self, field: &str, text: &str) -> Result<String> {
        match self {
            Self::Canonical(policy) => canonicalize(text, policy)
                .map(|tree| tree.to_canonical_string())
                .map_err(|e| Error::malformed(field, text, e)),
            Self::Digest => self.persist(field, text),
        }
    }

    /// Whether a user-supplied text matches a persisted value.
    pub fn equivalent(&self, text: &str, persisted: &str) -> bool {
        match self {
            Self::Canonical(policy) => compare::equivalent(text, persisted, policy),
            Self::Digest => Digest::of_text(text).is_ok_and(|d| d.as_str() == persisted),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canonical(policy) => write!(f, "canonical ({})", policy.name()),
            Self::Digest => write!(f, "digest (blake3)"),
        }
    }
}

/// Who owns a field's value
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Set by the user; the server echoes it verbatim.
    Attribute,
    /// JSON text the server reformats; reconciled by strategy.
    Document(Strategy),
    /// Set only by the server (timestamps, audit fields, lifecycle state).
    Computed,
    /// Optionally set by the user; the server fills a default otherwise.
    Derived,
}

/// A field declaration
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name as it appears in records and manifests
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Plain value owned by the user and echoed as-is by the server.
    pub const fn attribute(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Attribute,
        }
    }

    /// JSON text reconciled with `strategy`.
    pub const fn document(name: &'static str, strategy: Strategy) -> Self {
        Self {
            name,
            kind: FieldKind::Document(strategy),
        }
    }

    /// Value only the server sets; never sent.
    pub const fn computed(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Computed,
        }
    }

    /// Value the user may set and the server otherwise fills in.
    pub const fn derived(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Derived,
        }
    }
}

/// The declared fields of one resource kind
#[derive(Debug, Clone)]
pub struct Schema {
    kind: &'static str,
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Declare a kind's fields. Order is kept for display and payloads.
    pub fn new(kind: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { kind, fields }
    }

    /// Resource kind this schema belongs to
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// All field declarations
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Structured fields with their strategies
    pub fn documents(&self) -> impl Iterator<Item = (&'static str, Strategy)> + '_ {
        self.fields.iter().filter_map(|f| match f.kind {
            FieldKind::Document(strategy) => Some((f.name, strategy)),
            _ => None,
        })
    }
}

/// Core trait for a kind of remotely managed resource
///
/// Implementations are the schema layer: they declare fields and translate
/// between [`Record`]s and the JSON the remote API speaks. Client-side
/// defaults are applied before records reach the reconciler.
pub trait ResourceType: Send + Sync + fmt::Debug {
    /// Resource kind, e.g. "alert"
    fn kind(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// Field declarations
    fn schema(&self) -> &Schema;

    /// Build the request body for create/update.
    ///
    /// Document fields in `record` hold the user's JSON text; a text that does
    /// not parse must be reported as [`Error::MalformedInput`].
    fn to_payload(&self, record: &Record) -> Result<Value>;

    /// Decode a remote response into an observed record.
    ///
    /// Document fields must be returned as JSON text.
    fn from_response(&self, response: &Value) -> Result<Record>;
}

/// Parse a document field of `record`, reporting malformed text against the field.
pub fn parse_document(record: &Record, field: &str) -> Result<Option<Value>> {
    match record.get_str(field) {
        None => Ok(None),
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|e| Error::malformed(field, text, e.into())),
    }
}

/// Render an observed JSON value as document text.
pub fn document_text(value: &Value) -> Option<String> {
    (!value.is_null()).then(|| value.to_string())
}

/// A boxed resource type for shared storage
pub type SharedResourceType = Arc<dyn ResourceType>;

/// Resource types by kind
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: BTreeMap<&'static str, SharedResourceType>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type under its kind
    pub fn register(&mut self, resource_type: SharedResourceType) {
        self.types.insert(resource_type.kind(), resource_type);
    }

    /// Builder-style register
    pub fn with(mut self, resource_type: SharedResourceType) -> Self {
        self.register(resource_type);
        self
    }

    /// Look up a kind, or fail with [`Error::UnknownKind`]
    pub fn get(&self, kind: &str) -> Result<&SharedResourceType> {
        self.types
            .get(kind)
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))
    }

    /// All registered types in kind order
    pub fn iter(&self) -> impl Iterator<Item = &SharedResourceType> {
        self.types.values()
    }
}
