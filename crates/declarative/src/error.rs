//! Error types for reconciliation.
//!
//! Every fallible operation in this crate returns [`Error`]. Remote failures
//! are carried through unchanged so callers can inspect their category.

use crate::remote::RemoteError;
use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Location and message of a JSON parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    /// 1-based line of the failure.
    pub line: usize,
    /// 1-based column of the failure.
    pub column: usize,
    /// Parser message.
    pub message: String,
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// Errors that can occur during a reconciliation cycle.
#[derive(Debug, Error)]
pub enum Error {
    /// A structured field is not valid JSON. Fatal to the cycle, never retried.
    #[error("field `{field}` is not valid JSON ({source}): {text}")]
    MalformedInput {
        /// Name of the offending field.
        field: String,
        /// Raw text as supplied.
        text: String,
        /// Where parsing failed.
        #[source]
        source: ParseError,
    },

    /// The remote API failed. Propagated unchanged.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The remote API has no object with this identifier.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Remote identifier.
        id: String,
    },

    /// A record that must carry a remote identifier does not.
    #[error("{kind} record has no remote identifier")]
    MissingIdentifier {
        /// Resource kind.
        kind: String,
    },

    /// A required field is absent from a record.
    #[error("{kind} record is missing required field `{field}`")]
    MissingField {
        /// Resource kind.
        kind: String,
        /// Field name.
        field: String,
    },

    /// A payload or response does not have the expected shape.
    #[error("invalid {kind} payload: {message}")]
    Payload {
        /// Resource kind.
        kind: String,
        /// What was wrong.
        message: String,
    },

    /// No resource type is registered under this kind.
    #[error("unknown resource type `{0}`")]
    UnknownKind(String),

    /// The persisted state store failed.
    #[error("state store error: {0}")]
    State(String),
}

impl Error {
    /// Build a [`Error::MalformedInput`] for a field.
    pub fn malformed(field: impl Into<String>, text: impl Into<String>, source: ParseError) -> Self {
        Self::MalformedInput {
            field: field.into(),
            text: text.into(),
            source,
        }
    }
}
