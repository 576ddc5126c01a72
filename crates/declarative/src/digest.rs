//! Content digests for opaque structured fields.
//!
//! Some fields are too deep or too unstable to canonicalize rule by rule. For
//! those the persisted, comparable representation is a BLAKE3 digest of the
//! canonical serialization (`blake3:<hex>`). Whitespace and key order never
//! change the digest; any structural rewrite by the server does.

use crate::canonical::{canonicalize_value, CanonicalTree};
use crate::error::ParseError;
use crate::policy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Prefix for all digests produced by this module
const PREFIX: &str = "blake3:";

/// A content digest in the canonical `blake3:<hex>` format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Digest of a canonical tree.
    pub fn of_tree(tree: &CanonicalTree) -> Self {
        let hash = blake3::hash(tree.to_canonical_string().as_bytes());
        Self(format!("{PREFIX}{}", hash.to_hex()))
    }

    /// Digest of a parsed value (key order only is normalized).
    pub fn of_value(value: &Value) -> Self {
        Self::of_tree(&canonicalize_value(value, policy::none()))
    }

    /// Digest of a JSON text.
    pub fn of_text(text: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::of_value(&value))
    }

    /// Wrap a string previously produced by [`Digest::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        is_digest(s).then(|| Self(s.to_string()))
    }

    /// The `blake3:<hex>` rendering.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `s` looks like a digest produced by this module.
pub fn is_digest(s: &str) -> bool {
    s.strip_prefix(PREFIX)
        .is_some_and(|hex| hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}
