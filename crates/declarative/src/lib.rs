//! # Declarative
//!
//! Reconciliation of remote resources whose API rewrites what it is sent.
//!
//! Servers commonly inject default values, reorder object keys and reformat
//! whitespace in the JSON documents they store. A naive comparison of the
//! declared document against the server's echo then reports drift that is
//! not real and triggers endless no-op updates. This crate keeps what was
//! declared as the source of truth for a document's textual shape, and the
//! server as the source of truth for existence, identifiers and
//! server-computed fields.
//!
//! ## Core Concepts
//!
//! - **Policy** ([`DefaultFieldPolicy`]): a table of values the server is
//!   known to inject, optionally scoped to a position in the tree
//! - **Canonicalization** ([`canonicalize`]): parse, strip defaults, sort keys
//! - **Comparison** ([`equivalent`], [`compare`]): byte equality of canonical forms
//! - **Digest** ([`Digest`]): content hash for blobs too unstable to canonicalize
//! - **Merge policy** ([`reconcile`]): next persisted record per transition
//! - **Driver** ([`Driver`]): create/read/update/delete against a [`RemoteApi`]
//! - **Plan/execute** ([`ExecutionPlan`], [`execute`]): batch convergence
//!
//! ## Example
//!
//! ```
//! use declarative::{equivalent, policy};
//!
//! let declared = r#"{"op": ">", "target": 80}"#;
//! let echoed = r#"{"absentFor":0,"alertOnAbsent":false,"op":">","target":80}"#;
//! assert!(equivalent(declared, echoed, policy::alert_condition()));
//! ```
//!
//! ## Provider Traits
//!
//! - [`RemoteApi`]: the remote CRUD surface
//! - [`ResourceType`]: field schema and payload mapping for one kind
//! - [`StateStore`]: persisted records keyed by address
//! - [`ProgressCallback`] / [`ConfirmCallback`]: UI hooks for the executor

pub mod callback;
pub mod canonical;
pub mod compare;
pub mod diff;
pub mod digest;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod planner;
pub mod policy;
pub mod reconcile;
pub mod remote;
pub mod resource;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use callback::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use canonical::{CanonicalTree, canonicalize, canonicalize_value};
pub use compare::{Comparison, compare, equivalent};
pub use diff::{DiffSummary, FieldChange, ResourceDiff, compute_diffs, group_by_type};
pub use digest::Digest;
pub use error::{Error, ParseError, Result};
pub use executor::{execute, execute_simple, refresh};
pub use lifecycle::{Driver, Outcome, Proposal};
pub use planner::{ExecutionPlan, PlannedChange};
pub use policy::{DefaultFieldPolicy, DefaultFieldRule, DefaultValue, Scope};
pub use reconcile::reconcile;
pub use remote::{ErrorCategory, MockRemote, RemoteApi, RemoteError};
pub use resource::{FieldKind, FieldSpec, Registry, ResourceType, Schema, SharedResourceType, Strategy};
pub use store::{MemoryStore, StateStore};
pub use types::{Action, Address, ApplyResult, ExecuteOptions, ExecuteSummary, Record, Transition};
