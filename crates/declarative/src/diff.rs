//! Diff computation for planned changes

use crate::planner::{ExecutionPlan, PlannedChange};
use crate::resource::FieldKind;
use crate::types::{Action, Address, Record};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One field that a change touches
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    /// Persisted value, rendered as text
    pub before: Option<String>,
    /// Declared value, rendered as text
    pub after: Option<String>,
    /// Whether the field is a JSON document
    pub document: bool,
}

/// A diff between persisted state and declared configuration of a resource
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDiff {
    pub address: Address,
    /// Type of the resource
    pub resource_type: String,
    /// Human-readable description
    pub description: String,
    pub action: Action,
    pub changes: Vec<FieldChange>,
}

impl ResourceDiff {
    /// Create a diff from a planned change, returning None if no changes needed
    pub fn from_change(change: &PlannedChange) -> Option<Self> {
        let schema = change.resource_type.schema();
        let empty = Record::new();
        let desired = change.desired.as_ref().unwrap_or(&empty);
        let previous = change.previous.as_ref().unwrap_or(&empty);

        let touched: Vec<&str> = match &change.action {
            Action::NoChange => return None,
            Action::Update { changed } => changed.iter().map(String::as_str).collect(),
            Action::Create => schema
                .fields()
                .iter()
                .filter(|f| desired.is_set(f.name))
                .map(|f| f.name)
                .collect(),
            Action::Delete => schema
                .fields()
                .iter()
                .filter(|f| previous.is_set(f.name))
                .map(|f| f.name)
                .collect(),
        };

        let changes = touched
            .into_iter()
            .map(|field| FieldChange {
                field: field.to_string(),
                before: previous.get(field).map(render),
                after: desired.get(field).map(render),
                document: schema
                    .field(field)
                    .is_some_and(|f| matches!(f.kind, FieldKind::Document(_))),
            })
            .collect();

        Some(Self {
            address: change.address.clone(),
            resource_type: change.address.kind.clone(),
            description: change.description(),
            action: change.action.clone(),
            changes,
        })
    }

    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        matches!(self.action, Action::Create)
    }

    /// Check if this diff represents a removal
    pub fn is_removal(&self) -> bool {
        matches!(self.action, Action::Delete)
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        matches!(self.action, Action::Update { .. })
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compute diffs for a plan
///
/// Returns only entries that issue remote writes.
pub fn compute_diffs(plan: &ExecutionPlan) -> Vec<ResourceDiff> {
    plan.changes.iter().filter_map(ResourceDiff::from_change).collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to add
    pub additions: usize,
    /// Number of resources to remove
    pub removals: usize,
    /// Number of resources to modify
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_removal() {
                summary.removals += 1;
            } else {
                summary.modifications += 1;
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource type
pub fn group_by_type(diffs: &[ResourceDiff]) -> BTreeMap<String, Vec<&ResourceDiff>> {
    let mut groups: BTreeMap<String, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.resource_type.clone()).or_default().push(diff);
    }
    groups
}
