//! Execution planner - decides what each declared or persisted resource needs

use crate::error::Result;
use crate::lifecycle::Driver;
use crate::resource::{Registry, SharedResourceType};
use crate::store::StateStore;
use crate::types::{Action, Address, Record};
use std::collections::{BTreeMap, BTreeSet};

/// One resource's entry in a plan
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub address: Address,
    pub resource_type: SharedResourceType,
    pub action: Action,
    /// Declared configuration, if still declared
    pub desired: Option<Record>,
    /// Persisted state, refreshed when the plan was built with refresh
    pub previous: Option<Record>,
    /// Predicted next state for updates and no-ops
    pub next: Option<Record>,
    /// Persisted state exists but the remote object is gone
    pub vanished: bool,
}

impl PlannedChange {
    /// Human-readable description
    pub fn description(&self) -> String {
        format!("{} {}", self.resource_type.description(), self.address.name)
    }
}

/// An execution plan, in address order
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub changes: Vec<PlannedChange>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan every address that is declared, persisted, or both.
    ///
    /// Persisted addresses that are no longer declared are planned for
    /// deletion. With `refresh`, persisted records are re-read first so the
    /// plan reflects remote changes; a remote object that has disappeared is
    /// planned as a create if still declared.
    pub fn build(
        driver: &Driver<'_>,
        store: &dyn StateStore,
        registry: &Registry,
        declared: &BTreeMap<Address, Record>,
        refresh: bool,
    ) -> Result<Self> {
        let mut addresses: BTreeSet<Address> = declared.keys().cloned().collect();
        addresses.extend(store.addresses()?);

        let mut changes = Vec::with_capacity(addresses.len());
        for address in addresses {
            let resource_type = registry.get(&address.kind)?.clone();
            let desired = declared.get(&address).cloned();
            let mut previous = store.load(&address)?;
            let mut vanished = false;

            if refresh && let Some(prev) = &previous {
                log::debug!("refreshing {address}");
                match driver.read(resource_type.as_ref(), prev)? {
                    Some(current) => previous = Some(current),
                    None => {
                        previous = None;
                        vanished = true;
                    }
                }
            }

            let proposal = driver.plan(resource_type.as_ref(), desired.as_ref(), previous.as_ref())?;
            log::debug!("{address}: {:?}", proposal.action);
            changes.push(PlannedChange {
                address,
                resource_type,
                action: proposal.action,
                desired,
                previous,
                next: proposal.next,
                vanished,
            });
        }

        Ok(Self { changes })
    }

    /// Plan deletion of every persisted resource.
    pub fn destroy(store: &dyn StateStore, registry: &Registry) -> Result<Self> {
        let mut changes = Vec::new();
        for address in store.addresses()? {
            let resource_type = registry.get(&address.kind)?.clone();
            let previous = store.load(&address)?;
            changes.push(PlannedChange {
                address,
                resource_type,
                action: Action::Delete,
                desired: None,
                previous,
                next: None,
                vanished: false,
            });
        }
        Ok(Self { changes })
    }

    /// Filter plan to only include changes matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&PlannedChange) -> bool,
    {
        Self {
            changes: self.changes.into_iter().filter(|c| predicate(c)).collect(),
        }
    }

    /// Filter plan to only include changes matching a target pattern
    ///
    /// Target format: "kind" or "kind.name"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (kind, name) = parse_target(t);
                self.filter(|c| matches_filter(&c.address, &kind, name.as_deref()))
            }
        }
    }

    /// Changes that issue remote writes
    pub fn pending(&self) -> impl Iterator<Item = &PlannedChange> {
        self.changes.iter().filter(|c| c.action.is_write())
    }

    /// Number of changes that issue remote writes
    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    /// Check if nothing needs to be written
    pub fn is_converged(&self) -> bool {
        self.pending_count() == 0
    }

    /// Total number of entries in the plan
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Parse a target string like "kind.name" into (kind, name). Names may contain dots.
fn parse_target(target: &str) -> (String, Option<String>) {
    match target.split_once('.') {
        Some((kind, name)) => (normalize_kind(kind), Some(name.to_string())),
        None => (normalize_kind(target), None),
    }
}

/// Accept plural kinds on the command line
fn normalize_kind(kind: &str) -> String {
    match kind {
        "alerts" | "rules" => "alert".to_string(),
        "dashboards" => "dashboard".to_string(),
        _ => kind.to_string(),
    }
}

fn matches_filter(address: &Address, kind: &str, name: Option<&str>) -> bool {
    address.kind == kind && name.is_none_or(|n| address.name == n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MockRemote, RemoteApi};
    use crate::store::MemoryStore;
    use crate::testing::{Rule, desired, rewriting_remote};
    use std::sync::Arc;

    fn registry() -> Registry {
        Registry::new().with(Arc::new(Rule))
    }

    fn addr(name: &str) -> Address {
        Address::new("rule", name)
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("alert"), ("alert".to_string(), None));
        assert_eq!(
            parse_target("dashboards.team.overview"),
            ("dashboard".to_string(), Some("team.overview".to_string()))
        );
    }

    #[test]
    fn test_build_create_update_delete() {
        let remote = rewriting_remote();
        let driver = Driver::new(&remote);
        let store = MemoryStore::new();

        let kept = driver.create(&Rule, &desired()).unwrap();
        store.save(&addr("kept"), &kept).unwrap();
        let changed = driver.create(&Rule, &desired()).unwrap();
        store.save(&addr("changed"), &changed).unwrap();
        let orphan = driver.create(&Rule, &desired()).unwrap();
        store.save(&addr("orphan"), &orphan).unwrap();

        let mut declared = BTreeMap::new();
        declared.insert(addr("kept"), desired());
        declared.insert(addr("changed"), desired().with("name", "memory"));
        declared.insert(addr("new"), desired());

        let plan = ExecutionPlan::build(&driver, &store, &registry(), &declared, false).unwrap();
        let actions: Vec<_> = plan
            .changes
            .iter()
            .map(|c| (c.address.name.as_str(), c.action.clone()))
            .collect();
        assert_eq!(
            actions,
            vec![
                ("changed", Action::Update { changed: vec!["name".into()] }),
                ("kept", Action::NoChange),
                ("new", Action::Create),
                ("orphan", Action::Delete),
            ]
        );
        assert_eq!(plan.pending_count(), 3);
    }

    #[test]
    fn test_refresh_detects_vanished() {
        let remote = rewriting_remote();
        let driver = Driver::new(&remote);
        let store = MemoryStore::new();
        let created = driver.create(&Rule, &desired()).unwrap();
        store.save(&addr("cpu"), &created).unwrap();
        remote.delete("rule", created.id.as_deref().unwrap()).unwrap();

        let mut declared = BTreeMap::new();
        declared.insert(addr("cpu"), desired());
        let plan = ExecutionPlan::build(&driver, &store, &registry(), &declared, true).unwrap();
        assert_eq!(plan.changes[0].action, Action::Create);
        assert!(plan.changes[0].vanished);

        let plan = ExecutionPlan::build(&driver, &store, &registry(), &BTreeMap::new(), true).unwrap();
        assert_eq!(plan.changes[0].action, Action::NoChange);
        assert!(plan.is_converged());
    }

    #[test]
    fn test_unknown_kind_in_state() {
        let remote = MockRemote::new();
        let store = MemoryStore::new();
        store
            .save(&Address::new("widget", "x"), &Record::new().with_id("1"))
            .unwrap();
        let err = ExecutionPlan::build(&Driver::new(&remote), &store, &registry(), &BTreeMap::new(), false)
            .unwrap_err();
        assert!(err.to_string().contains("widget"));
    }

    #[test]
    fn test_destroy_and_filter() {
        let store = MemoryStore::new();
        store.save(&addr("a"), &Record::new().with_id("1")).unwrap();
        store.save(&addr("b"), &Record::new().with_id("2")).unwrap();

        let plan = ExecutionPlan::destroy(&store, &registry()).unwrap();
        assert_eq!(plan.len(), 2);
        assert!(plan.changes.iter().all(|c| c.action == Action::Delete));

        let only_b = plan.clone().filter_by_target(Some("rule.b"));
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b.changes[0].address.name, "b");
        assert_eq!(plan.clone().filter_by_target(Some("rule")).len(), 2);
        assert!(plan.filter_by_target(Some("dashboard")).is_empty());
    }
}
