//! `settle plan`: preview what apply would change

use anyhow::Result;
use declarative::{Address, ExecutionPlan, Record, StateStore, compute_diffs};
use std::collections::BTreeMap;

use super::Session;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, target: Option<&str>, refresh: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let manifest = session.manifest(ctx)?;
    if manifest.is_empty() {
        ui::warn(&format!("{} declares no resources", ctx.manifest.display()));
    }
    let plan = build(&session, &manifest.resources, target, refresh)?;

    if !ctx.quiet {
        ui::dim(&format!(
            "{} declared, {} tracked, {} to write",
            manifest.len(),
            session.store.addresses()?.len(),
            plan.pending_count()
        ));
    }
    report_vanished(&plan);
    ui::display_plan(&compute_diffs(&plan));
    Ok(())
}

/// Build a plan over the manifest and state, narrowed to `target`
pub fn build(
    session: &Session,
    declared: &BTreeMap<Address, Record>,
    target: Option<&str>,
    refresh: bool,
) -> Result<ExecutionPlan> {
    let plan = ExecutionPlan::build(&session.driver(), &session.store, &session.registry, declared, refresh)?;
    Ok(plan.filter_by_target(target))
}

/// Warn about tracked objects that were deleted outside settle
pub fn report_vanished(plan: &ExecutionPlan) {
    for change in plan.changes.iter().filter(|c| c.vanished) {
        ui::warn(&format!("{} no longer exists on the server", change.address));
    }
}
