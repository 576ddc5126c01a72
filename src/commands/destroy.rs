//! `settle destroy`: delete tracked remote objects

use anyhow::{Result, bail};
use declarative::{ExecuteOptions, ExecutionPlan, compute_diffs, execute};

use super::Session;
use crate::Context;
use crate::progress::{BarProgress, Confirm};
use crate::ui;

pub fn run(ctx: &Context, target: Option<&str>, yes: bool) -> Result<()> {
    ui::header("Destroying Tracked Objects");

    let session = Session::open(ctx)?;
    let plan = ExecutionPlan::destroy(&session.store, &session.registry)?.filter_by_target(target);
    if plan.is_empty() {
        ui::info("Nothing to destroy");
        return Ok(());
    }
    ui::display_plan(&compute_diffs(&plan));

    let opts = ExecuteOptions {
        dry_run: false,
        jobs: session.config.jobs,
    };
    let summary = execute(
        &plan,
        &opts,
        session.driver(),
        &session.store,
        &mut BarProgress::new(ctx.quiet),
        &mut Confirm::from_flag(yes),
    )?;

    if summary.total_changes() == 0 && summary.failed == 0 {
        ui::info("Destroy cancelled");
        return Ok(());
    }
    ui::print_summary(&summary);
    if summary.failed > 0 {
        bail!("{} resource(s) failed to delete", summary.failed);
    }
    Ok(())
}
