//! `settle apply`: converge remote objects on the manifest

use anyhow::{Result, bail};
use declarative::{ExecuteOptions, compute_diffs, execute};

use super::{Session, plan};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::{BarProgress, Confirm};
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    ui::header("Applying Manifest");

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let session = Session::open(ctx)?;
    let manifest = session.manifest(ctx)?;
    let plan = plan::build(&session, &manifest.resources, args.target.as_deref(), !args.no_refresh)?;

    plan::report_vanished(&plan);
    ui::display_plan(&compute_diffs(&plan));

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.unwrap_or(session.config.jobs).max(1),
    };
    let summary = execute(
        &plan,
        &opts,
        session.driver(),
        &session.store,
        &mut BarProgress::new(ctx.quiet),
        &mut Confirm::from_flag(args.yes),
    )?;

    if plan.is_converged() {
        return Ok(());
    }
    if summary.skipped > 0 && summary.total_changes() == 0 && summary.failed == 0 {
        ui::info(if args.dry_run { "Nothing applied (dry run)" } else { "Apply cancelled" });
        return Ok(());
    }

    ui::print_summary(&summary);
    if summary.failed > 0 {
        bail!("{} resource(s) failed to apply", summary.failed);
    }
    Ok(())
}
