//! Execution engine - applies a plan with bounded parallelism
//!
//! Distinct resources are reconciled in parallel on a rayon pool of
//! `jobs` threads. Each resource runs its own read-then-write cycle, so no
//! two calls ever target the same remote object at once. A failing resource
//! is recorded and the rest of the batch carries on.

use crate::callback::{AutoConfirm, ConfirmCallback, NoProgress, ProgressCallback};
use crate::error::Error;
use crate::lifecycle::Driver;
use crate::planner::{ExecutionPlan, PlannedChange};
use crate::resource::Registry;
use crate::store::StateStore;
use crate::types::{Action, Address, ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::{Context, Result};
use rayon::prelude::*;

/// Execute a plan with the given options and callbacks
///
/// # Arguments
/// * `plan` - The execution plan to run
/// * `opts` - Execution options (dry_run, jobs)
/// * `driver` - Lifecycle driver bound to the remote API
/// * `store` - Where reconciled records are persisted
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
///
/// # Returns
/// Summary of execution results
pub fn execute<P, C>(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    driver: Driver<'_>,
    store: &dyn StateStore,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let mut summary = ExecuteSummary::default();

    // Converged entries still persist what the plan learned (refreshed
    // server fields, objects that vanished)
    for change in plan.changes.iter().filter(|c| !c.action.is_write()) {
        if !opts.dry_run {
            settle_unchanged(change, store)
                .with_context(|| format!("Failed to update state for {}", change.address))?;
        }
        summary.add_result(&ApplyResult::NoChange);
    }

    let pending: Vec<&PlannedChange> = plan.pending().collect();
    if pending.is_empty() {
        return Ok(summary);
    }

    if opts.dry_run {
        summary.skipped += pending.len();
        return Ok(summary);
    }

    let prompt = format!(
        "Apply {} change{}?",
        pending.len(),
        if pending.len() == 1 { "" } else { "s" }
    );
    if !confirm.confirm(&prompt)? {
        summary.skipped += pending.len();
        return Ok(summary);
    }

    progress.on_batch_start(pending.len());
    let results = execute_batch(&pending, opts.jobs, driver, store, progress)?;
    for result in &results {
        summary.add_result(result);
    }
    progress.on_batch_complete();

    Ok(summary)
}

/// Execute a batch of changes
fn execute_batch<P: ProgressCallback>(
    changes: &[&PlannedChange],
    jobs: usize,
    driver: Driver<'_>,
    store: &dyn StateStore,
    progress: &mut P,
) -> Result<Vec<ApplyResult>> {
    if jobs <= 1 || changes.len() == 1 {
        let mut results = Vec::with_capacity(changes.len());
        for change in changes {
            progress.on_resource_start(&change.address, &change.description());
            let result = apply_change(change, driver, store);
            progress.on_resource_complete(&change.address, &result);
            results.push(result);
        }
        Ok(results)
    } else {
        execute_parallel(changes, jobs, driver, store, progress)
    }
}

/// Execute changes in parallel using rayon
fn execute_parallel<P: ProgressCallback>(
    changes: &[&PlannedChange],
    jobs: usize,
    driver: Driver<'_>,
    store: &dyn StateStore,
    progress: &mut P,
) -> Result<Vec<ApplyResult>> {
    // The progress callback is not thread-safe; results are reported after
    // the pool finishes, in plan order.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("Failed to create thread pool")?;

    let results: Vec<(&Address, ApplyResult)> = pool.install(|| {
        changes
            .par_iter()
            .map(|change| (&change.address, apply_change(change, driver, store)))
            .collect()
    });

    for (address, result) in &results {
        progress.on_resource_complete(address, result);
    }

    Ok(results.into_iter().map(|(_, r)| r).collect())
}

/// Apply a single change and persist its outcome
fn apply_change(change: &PlannedChange, driver: Driver<'_>, store: &dyn StateStore) -> ApplyResult {
    let rt = change.resource_type.as_ref();
    let outcome = driver.converge(rt, change.desired.as_ref(), change.previous.as_ref());

    let persisted = outcome.and_then(|outcome| {
        match &outcome.record {
            Some(record) => store.save(&change.address, record)?,
            None => {
                store.remove(&change.address)?;
            }
        }
        Ok(outcome.action)
    });

    match persisted {
        Ok(Action::Create) => ApplyResult::Created,
        Ok(Action::Update { changed }) => ApplyResult::Updated { changed },
        Ok(Action::Delete) => ApplyResult::Deleted,
        Ok(Action::NoChange) => ApplyResult::NoChange,
        Err(e) => {
            log::error!("{}: {e}", change.address);
            ApplyResult::Failed { error: failure_message(&e) }
        }
    }
}

/// Error text for a failed resource; remote failures carry a hint
fn failure_message(err: &Error) -> String {
    match err {
        Error::Remote(remote) => format!("{err}. {}", remote.category().advice()),
        other => other.to_string(),
    }
}

fn settle_unchanged(change: &PlannedChange, store: &dyn StateStore) -> crate::error::Result<()> {
    if change.vanished && change.desired.is_none() {
        log::info!("forgetting {}: deleted remotely", change.address);
        store.remove(&change.address)?;
    } else if let Some(next) = &change.next {
        store.save(&change.address, next)?;
    }
    Ok(())
}

/// Re-read every persisted resource and store what the server reports
///
/// Objects that no longer exist remotely are dropped from state. Returns the
/// addresses that were dropped.
pub fn refresh(driver: Driver<'_>, store: &dyn StateStore, registry: &Registry) -> Result<Vec<Address>> {
    let mut dropped = Vec::new();
    for address in store.addresses()? {
        let rt = registry.get(&address.kind)?;
        let Some(previous) = store.load(&address)? else {
            continue;
        };
        match driver
            .read(rt.as_ref(), &previous)
            .with_context(|| format!("Failed to refresh {address}"))?
        {
            Some(current) => store.save(&address, &current)?,
            None => {
                store.remove(&address)?;
                dropped.push(address);
            }
        }
    }
    Ok(dropped)
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    driver: Driver<'_>,
    store: &dyn StateStore,
) -> Result<ExecuteSummary> {
    execute(plan, opts, driver, store, &mut NoProgress, &mut AutoConfirm)
}
