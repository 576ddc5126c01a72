//! `settle import`: adopt an existing remote object

use anyhow::{Context as AnyhowContext, Result, bail};
use declarative::{Address, StateStore};

use super::Session;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, kind: &str, name: &str, id: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    let address = Address::new(kind, name);
    let rt = session.registry.get(kind)?;

    if session.store.load(&address)?.is_some() {
        bail!("{address} is already tracked; run `settle state rm {address}` first");
    }

    let record = session
        .driver()
        .import(rt.as_ref(), id)
        .with_context(|| format!("Failed to import {kind} {id}"))?;
    session.store.save(&address, &record)?;

    ui::success(&format!("Imported {kind} {id} as {address}"));
    if !ctx.quiet {
        ui::dim("Declare it in the manifest and run `settle plan` to see any drift");
    }
    Ok(())
}
