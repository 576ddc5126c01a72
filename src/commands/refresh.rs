//! `settle refresh`: re-read tracked objects into state

use anyhow::Result;
use declarative::{StateStore, refresh};

use super::Session;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let tracked = session.store.addresses()?.len();
    if tracked == 0 {
        ui::info("Nothing tracked yet");
        return Ok(());
    }

    let dropped = refresh(session.driver(), &session.store, &session.registry)?;
    for address in &dropped {
        ui::warn(&format!("{address} no longer exists on the server, removed from state"));
    }
    if !ctx.quiet {
        ui::success(&format!(
            "Refreshed {} object(s) from {}",
            tracked - dropped.len(),
            session.config.endpoint
        ));
    }
    Ok(())
}
