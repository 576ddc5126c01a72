//! `settle state`: inspect and edit tracked state

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{Record, StateStore};

use super::{Session, parse_address};
use crate::Context;
use crate::ui;

pub fn list(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let addresses = session.store.addresses()?;
    if addresses.is_empty() {
        ui::info(&format!("No tracked objects in {}", session.store.path().display()));
        return Ok(());
    }

    for address in addresses {
        if ctx.verbose > 0
            && let Some(record) = session.store.load(&address)?
        {
            println!("{address} {}", id_label(&record).dimmed());
        } else {
            println!("{address}");
        }
    }
    if ctx.verbose > 0 {
        ui::dim(&format!(
            "{} (last written {})",
            session.store.path().display(),
            session.store.last_updated().to_rfc3339()
        ));
    }
    Ok(())
}

pub fn show(ctx: &Context, address: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    let address = parse_address(address)?;
    let Some(record) = session.store.load(&address)? else {
        bail!("{address} is not tracked");
    };

    ui::header(&address.to_string());
    ui::kv("id", record.id.as_deref().unwrap_or("-"));
    for (field, value) in &record.fields {
        ui::kv(field, &render(value));
    }
    Ok(())
}

pub fn rm(ctx: &Context, address: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    let address = parse_address(address)?;
    if !session.store.remove(&address)? {
        bail!("{address} is not tracked");
    }
    ui::success(&format!("{address} removed from state; the remote object was left untouched"));
    Ok(())
}

fn id_label(record: &Record) -> String {
    format!("(id {})", record.id.as_deref().unwrap_or("-"))
}

/// Field values as shown by `state show`: documents are pretty-printed
fn render(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(doc @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
                serde_json::to_string_pretty(&doc).unwrap_or_else(|_| text.clone())
            }
            _ => text.clone(),
        },
        other => other.to_string(),
    }
}
