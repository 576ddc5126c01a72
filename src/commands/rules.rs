//! `settle rules`: print how each document field is compared

use anyhow::Result;
use colored::Colorize;
use declarative::{DefaultFieldPolicy, Strategy};

use crate::config::DEFAULT_ENDPOINT;
use crate::resource::Catalog;
use crate::ui;

const KINDS: &[&str] = &["alert", "dashboard"];

pub fn run(kind: Option<&str>) -> Result<()> {
    let catalog = Catalog::new(DEFAULT_ENDPOINT);
    let kinds: Vec<&str> = match kind {
        Some(kind) => vec![kind],
        None => KINDS.to_vec(),
    };

    for kind in kinds {
        let schema = catalog.schema(kind)?;
        ui::section(kind);
        for (field, strategy) in schema.documents() {
            println!("  {} {}", field.bold(), strategy.to_string().dimmed());
            if let Strategy::Canonical(policy) = strategy {
                for line in rule_lines(policy) {
                    println!("      {line}");
                }
            }
        }
    }
    Ok(())
}

/// One line per ignored default, e.g. `hidden = true  in builderQueries.A`
fn rule_lines(policy: &DefaultFieldPolicy) -> Vec<String> {
    let width = policy
        .rules()
        .iter()
        .map(|r| r.key().len() + r.value().to_string().len() + 3)
        .max()
        .unwrap_or(0);

    policy
        .rules()
        .iter()
        .map(|rule| {
            let assignment = format!("{} = {}", rule.key(), rule.value());
            format!("{assignment:<width$}  {}", rule.scope())
        })
        .collect()
}
