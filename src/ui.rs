//! Terminal output: messages, plan display and summaries

use colored::Colorize;
use declarative::digest::is_digest;
use declarative::{Action, DiffSummary, ExecuteSummary, FieldChange, ResourceDiff, group_by_type};
use serde_json::Value;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Plan Display
// ============================================================================

/// Display planned writes grouped by kind
pub fn display_plan(diffs: &[ResourceDiff]) {
    let summary = DiffSummary::from_diffs(diffs);
    if !summary.has_changes() {
        println!();
        println!("  {} No changes. Remote objects match the manifest.", "✓".green());
        return;
    }

    println!();
    println!("┌─ {} ─────────────────────────────────────────┐", "Plan".bold());
    println!("│");

    for (kind, kind_diffs) in group_by_type(diffs) {
        println!("│ {}", kind_title(&kind).bold());

        for diff in kind_diffs {
            let (symbol, note) = match &diff.action {
                Action::Create => ("+".green(), "(will create)".to_string()),
                Action::Delete => ("-".red(), "(will delete)".to_string()),
                Action::Update { changed } => ("~".yellow(), format!("({})", changed.join(", "))),
                Action::NoChange => continue,
            };
            println!("│   {} {:<30} {}", symbol, diff.address.name, note.dimmed());

            if diff.is_modification() {
                for change in &diff.changes {
                    for line in field_lines(change) {
                        println!("│       {line}");
                    }
                }
            }
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Plan: {} to add, {} to change, {} to destroy",
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn kind_title(kind: &str) -> &str {
    match kind {
        "alert" => "Alerts",
        "dashboard" => "Dashboards",
        other => other,
    }
}

/// Lines describing one changed field
fn field_lines(change: &FieldChange) -> Vec<String> {
    let before = change.before.as_deref().unwrap_or_default();
    let after = change.after.as_deref().unwrap_or_default();

    if !change.document {
        return vec![format!(
            "{}: {} → {}",
            change.field,
            before.red(),
            after.green()
        )];
    }
    if is_digest(before) {
        return vec![format!("{}: {}", change.field, "(content changed)".dimmed())];
    }

    let mut lines = vec![format!("{}:", change.field)];
    lines.extend(document_diff(before, after));
    lines
}

/// Line diff of two JSON documents, pretty-printed first so key order and
/// whitespace do not show up as changes
pub fn document_diff(before: &str, after: &str) -> Vec<String> {
    let before = pretty(before);
    let after = pretty(after);
    let diff = similar::TextDiff::from_lines(&before, &after);

    let mut lines = Vec::new();
    for change in diff.iter_all_changes() {
        let text = change.to_string_lossy();
        let text = text.trim_end_matches('\n');
        match change.tag() {
            similar::ChangeTag::Delete => lines.push(format!("- {text}").red().to_string()),
            similar::ChangeTag::Insert => lines.push(format!("+ {text}").green().to_string()),
            similar::ChangeTag::Equal => {}
        }
    }
    lines
}

fn pretty(text: &str) -> String {
    let pretty = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| text.to_string());
    pretty + "\n"
}

// ============================================================================
// Summaries
// ============================================================================

/// Print final summary of an apply or destroy
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Apply complete!", "✓".green().bold());
    } else {
        println!("  {} Apply finished with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} created", summary.created);
    }
    if summary.updated > 0 {
        println!("    • {} updated", summary.updated);
    }
    if summary.deleted > 0 {
        println!("    • {} deleted", summary.deleted);
    }
    if summary.no_change > 0 {
        println!("    • {} unchanged", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_diff_ignores_formatting() {
        colored::control::set_override(false);
        let lines = document_diff(r#"{"b": 1, "a": 2}"#, r#"{"a":2,"b":1}"#);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_document_diff_shows_changed_lines() {
        colored::control::set_override(false);
        let lines = document_diff(r#"{"op": ">", "target": 80}"#, r#"{"op": ">", "target": 90}"#);
        assert_eq!(lines, vec!["-   \"target\": 80", "+   \"target\": 90"]);
    }

    #[test]
    fn test_field_lines() {
        colored::control::set_override(false);
        let attribute = FieldChange {
            field: "severity".into(),
            before: Some("warning".into()),
            after: Some("critical".into()),
            document: false,
        };
        assert_eq!(field_lines(&attribute), vec!["severity: warning → critical"]);

        let blob = FieldChange {
            field: "widgets".into(),
            before: Some(format!("blake3:{}", "0".repeat(64))),
            after: Some("[]".into()),
            document: true,
        };
        assert_eq!(field_lines(&blob), vec!["widgets: (content changed)"]);
    }
}
