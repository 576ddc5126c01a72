//! Terminal progress and confirmation for the executor

use anyhow::Result;
use colored::Colorize;
use declarative::{Address, ApplyResult, ConfirmCallback, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over the resources of a batch
#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl BarProgress {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&mut self, count: usize) {
        if self.quiet {
            return;
        }
        let pb = ProgressBar::new(count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        self.bar = Some(pb);
    }

    fn on_resource_start(&mut self, _address: &Address, description: &str) {
        if let Some(pb) = &self.bar {
            pb.set_message(description.to_string());
        }
    }

    fn on_resource_complete(&mut self, address: &Address, result: &ApplyResult) {
        let symbol = match result {
            ApplyResult::NoChange => "○".dimmed(),
            ApplyResult::Created | ApplyResult::Updated { .. } | ApplyResult::Deleted => "✓".green(),
            ApplyResult::Failed { .. } => "✗".red(),
            ApplyResult::Skipped { .. } => "⊘".yellow(),
        };
        let line = match result {
            ApplyResult::Failed { error } => format!("  {symbol} {address}: {error}"),
            ApplyResult::Updated { changed } => format!("  {symbol} {address} ({})", changed.join(", ")),
            _ => format!("  {symbol} {address}"),
        };

        match &self.bar {
            Some(pb) => {
                pb.println(line);
                pb.inc(1);
            }
            None if !self.quiet || !result.is_success() => println!("{line}"),
            None => {}
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

/// Confirmation before writes: an interactive prompt, or assumed with `--yes`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirm {
    Prompt,
    Assume,
}

impl Confirm {
    pub fn from_flag(yes: bool) -> Self {
        if yes { Self::Assume } else { Self::Prompt }
    }
}

impl ConfirmCallback for Confirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        match self {
            Self::Assume => Ok(true),
            Self::Prompt => {
                let confirmed = dialoguer::Confirm::new()
                    .with_prompt(prompt)
                    .default(false)
                    .interact()?;
                Ok(confirmed)
            }
        }
    }
}
