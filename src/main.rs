mod cli;
mod client;
mod commands;
mod config;
mod manifest;
mod paths;
mod progress;
mod resource;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, StateCommand};
use config::Overrides;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Manifest file or directory
    pub manifest: PathBuf,
    pub overrides: Overrides,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        manifest: cli.file,
        overrides: Overrides {
            endpoint: cli.endpoint,
            api_key: cli.api_key,
            state_file: cli.state,
            jobs: None,
        },
    };

    match cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, args.target.as_deref(), !args.no_refresh),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Refresh => commands::refresh::run(&ctx),
        Command::Import { kind, name, id } => commands::import::run(&ctx, &kind, &name, &id),
        Command::Destroy { target, yes } => commands::destroy::run(&ctx, target.as_deref(), yes),
        Command::State(cmd) => match cmd {
            StateCommand::List => commands::state::list(&ctx),
            StateCommand::Show { address } => commands::state::show(&ctx, &address),
            StateCommand::Rm { address } => commands::state::rm(&ctx, &address),
        },
        Command::Rules { kind } => commands::rules::run(kind.as_deref()),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "settle", &mut io::stdout());
            Ok(())
        }
    }
}
