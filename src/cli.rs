use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "settle")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative SigNoz alerts and dashboards without false drift", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// SigNoz base URL
    #[arg(long, env = "SETTLE_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// SigNoz API key
    #[arg(long, env = "SETTLE_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// State file (default: ~/.local/state/settle/state.json)
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Manifest file or directory of *.toml files
    #[arg(short, long, default_value = "settle.toml", global = true)]
    pub file: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Create, update and delete remote objects to match the manifest
    Apply(ApplyArgs),

    /// Re-read every tracked object and update state
    Refresh,

    /// Start tracking an existing remote object
    Import {
        /// Resource kind: alert or dashboard
        kind: String,
        /// Name to track it under (as declared in the manifest)
        name: String,
        /// Server-assigned identifier
        id: String,
    },

    /// Delete tracked remote objects
    Destroy {
        /// Only this kind or address (e.g. "alert" or "alert.cpu-high")
        target: Option<String>,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Inspect or edit tracked state
    #[command(subcommand)]
    State(StateCommand),

    /// Print the server default values ignored when comparing documents
    Rules {
        /// Only this kind: alert or dashboard
        kind: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Only this kind or address (e.g. "alert" or "alert.cpu-high")
    pub target: Option<String>,

    /// Plan against state as last written instead of re-reading the server
    #[arg(long)]
    pub no_refresh: bool,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Only this kind or address (e.g. "alert" or "alert.cpu-high")
    pub target: Option<String>,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Number of objects reconciled in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Plan against state as last written instead of re-reading the server
    #[arg(long)]
    pub no_refresh: bool,
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// List tracked addresses
    List,

    /// Show the persisted record of an address
    Show {
        /// Address, e.g. "alert.cpu-high"
        address: String,
    },

    /// Stop tracking an address without touching the remote object
    Rm {
        /// Address, e.g. "alert.cpu-high"
        address: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "settle", "apply", "alert.cpu-high", "--yes", "--jobs", "2", "-f", "monitoring/",
        ])
        .unwrap();
        assert_eq!(cli.file, PathBuf::from("monitoring/"));
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.target.as_deref(), Some("alert.cpu-high"));
        assert!(args.yes);
        assert!(!args.dry_run);
        assert_eq!(args.jobs, Some(2));
    }

    #[test]
    fn test_parse_state_and_import() {
        let cli = Cli::try_parse_from(["settle", "state", "rm", "dashboard.hosts"]).unwrap();
        assert!(matches!(cli.command, Command::State(StateCommand::Rm { address }) if address == "dashboard.hosts"));

        let cli = Cli::try_parse_from(["settle", "import", "alert", "cpu-high", "42"]).unwrap();
        assert!(matches!(cli.command, Command::Import { id, .. } if id == "42"));
    }
}
