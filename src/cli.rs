use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::DEFAULT_PATH;

#[derive(Parser)]
#[command(name = "tidyist")]
#[command(version)]
#[command(
    about = "Declarative reconciliation of Todoist projects, labels, filters and tasks",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Desired-state file (TOML, or JSON by extension)
    #[arg(short, long, global = true, env = "TIDYIST_FILE", default_value = DEFAULT_PATH)]
    pub file: PathBuf,

    /// Print machine-readable JSON instead of the human summary
    #[arg(long, global = true)]
    pub json: bool,

    /// Todoist API origin
    #[arg(long, global = true, env = "TIDYIST_BASE_URL", default_value = todoist::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Overall time limit for network work, in seconds
    #[arg(long, global = true, value_name = "SECS", default_value_t = 300)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate the desired-state file (no network)
    Validate,

    /// Compute and print the plan without changing anything
    ///
    /// Exits with status 2 when changes are pending.
    Plan(PlanArgs),

    /// Compute the plan and apply it
    Apply(ApplyArgs),

    /// Print the current remote state as a desired-state file
    Export(ExportArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct PlanArgs {
    /// Allow deletions (each kind must also enable it under [prune])
    #[arg(long)]
    pub prune: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Allow deletions (each kind must also enable it under [prune])
    #[arg(long)]
    pub prune: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Include the inbox project
    #[arg(long)]
    pub include_inbox: bool,

    /// Pin every entity to its remote id
    #[arg(long)]
    pub include_ids: bool,

    /// Also export colors, favorites and view styles
    #[arg(long)]
    pub full: bool,

    /// Value of the exported `name` field
    #[arg(long, default_value = "exported")]
    pub name: String,
}
