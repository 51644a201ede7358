mod cli;
mod commands;
mod config;
mod token;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use reconcile::{ApplyError, ErrorCategory};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    pub json: bool,
    pub file: PathBuf,
    pub base_url: String,
    pub timeout: Duration,
}

/// `plan` exit status when changes are pending
const EXIT_CHANGES: u8 = 2;

fn main() -> ExitCode {
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

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            ui::error(&format!("{err:#}"));
            if let Some(category) = error_category(&err) {
                eprintln!("  {category}: {}", category.advice());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let ctx = Context {
        quiet: cli.quiet,
        json: cli.json,
        file: cli.file,
        base_url: cli.base_url,
        timeout: Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Command::Validate => commands::validate::run(&ctx)?,
        Command::Plan(args) => {
            if commands::plan::run(&ctx, &args)? {
                return Ok(ExitCode::from(EXIT_CHANGES));
            }
        }
        Command::Apply(args) => commands::apply::run(&ctx, &args)?,
        Command::Export(args) => commands::export::run(&ctx, &args)?,
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "tidyist", &mut io::stdout());
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Category of the first reconciliation error in the chain, if any
fn error_category(err: &anyhow::Error) -> Option<ErrorCategory> {
    err.chain().find_map(|cause| {
        cause
            .downcast_ref::<ApplyError>()
            .map(ApplyError::category)
            .or_else(|| {
                cause
                    .downcast_ref::<reconcile::Error>()
                    .map(reconcile::Error::category)
            })
    })
}
