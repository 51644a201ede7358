//! `tidyist apply`: plan, confirm, then execute against Todoist.

use anyhow::{Result, bail};
use colored::Colorize;
use reconcile::{ApplyContext, ApplyResult, NoProgress, ProgressCallback, apply};
use serde_json::json;

use super::{Session, plan_against_remote};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::ui::{self, ConsoleProgress};

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let mut session = Session::connect(ctx)?;
    let planned = plan_against_remote(ctx, &session, args.prune)?;
    let plan = &planned.plan;

    if !ctx.json {
        println!("Plan:");
        print!("{}", ui::format_plan(plan));
    }

    if !plan.summary.has_changes() {
        if ctx.json {
            ui::print_json(&json!({ "plan": plan, "result": ApplyResult::default() }))?;
        } else {
            ui::info("Nothing to apply");
        }
        return Ok(());
    }

    if !args.yes {
        if !confirm_proceed()? {
            if !ctx.json {
                println!();
                println!("  {} Aborted", "✗".red());
            }
            bail!("aborted");
        }
        // Time spent at the prompt does not count against the run
        session.restart_deadline();
    }

    let mut console = ConsoleProgress::new(ctx.quiet);
    let mut silent = NoProgress;
    let progress: &mut dyn ProgressCallback = if ctx.json {
        &mut silent
    } else {
        println!();
        &mut console
    };

    let mut apply_ctx = ApplyContext::new(&session.client, &session.client, progress)
        .with_deadline(session.deadline());

    match apply(&planned.desired, &planned.snapshot, plan, &mut apply_ctx) {
        Ok(result) => {
            if ctx.json {
                ui::print_json(&json!({ "plan": plan, "result": result }))?;
            } else {
                println!();
                println!("{}", ui::summary_line(&result.summary));
                ui::success(&format!("Applied {} operations", result.succeeded()));
            }
            Ok(())
        }
        Err(err) => {
            if ctx.json {
                ui::print_json(&json!({
                    "plan": plan,
                    "result": err.partial,
                    "error": err.source.to_string(),
                }))?;
            }
            Err(err.into())
        }
    }
}

fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Apply these changes?")
        .default(false)
        .interact()?;

    Ok(confirmed)
}
