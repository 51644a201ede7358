//! `tidyist plan`: show what apply would change.

use anyhow::Result;

use super::{Session, plan_against_remote};
use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;

/// Print the plan; returns whether it contains changes
pub fn run(ctx: &Context, args: &PlanArgs) -> Result<bool> {
    let session = Session::connect(ctx)?;
    let planned = plan_against_remote(ctx, &session, args.prune)?;
    let plan = &planned.plan;

    if ctx.json {
        ui::print_json(plan)?;
    } else {
        println!("Plan:");
        print!("{}", ui::format_plan(plan));
    }
    Ok(plan.summary.has_changes())
}
