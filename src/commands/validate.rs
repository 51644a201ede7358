//! `tidyist validate`: check the desired-state file offline.

use anyhow::Result;
use serde_json::json;

use crate::Context;
use crate::config::{self, ValidationError};
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    match config::load(&ctx.file) {
        Ok(config) => {
            if ctx.json {
                return ui::print_json(&json!({ "valid": true }));
            }
            ui::success(&format!("{} is valid", ctx.file.display()));
            if !ctx.quiet {
                ui::kv("name", &config.name);
                ui::kv(
                    "entities",
                    &format!(
                        "{} projects, {} labels, {} filters, {} tasks",
                        config.projects.len(),
                        config.labels.len(),
                        config.filters.len(),
                        config.tasks.len()
                    ),
                );
            }
            Ok(())
        }
        Err(err) => {
            if ctx.json {
                let errors = match err.downcast_ref::<ValidationError>() {
                    Some(invalid) => invalid.0.clone(),
                    None => vec![format!("{err:#}")],
                };
                ui::print_json(&json!({ "valid": false, "errors": errors }))?;
            }
            Err(err)
        }
    }
}
