use anyhow::Result;
use colored::Colorize;
use reconcile::{Action, Kind, OperationResult, Plan, ProgressCallback, Summary};
use serde::Serialize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Pretty-print a value as JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Todoist Vocabulary
// ============================================================================

pub fn kind_heading(kind: Kind) -> &'static str {
    match kind {
        Kind::Container => "Projects",
        Kind::Tag => "Labels",
        Kind::SavedQuery => "Filters",
        Kind::WorkItem => "Tasks",
    }
}

pub fn kind_noun(kind: Kind, count: usize) -> &'static str {
    match (kind, count == 1) {
        (Kind::Container, true) => "project",
        (Kind::Container, false) => "projects",
        (Kind::Tag, true) => "label",
        (Kind::Tag, false) => "labels",
        (Kind::SavedQuery, true) => "filter",
        (Kind::SavedQuery, false) => "filters",
        (Kind::WorkItem, true) => "task",
        (Kind::WorkItem, false) => "tasks",
    }
}

fn symbol(action: Action) -> colored::ColoredString {
    match action {
        Action::Create => "+".green(),
        Action::Delete => "-".red(),
        _ => "~".yellow(),
    }
}

// ============================================================================
// Plan and Result Rendering
// ============================================================================

pub fn summary_line(summary: &Summary) -> String {
    format!(
        "Summary: {} to create, {} to update, {} to move, {} to delete, {} to reorder.",
        summary.create, summary.update, summary.moves, summary.delete, summary.reorder
    )
}

/// Human-readable plan, grouped by kind in plan order
pub fn format_plan(plan: &Plan) -> String {
    let mut out = String::new();
    if plan.operations.is_empty() {
        out.push_str("  No changes.\n");
    }

    let mut current: Option<Kind> = None;
    for op in &plan.operations {
        if current != Some(op.kind) {
            current = Some(op.kind);
            out.push_str(&format!("\n{}\n", kind_heading(op.kind).cyan().bold()));
        }
        out.push_str(&format!("  {} {} {:?}\n", symbol(op.action), op.action, op.name));
        for change in &op.changes {
            out.push_str(&format!(
                "      {}: {} -> {}\n",
                change.field.dimmed(),
                display_value(&change.from),
                display_value(&change.to)
            ));
        }
    }

    out.push('\n');
    out.push_str(&summary_line(&plan.summary));
    out.push('\n');

    if !plan.notes.is_empty() {
        out.push_str("Notes:\n");
        for note in &plan.notes {
            out.push_str(&format!("  - {note}\n"));
        }
    }
    out
}

fn display_value(value: &str) -> String {
    if value.is_empty() {
        "(none)".dimmed().to_string()
    } else {
        value.to_string()
    }
}

/// One line for an operation outcome
pub fn format_result(result: &OperationResult) -> String {
    let noun = kind_noun(result.kind, 1);
    if result.is_ok() {
        format!(
            "  {} {} {} {:?}",
            "✓".green(),
            noun,
            result.action,
            result.name
        )
    } else {
        format!(
            "  {} {} {} {:?}: {}",
            "✗".red(),
            noun,
            result.action,
            result.name,
            result.status
        )
    }
}

/// Console progress for apply runs
pub struct ConsoleProgress {
    quiet: bool,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressCallback for ConsoleProgress {
    fn on_phase_start(&mut self, kind: Kind, action: Action, count: usize) {
        if self.quiet {
            return;
        }
        println!(
            "{} {} {} {}",
            "→".cyan(),
            action,
            count,
            kind_noun(kind, count)
        );
    }

    fn on_operation_complete(&mut self, result: &OperationResult) {
        if self.quiet && result.is_ok() {
            return;
        }
        println!("{}", format_result(result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{Change, Operation};

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_format_empty_plan() {
        plain();
        let rendered = format_plan(&Plan::default());
        assert!(rendered.contains("No changes."));
        assert!(rendered.contains(
            "Summary: 0 to create, 0 to update, 0 to move, 0 to delete, 0 to reorder."
        ));
    }

    #[test]
    fn test_format_plan_groups_by_kind() {
        plain();
        let mut plan = Plan::default();
        plan.push(Operation::new(Kind::Container, Action::Create, "Work"));
        plan.push(
            Operation::new(Kind::Container, Action::Update, "Home")
                .with_id("P1")
                .with_changes(vec![Change::new("color", "red", "blue")]),
        );
        plan.push(Operation::new(Kind::Tag, Action::Delete, "stale").with_id("L1"));
        plan.note("refusing to delete protected container \"Inbox\"");

        let rendered = format_plan(&plan);
        let expected = "\nProjects\n  + create \"Work\"\n  ~ update \"Home\"\n      color: red -> blue\n\nLabels\n  - delete \"stale\"\n";
        assert!(rendered.starts_with(expected), "{rendered}");
        assert!(rendered.contains("Summary: 1 to create, 1 to update, 0 to move, 1 to delete"));
        assert!(rendered.contains("Notes:\n  - refusing to delete protected container"));
    }

    #[test]
    fn test_empty_change_values_are_marked() {
        plain();
        let mut plan = Plan::default();
        plan.push(
            Operation::new(Kind::Container, Action::Move, "Child")
                .with_id("P2")
                .with_changes(vec![Change::new("parent", "Work", "")]),
        );
        assert!(format_plan(&plan).contains("parent: Work -> (none)"));
    }

    #[test]
    fn test_format_results() {
        plain();
        let ok = OperationResult::ok(Kind::SavedQuery, Action::Reorder, "saved_queries", None);
        assert_eq!(format_result(&ok), "  ✓ filter reorder \"saved_queries\"");

        let failed = OperationResult::failed(
            Kind::WorkItem,
            Action::Update,
            "weekly-review",
            Some("T1".into()),
            "http 400: bad".into(),
        );
        assert_eq!(
            format_result(&failed),
            "  ✗ task update \"weekly-review\": http 400: bad"
        );
    }

    #[test]
    fn test_kind_noun_plurals() {
        assert_eq!(kind_noun(Kind::Container, 1), "project");
        assert_eq!(kind_noun(Kind::SavedQuery, 2), "filters");
        assert_eq!(kind_noun(Kind::WorkItem, 0), "tasks");
    }
}
