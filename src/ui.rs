use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;

use crate::report::{OutcomeStatus, RunReport, RunStatus, StatusReport};

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn count_cell(count: u64) -> Cell {
    Cell::new(count.to_string()).set_alignment(CellAlignment::Right)
}

fn status_cell(status: OutcomeStatus) -> Cell {
    match status {
        OutcomeStatus::Ok => Cell::new("ok").fg(Color::Green),
        OutcomeStatus::Failed => Cell::new("failed").fg(Color::Red),
        OutcomeStatus::Skipped => Cell::new("skipped").fg(Color::DarkGrey),
    }
}

/// Renders the per-source outcome table and overall verdict of a run.
pub fn print_report(report: &RunReport) {
    println!("\n{}", style(format!("{} run", report.mode)).bold().underlined());

    let mut table = new_styled_table();
    table.set_header(vec![
        header_cell("Source"),
        header_cell("Status"),
        header_cell("Records"),
        header_cell("Duration"),
        header_cell("Error"),
    ]);
    for outcome in &report.outcomes {
        table.add_row(vec![
            Cell::new(outcome.source.id()),
            status_cell(outcome.status),
            count_cell(outcome.records),
            Cell::new(format!("{:.2?}", outcome.duration)).set_alignment(CellAlignment::Right),
            match &outcome.error {
                Some(error) => Cell::new(error).fg(Color::Red),
                None => Cell::new("").fg(Color::DarkGrey),
            },
        ]);
    }
    println!("{table}");

    match report.status() {
        RunStatus::Success => {
            println!(
                "{} {} records ingested, {} snapshots rebuilt in {:.2?}",
                style("Success:").green().bold(),
                report.total_records(),
                report.snapshots,
                report.duration
            );
        }
        RunStatus::PartialSuccess { failed } => {
            let names: Vec<&str> = failed.iter().map(|source| source.id()).collect();
            println!(
                "{} {} source(s) failed ({}); everything else was persisted",
                style("Partial success:").yellow().bold(),
                failed.len(),
                names.join(", ")
            );
        }
    }
}

/// Renders per-table record counts and the effective configuration.
pub fn print_status(status: &StatusReport) {
    println!(
        "{} {}",
        style("Database:").bold(),
        status.database.display()
    );
    println!(
        "{} {}",
        style("Tracked assets:").bold(),
        status.tracked_assets.join(", ")
    );

    let mut table = new_styled_table();
    table.set_header(vec![header_cell("Table"), header_cell("Records")]);
    for (name, count) in &status.record_counts {
        table.add_row(vec![Cell::new(*name), count_cell(*count)]);
    }
    println!("{table}");

    let total: u64 = status.record_counts.values().sum();
    println!("{} {total}", style("Total records:").bold());
}
