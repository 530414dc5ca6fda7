use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets::UTF8_HORIZONTAL_ONLY};
use kernel::{Run, RunSummary};

use crate::report::format_size;

const WIDTH: u16 = 120;

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(WIDTH)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_owned(), |v| v.to_string())
}

#[must_use]
pub fn runs_table(runs: &[RunSummary]) -> Table {
    let mut table = new_table(&["Run ID", "Created", "Verdict", "Files", "Tags"]);
    for r in runs {
        table.add_row(vec![
            Cell::new(&r.id),
            Cell::new(or_dash(r.created_at.as_deref())),
            Cell::new(or_dash(r.verdict)),
            Cell::new(or_dash(r.file_count)),
            Cell::new(r.tags.join(", ")),
        ]);
    }
    table
}

/// Run attributes as a two column table.
#[must_use]
pub fn run_table(run: &Run) -> Table {
    let mut table = new_table(&["Property", "Value"]);
    let stats = &run.stats;
    let rows = [
        ("Run ID", run.id.clone()),
        ("Created", or_dash(run.created_at.as_deref())),
        ("Verdict", or_dash(stats.verdict)),
        ("Tests", or_dash(stats.total_tests)),
        ("Passed", or_dash(stats.passed)),
        ("Failed", or_dash(stats.failed)),
        ("Skipped", or_dash(stats.skipped)),
        ("Started", or_dash(stats.start_time)),
        ("Finished", or_dash(stats.end_time)),
        ("Tags", run.tags.join(", ")),
        ("Files", run.file_count().to_string()),
        ("Size", format_size(run.total_size())),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    table
}

#[must_use]
pub fn files_table(run: &Run) -> Table {
    let mut table = new_table(&["File", "Role", "Size", "Stored"]);
    for f in &run.files {
        table.add_row(vec![
            Cell::new(&f.name),
            Cell::new(or_dash(f.role)),
            Cell::new(format_size(f.size)),
            Cell::new(format_size(f.transmitted_size())),
        ]);
    }
    table
}
