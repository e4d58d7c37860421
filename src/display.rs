use crate::config::MetricSpec;
use crate::filter::{CompiledFilter, FilterParseError};
use crate::pipeline::IngestReport;
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use std::fmt::Write as _;

/// One row of the `check` report
#[derive(Debug, Clone)]
pub struct CheckRow {
    pub name: String,
    pub metric_type: &'static str,
    pub labels: Vec<String>,
    pub filter: String,
    pub error: Option<FilterParseError>,
}

impl CheckRow {
    pub fn from_spec(spec: &MetricSpec) -> Self {
        Self {
            name: spec.name.clone(),
            metric_type: spec.metric_type.as_str(),
            labels: spec
                .labels
                .iter()
                .map(|l| format!("{}={}", l.name, l.template.source()))
                .collect(),
            filter: spec.filter.clone(),
            error: CompiledFilter::compile(&spec.filter).err(),
        }
    }
}

fn create_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Format the configuration check as a table followed by a verdict line
pub fn format_check_report(rows: &[CheckRow]) -> String {
    let mut out = String::new();

    let mut table = create_styled_table();
    table.set_header(vec!["Metric", "Type", "Labels", "Filter", "Status"]);

    for row in rows {
        let status = match &row.error {
            None => "ok".green().to_string(),
            Some(e) => e.to_string().red().to_string(),
        };
        table.add_row(vec![
            Cell::new(&row.name),
            Cell::new(row.metric_type),
            Cell::new(row.labels.join("\n")),
            Cell::new(&row.filter),
            Cell::new(status),
        ]);
    }

    let _ = writeln!(out, "{table}");

    let failed = rows.iter().filter(|r| r.error.is_some()).count();
    if failed == 0 {
        let _ = writeln!(
            out,
            "{} metric(s) valid",
            rows.len().to_string().green().bold()
        );
    } else {
        let _ = writeln!(
            out,
            "{} of {} metric(s) have filters that do not compile",
            failed.to_string().red().bold(),
            rows.len()
        );
    }

    out
}

/// Format the totals of a replay run
pub fn format_ingest_summary(events: usize, rejected_lines: usize, report: &IngestReport) -> String {
    format!(
        "events: {}, undecodable lines: {}, matched: {}, incremented: {}, skipped: {}, failed: {}",
        events,
        rejected_lines,
        report.matched,
        report.incremented,
        report.skipped,
        report.failed
    )
}
