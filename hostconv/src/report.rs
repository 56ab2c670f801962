//! Human and JSON rendering of run summaries.

use std::fmt::{self, Write};

use clap::ValueEnum;
use hostconv_resource::StatusLevel;
use tabled::{Table, Tabled};

use crate::run::{Outcome, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "RESOURCE")]
    id: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "LEVEL")]
    level: String,
    #[tabled(rename = "CHANGES")]
    changes: String,
}

impl From<&Outcome> for OutcomeRow {
    fn from(outcome: &Outcome) -> Self {
        let changes = if outcome.status.differences.is_empty() {
            "-".to_string()
        } else {
            outcome
                .status
                .differences
                .iter()
                .map(|(field, diff)| format!("{}: {}", field, diff))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Self {
            id: outcome.id.clone(),
            kind: outcome.kind.clone(),
            level: format_level(outcome.status.level),
            changes,
        }
    }
}

fn format_level(level: StatusLevel) -> String {
    match level {
        StatusLevel::NoChange => "ok".to_string(),
        StatusLevel::WillChange => "change".to_string(),
        StatusLevel::Fatal => "FATAL".to_string(),
    }
}

pub fn render(summary: &RunSummary, format: Format) -> anyhow::Result<String> {
    match format {
        Format::Json => Ok(serde_json::to_string_pretty(summary)?),
        Format::Text => Ok(render_text(summary)?),
    }
}

fn render_text(summary: &RunSummary) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(
        out,
        "Run {} on {} ({})",
        summary.run_id,
        summary.host,
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;

    if summary.outcomes.is_empty() {
        out.push_str("No resources declared\n");
        return Ok(out);
    }

    let rows: Vec<OutcomeRow> = summary.outcomes.iter().map(OutcomeRow::from).collect();
    writeln!(out, "{}", Table::new(rows))?;

    for outcome in &summary.outcomes {
        let details = outcome
            .details
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .collect::<Vec<_>>();
        if outcome.status.output.is_empty() && outcome.error.is_none() && details.is_empty() {
            continue;
        }
        writeln!(out, "{}:", outcome.id)?;
        for (key, value) in details {
            writeln!(out, "  {}: {}", key, value)?;
        }
        for line in &outcome.status.output {
            writeln!(out, "  {}", line)?;
        }
        if let Some(err) = &outcome.error {
            writeln!(out, "  error: {}", err)?;
        }
    }

    let elapsed = summary.finished_at - summary.started_at;
    writeln!(
        out,
        "{} resource(s), {} change(s), {}{} in {}ms",
        summary.outcomes.len(),
        summary.pending_changes(),
        if summary.failed() { "FAILED" } else { "ok" },
        if summary.cancelled { " (cancelled)" } else { "" },
        elapsed.num_milliseconds()
    )?;
    Ok(out)
}
