//! Tabular summaries of a metrics snapshot.

use serde::Serialize;
use std::fmt;
use tabled::builder::Builder;
use tabled::settings::Style;
use uyuni_metrics::{Counters, MetricsSnapshot};

/// One table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub name: String,
    /// Stored value
    pub value: f64,
    /// Value as displayed, truncated toward zero
    pub total: i64,
}

impl Row {
    fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            total: value.trunc() as i64,
        }
    }
}

/// A titled table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub title: &'static str,
    pub key_header: &'static str,
    pub rows: Vec<Row>,
}

impl Section {
    /// Render as a terminal table
    pub fn table(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record([self.key_header, "Total"]);
        for row in &self.rows {
            builder.push_record([row.name.clone(), row.total.to_string()]);
        }
        let mut table = builder.build();
        table.with(Style::modern());
        table.to_string()
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "- {}", self.title)?;
        writeln!(f)?;
        writeln!(f, "{}", self.table())
    }
}

/// The three summaries of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub salt_jobs: Section,
    pub salt_master_stats: Section,
    pub uyuni_summary: Section,
}

impl Report {
    pub fn sections(&self) -> [&Section; 3] {
        [&self.salt_jobs, &self.salt_master_stats, &self.uyuni_summary]
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Results")?;
        writeln!(f)?;
        for section in self.sections() {
            write!(f, "{}", section)?;
        }
        Ok(())
    }
}

/// Build the report.
///
/// Salt jobs are listed most frequent first, ties kept in insertion order;
/// the other tables are sorted by name.
pub fn render(snapshot: &MetricsSnapshot) -> Report {
    Report {
        salt_jobs: Section {
            title: "Summary of Salt jobs in last 24 hours",
            key_header: "Salt function name",
            rows: by_value_desc(snapshot.salt_jobs()),
        },
        salt_master_stats: Section {
            title: "Salt Master stats",
            key_header: "Name",
            rows: by_name(snapshot.salt_master_stats()),
        },
        uyuni_summary: Section {
            title: "Uyuni Summary",
            key_header: "Name",
            rows: by_name(snapshot.uyuni_summary()),
        },
    }
}

fn by_value_desc(counters: &Counters) -> Vec<Row> {
    let mut rows: Vec<Row> = counters.iter().map(|(k, v)| Row::new(k, v)).collect();
    rows.sort_by(|a, b| b.value.total_cmp(&a.value));
    rows
}

fn by_name(counters: &Counters) -> Vec<Row> {
    let mut rows: Vec<Row> = counters.iter().map(|(k, v)| Row::new(k, v)).collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}
