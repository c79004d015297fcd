//! Vote Export
//!
//! Builds the results report handed to organisers: a per-contestant
//! yes/no summary followed by the raw vote log, as CSV or JSON.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::model::{Contestant, VoteTally};
use super::votes::{VoteRecord, VoteStore};

/// Per-contestant line of the summary table
#[derive(Debug, Clone, Serialize)]
pub struct ContestantSummary {
    pub contestant_id: i64,
    pub name: String,
    pub yes_count: u64,
    pub no_count: u64,
    pub total: u64,
}

/// Complete export report
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub generated_at: DateTime<Utc>,
    pub summary: Vec<ContestantSummary>,
    pub votes: Vec<VoteRecord>,
}

/// Output format for the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(crate::Error::InvalidRequest(format!("unknown export format '{}'", other))),
        }
    }
}

impl ExportFormat {
    /// MIME type for HTTP responses
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    /// File extension for downloads
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl ExportReport {
    /// Build a report from counters and the vote log
    pub fn new(tallies: Vec<(Contestant, VoteTally)>, votes: Vec<VoteRecord>) -> Self {
        let summary = tallies
            .into_iter()
            .map(|(contestant, tally)| ContestantSummary {
                contestant_id: contestant.id,
                name: contestant.name,
                yes_count: tally.yes_count,
                no_count: tally.no_count,
                total: tally.total(),
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            summary,
            votes,
        }
    }

    /// Read everything needed for a report from the store
    pub async fn from_store(store: &VoteStore) -> Result<Self> {
        let tallies = store.tallies().await?;
        let votes = store.vote_log().await?;
        Ok(Self::new(tallies, votes))
    }

    /// Render in the requested format
    pub fn render(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Csv => Ok(self.to_csv()),
            ExportFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| crate::Error::Internal(format!("JSON encoding failed: {}", e))),
        }
    }

    /// Two CSV sections separated by a blank line: summary, then raw log
    pub fn to_csv(&self) -> String {
        let mut out = String::new();

        out.push_str("contestant_id,name,yes_count,no_count,total\n");
        for row in &self.summary {
            push_row(&mut out, &[
                row.contestant_id.to_string(),
                row.name.clone(),
                row.yes_count.to_string(),
                row.no_count.to_string(),
                row.total.to_string(),
            ]);
        }

        out.push('\n');
        out.push_str("id,contestant_id,contestant_name,vote_type,voter_identity,timestamp\n");
        for vote in &self.votes {
            push_row(&mut out, &[
                vote.id.to_string(),
                vote.contestant_id.to_string(),
                vote.contestant_name.clone(),
                vote.vote_type.to_string(),
                vote.voter_identity.clone(),
                vote.timestamp.to_rfc3339(),
            ]);
        }

        out
    }
}

fn push_row(out: &mut String, fields: &[String]) {
    let escaped: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
    out.push_str(&escaped.join(","));
    out.push('\n');
}

/// Quote a field when it contains a delimiter, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
