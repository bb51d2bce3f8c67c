//! Report generation.
//!
//! This module renders aggregation results and loan views as Markdown
//! or JSON.

use crate::analysis::top_purchasers;
use crate::models::{AggregateMap, LoanStatus, UserEventAggregate};
use crate::service::LoanView;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata about an aggregation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// Data file the interactions were read from.
    pub data_path: String,
    /// Date and time of the run.
    pub generated_at: DateTime<Utc>,
    /// Number of interactions aggregated.
    pub interactions: usize,
    /// Number of shards the run was split into.
    pub shards: usize,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete aggregation report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub metadata: ReportMetadata,
    /// Per-user summaries keyed by user id.
    pub users: AggregateMap,
}

/// Generate a complete Markdown aggregation report.
pub fn generate_markdown_report(report: &AggregateReport) -> String {
    let mut output = String::new();

    output.push_str("# User Activity Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_totals_section(&report.users));
    output.push_str(&generate_top_purchasers_section(&report.users));
    output.push_str(&generate_users_section(&report.users));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Data File:** `{}`\n", metadata.data_path));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Interactions:** {}\n", metadata.interactions));
    if metadata.shards > 1 {
        section.push_str(&format!("- **Shards:** {}\n", metadata.shards));
    }
    section.push_str(&format!(
        "- **Duration:** {:.3}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the totals section across all users.
fn generate_totals_section(users: &AggregateMap) -> String {
    let totals = users
        .values()
        .fold(None::<UserEventAggregate>, |acc, summary| match acc {
            None => Some(summary.clone()),
            Some(mut totals) => {
                totals.merge(summary);
                Some(totals)
            }
        })
        .unwrap_or_else(|| UserEventAggregate::starting_at(0));

    let mut section = String::new();

    section.push_str("## Totals\n\n");
    section.push_str("| Users | Clicks | Views | Purchases | **Events** | Purchase Value |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** | {:.2} |\n\n",
        users.len(),
        totals.event_counts.click,
        totals.event_counts.view,
        totals.event_counts.purchase,
        totals.total_events,
        totals.total_purchase_value
    ));

    if !users.is_empty() {
        section.push_str(&format!(
            "*Activity window: {} to {}*\n\n",
            totals.first_event_timestamp, totals.last_event_timestamp
        ));
    }

    section
}

/// Generate the top purchasers section.
fn generate_top_purchasers_section(users: &AggregateMap) -> String {
    let top = top_purchasers(users, 5);
    if top.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Top Purchasers\n\n");
    section.push_str("| User | Purchase Value |\n");
    section.push_str("|:---|:---:|\n");
    for (user, value) in top {
        section.push_str(&format!("| `{}` | {:.2} |\n", user, value));
    }
    section.push('\n');

    section
}

/// Generate the per-user table.
fn generate_users_section(users: &AggregateMap) -> String {
    let mut section = String::new();

    section.push_str("## Users\n\n");

    if users.is_empty() {
        section.push_str("No interactions were recorded.\n\n");
        return section;
    }

    section.push_str("| User | Events | Clicks | Views | Purchases | Purchase Value | First | Last |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    for (user, s) in users {
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | {:.2} | {} | {} |\n",
            user,
            s.total_events,
            s.event_counts.click,
            s.event_counts.view,
            s.event_counts.purchase,
            s.total_purchase_value,
            s.first_event_timestamp,
            s.last_event_timestamp
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    format!("---\n\n*Report generated by loanledger v{}*\n", env!("CARGO_PKG_VERSION"))
}

/// Generate a JSON aggregation report.
pub fn generate_json_report(report: &AggregateReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Render a loan and its dispute history as Markdown.
pub fn generate_loan_markdown(view: &LoanView) -> String {
    let mut output = String::new();

    output.push_str("# Loan Status\n\n");
    output.push_str(&format!("- **Loan ID:** `{}`\n", view.loan.loan_id));
    output.push_str(&format!(
        "- **Status:** {} {}\n",
        status_badge(view.loan.status),
        view.loan.status
    ));
    output.push_str(&format!("- **Disputes:** {}\n\n", view.disputes.len()));

    if !view.disputes.is_empty() {
        output.push_str("| Index | State | Created At |\n");
        output.push_str("|:---:|:---|:---:|\n");
        for (index, dispute) in view.disputes.iter().enumerate() {
            output.push_str(&format!(
                "| {} | {} | {} |\n",
                index, dispute.state, dispute.created_at
            ));
        }
        output.push('\n');
    }

    output
}

/// Render a loan and its dispute history as JSON.
pub fn generate_loan_json(view: &LoanView) -> Result<String> {
    serde_json::to_string_pretty(view).map_err(Into::into)
}

fn status_badge(status: LoanStatus) -> &'static str {
    match status {
        LoanStatus::Unknown => "⚪",
        LoanStatus::Open => "🟡",
        LoanStatus::Closed => "🟢",
        LoanStatus::Fraudulent => "🔴",
    }
}
