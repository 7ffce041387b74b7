//! Run aggregation and report publishing.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::run::{CampaignRun, ErrorKind, OutcomeStatus};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One failed contact, carried into the report's failure table.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FailureDetail {
    pub email: String,
    pub display_name: Option<String>,
    pub attempts: u32,
    pub kind: ErrorKind,
    pub detail: String,
}

/// Aggregated view of one campaign run.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CampaignSummary {
    pub title: String,
    pub provider: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub render_failures: usize,
    pub transient_failures: usize,
    pub permanent_failures: usize,
    pub aborted_contacts: usize,
    /// Percentage of planned contacts accepted, 0.0 for an empty run.
    pub success_rate: f64,
    pub aborted: bool,
    pub failures: Vec<FailureDetail>,
}

/// Fold a run into its summary.
#[must_use]
pub fn summarize(run: &CampaignRun, title: impl Into<String>) -> CampaignSummary {
    let total = run.outcomes.len();
    let sent = run.sent();
    let success_rate = success_rate(sent, total);

    let failures = run
        .outcomes
        .iter()
        .filter_map(|outcome| match &outcome.status {
            OutcomeStatus::Accepted { .. } => None,
            OutcomeStatus::Failed { kind, detail } => Some(FailureDetail {
                email: outcome.email.to_string(),
                display_name: outcome.display_name.clone(),
                attempts: outcome.attempts,
                kind: *kind,
                detail: detail.clone(),
            }),
        })
        .collect();

    CampaignSummary {
        title: title.into(),
        provider: run.provider.to_string(),
        started_at: run.started_at,
        finished_at: run.finished_at,
        total,
        sent,
        failed: run.failed(),
        render_failures: run.failures_of(ErrorKind::Render),
        transient_failures: run.failures_of(ErrorKind::Transient),
        permanent_failures: run.failures_of(ErrorKind::Permanent),
        aborted_contacts: run.failures_of(ErrorKind::Aborted),
        success_rate,
        aborted: run.aborted,
        failures,
    }
}

/// Percentage of `sent` over `total`, 0.0 for an empty run.
#[allow(clippy::cast_precision_loss)]
fn success_rate(sent: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        sent as f64 / total as f64 * 100.0
    }
}

/// Destination for a finished summary.
pub trait ReportSink {
    /// Publish the summary, returning where it landed.
    ///
    /// # Errors
    /// Returns [`ReportError`] when the destination cannot be written.
    fn publish(&self, summary: &CampaignSummary) -> Result<PathBuf, ReportError>;
}

/// Writes a self-contained HTML page under a report directory.
pub struct HtmlReportSink {
    dir: PathBuf,
}

impl HtmlReportSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn render(summary: &CampaignSummary) -> String {
        let mut html = String::with_capacity(4096);
        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{title}</title>\n<style>\n\
             body {{ font-family: sans-serif; margin: 2rem; color: #1a1a2e; }}\n\
             .cards {{ display: flex; gap: 1rem; flex-wrap: wrap; }}\n\
             .card {{ border: 1px solid #ddd; border-radius: 8px; padding: 1rem 2rem; text-align: center; }}\n\
             .card .value {{ font-size: 2rem; font-weight: bold; }}\n\
             .card.ok .value {{ color: #2e7d32; }}\n\
             .card.bad .value {{ color: #c62828; }}\n\
             table {{ border-collapse: collapse; margin-top: 1.5rem; width: 100%; }}\n\
             th, td {{ border: 1px solid #ddd; padding: 0.4rem 0.8rem; text-align: left; }}\n\
             th {{ background: #f5f5f5; }}\n\
             .banner {{ background: #fff3e0; border: 1px solid #ffb300; padding: 0.6rem 1rem; border-radius: 6px; margin: 1rem 0; }}\n\
             </style>\n</head>\n<body>\n<h1>{title}</h1>\n\
             <p>Provider: {provider} &middot; started {started} &middot; finished {finished}</p>\n",
            title = escape(&summary.title),
            provider = escape(&summary.provider),
            started = summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            finished = summary.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );

        if summary.aborted {
            html.push_str("<div class=\"banner\">This run ended early; not every contact was attempted.</div>\n");
        }

        let _ = write!(
            html,
            "<div class=\"cards\">\n\
             <div class=\"card\"><div class=\"value\">{total}</div><div>Planned</div></div>\n\
             <div class=\"card ok\"><div class=\"value\">{sent}</div><div>Sent</div></div>\n\
             <div class=\"card bad\"><div class=\"value\">{failed}</div><div>Failed</div></div>\n\
             <div class=\"card\"><div class=\"value\">{rate:.1}%</div><div>Success rate</div></div>\n\
             </div>\n",
            total = summary.total,
            sent = summary.sent,
            failed = summary.failed,
            rate = summary.success_rate,
        );

        if !summary.failures.is_empty() {
            html.push_str(
                "<h2>Failures</h2>\n<table>\n<tr><th>Recipient</th><th>Attempts</th>\
                 <th>Class</th><th>Detail</th></tr>\n",
            );
            for failure in &summary.failures {
                let recipient = failure.display_name.as_ref().map_or_else(
                    || failure.email.clone(),
                    |name| format!("{name} <{}>", failure.email),
                );
                let _ = write!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    escape(&recipient),
                    failure.attempts,
                    failure.kind.label(),
                    escape(&failure.detail),
                );
            }
            html.push_str("</table>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }

    fn report_path(&self, finished_at: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!(
            "campaign_report_{}.html",
            finished_at.format("%Y%m%d_%H%M%S")
        ))
    }
}

impl ReportSink for HtmlReportSink {
    fn publish(&self, summary: &CampaignSummary) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ReportError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.report_path(summary.finished_at);
        std::fs::write(&path, Self::render(summary)).map_err(|source| ReportError::Write {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), "report written");
        Ok(path)
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use outreach_common::address::Address;

    use super::*;
    use crate::provider::ProviderKind;
    use crate::run::SendOutcome;

    fn run(outcomes: Vec<SendOutcome>, aborted: bool) -> CampaignRun {
        CampaignRun {
            provider: ProviderKind::MailerSend,
            total_contacts: outcomes.len(),
            batches_planned: 1,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcomes,
            aborted,
        }
    }

    fn address(raw: &str) -> Address {
        Address::parse(raw).unwrap()
    }

    #[test]
    fn test_summary_counts_and_rate() {
        let run = run(
            vec![
                SendOutcome::accepted(address("a@example.com"), None, 1, "id-1".to_string()),
                SendOutcome::accepted(address("b@example.com"), None, 2, "id-2".to_string()),
                SendOutcome::failed(
                    address("c@example.com"),
                    Some("Carol Chen".to_string()),
                    3,
                    ErrorKind::Transient,
                    "rate limited".to_string(),
                ),
                SendOutcome::failed(
                    address("d@example.com"),
                    None,
                    1,
                    ErrorKind::Permanent,
                    "550 no such user".to_string(),
                ),
            ],
            false,
        );

        let summary = summarize(&run, "August launch");
        assert_eq!(summary.total, 4);
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.transient_failures, 1);
        assert_eq!(summary.permanent_failures, 1);
        assert!((summary.success_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.failures[0].email, "c@example.com");
    }

    #[test]
    fn test_empty_run_has_zero_rate() {
        let summary = summarize(&run(Vec::new(), false), "Empty");
        assert_eq!(summary.total, 0);
        assert!((summary.success_rate - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_html_report_written_under_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = HtmlReportSink::new(dir.path());

        let run = run(
            vec![
                SendOutcome::accepted(address("a@example.com"), None, 1, "id-1".to_string()),
                SendOutcome::failed(
                    address("b@example.com"),
                    Some("Bo <script>".to_string()),
                    1,
                    ErrorKind::Permanent,
                    "rejected".to_string(),
                ),
            ],
            false,
        );
        let summary = summarize(&run, "Launch & follow-up");
        let path = sink.publish(&summary).unwrap();

        assert!(path.starts_with(dir.path()));
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("Launch &amp; follow-up"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("50.0%"));
        assert!(html.contains("rejected"));
        assert!(!html.contains("This run ended early"));
    }

    #[test]
    fn test_aborted_run_carries_banner() {
        let run = run(
            vec![SendOutcome::failed(
                address("a@example.com"),
                None,
                0,
                ErrorKind::Aborted,
                "cancelled".to_string(),
            )],
            true,
        );
        let summary = summarize(&run, "Interrupted");
        assert!(summary.aborted);
        assert_eq!(summary.aborted_contacts, 1);
        assert!(HtmlReportSink::render(&summary).contains("ended early"));
    }
}
