//! One campaign from contact file to published report.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::Context as _;
use outreach_common::{
    config::Config,
    loader::{self, JsonRecords, LoaderOptions},
    template::CompiledTemplate,
};
use outreach_delivery::{
    Authenticator, DispatchOptions, Dispatcher, HtmlReportSink, ProviderKind, ReportSink,
    CampaignSummary, summarize,
};
use tracing::{info, warn};

/// How the run ended.
#[derive(Debug)]
pub enum CampaignOutcome {
    /// The operator declined; nothing was sent.
    Cancelled,
    /// Dispatch ran; the report says how it went.
    Completed {
        summary: CampaignSummary,
        report_path: PathBuf,
    },
}

/// Run one campaign end to end: load contacts, compile the template,
/// authenticate a provider, ask the operator, dispatch, and publish the
/// report.
///
/// # Errors
/// Fails before any send on unreadable input, a broken template, or when no
/// provider can be authenticated. Per-contact send failures do not fail the
/// run; they land in the report.
pub async fn execute(
    config: &Config,
    contacts_path: &Path,
    explicit_provider: Option<ProviderKind>,
    cancel: &AtomicBool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> anyhow::Result<CampaignOutcome> {
    let records = JsonRecords::from_path(contacts_path)
        .with_context(|| format!("loading contacts from {}", contacts_path.display()))?;
    let options = LoaderOptions {
        email_columns: config.campaign.email_columns.clone(),
        name_columns: config.campaign.name_columns.clone(),
        default_first_name: config.campaign.default_first_name.clone(),
    };
    let (contacts, load_errors) = loader::load(records.into_records(), &options);
    info!(
        contacts = contacts.len(),
        rejected = load_errors.len(),
        "contacts loaded"
    );

    let (html, text) = config.template.resolve_bodies()?;
    let template = CompiledTemplate::compile(&config.template.subject, &html, &text)
        .context("compiling campaign template")?;

    // The gate comes before any provider is touched; declining must leave no
    // trace of the run, not even an authentication attempt.
    let request = crate::approval::ApprovalRequest {
        contacts: &contacts,
        rejected: load_errors.len(),
        subject: &config.template.subject,
        sender: &config.sender.email,
    };
    if !crate::approval::request_approval(input, output, &request)? {
        info!("campaign cancelled by operator");
        return Ok(CampaignOutcome::Cancelled);
    }

    let preferred: Vec<ProviderKind> = config
        .providers
        .preferred
        .iter()
        .filter_map(|name| {
            let kind = ProviderKind::from_name(name);
            if kind.is_none() {
                warn!(name, "unknown provider in preferred order, ignoring");
            }
            kind
        })
        .collect();

    let provider = Authenticator::from_config(config)
        .select_and_authenticate(explicit_provider, &preferred)
        .await?;

    let dispatcher = Dispatcher::new(provider, DispatchOptions::from_campaign(&config.campaign));
    let run = dispatcher.dispatch(&contacts, &template, cancel).await;

    let summary = summarize(&run, config.report.title.clone());
    let report_path = HtmlReportSink::new(config.report.dir.clone()).publish(&summary)?;
    writeln!(
        output,
        "Sent {} of {} ({:.1}% success). Report: {}",
        summary.sent,
        summary.total,
        summary.success_rate,
        report_path.display()
    )?;

    Ok(CampaignOutcome::Completed {
        summary,
        report_path,
    })
}
