use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use outreach::campaign::{self, CampaignOutcome};
use outreach_common::{config::Config, logging};
use outreach_delivery::ProviderKind;
use tracing::warn;

/// Send a personalized email campaign to a contact list.
#[derive(Debug, Parser)]
#[command(name = "outreach", version, about)]
struct Cli {
    /// Path to the campaign configuration file.
    #[arg(short, long, default_value = "outreach.toml")]
    config: PathBuf,

    /// Path to the JSON contact file.
    #[arg(long)]
    contacts: PathBuf,

    /// Use this provider only, instead of the configured fallback chain.
    #[arg(long, value_parser = parse_provider)]
    provider: Option<ProviderKind>,
}

fn parse_provider(name: &str) -> Result<ProviderKind, String> {
    ProviderKind::from_name(name).ok_or_else(|| {
        format!(
            "unknown provider {name:?}; expected one of: {}",
            ProviderKind::ALL.map(|kind| kind.name()).join(", ")
        )
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config = Config::from_path(&cli.config)?;

    // First Ctrl-C finishes the in-flight contact and stops at the next
    // boundary; the dispatcher settles the rest as aborted.
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current contact");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let mut input = std::io::stdin().lock();
    let mut output = std::io::stdout().lock();

    match campaign::execute(
        &config,
        &cli.contacts,
        cli.provider,
        &cancel,
        &mut input,
        &mut output,
    )
    .await?
    {
        CampaignOutcome::Cancelled => {
            writeln!(output, "Cancelled; nothing was sent.")?;
        }
        CampaignOutcome::Completed { summary, .. } => {
            if summary.aborted {
                writeln!(output, "Run ended early; see the report for details.")?;
            }
        }
    }

    Ok(())
}
