//! Command-line utility for operating cadence
//!
//! Runs engine operations directly against the configured store:
//! - one-off scheduler ticks
//! - enrolling, cancelling and unsubscribing recipients
//! - managing drip sequences and campaigns

#![allow(clippy::items_after_statements, clippy::single_match_else)]

use std::path::PathBuf;

use anyhow::Context as _;
use cadence::{Cadence, Runtime};
use cadence_common::{CampaignId, NewSequence, SequenceId, Trigger, logging};
use cadence_engine::{SequenceUpdate, SubscribeOutcome, UnsubscribeOutcome};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

/// Command-line utility for operating cadence
#[derive(Parser, Debug)]
#[command(name = "cadencectl")]
#[command(about = "Operate the cadence email engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the daemon's lookup order)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one scheduler pass now
    Tick,
    /// Enroll an address in every active sequence for a trigger
    Enroll {
        email: String,
        /// e.g. NEW_SUBSCRIBER, new-donor
        trigger: Trigger,
    },
    /// Cancel one enrollment
    Cancel {
        email: String,
        sequence_id: SequenceId,
    },
    /// Cancel every active enrollment for an address
    CancelAll { email: String },
    /// Subscribe an address to the newsletter
    Subscribe {
        email: String,
        /// Rate limiting key
        #[arg(long, default_value = "cadencectl")]
        client: String,
    },
    /// Unsubscribe using a subscriber's token
    Unsubscribe { token: String },
    /// Drip sequence management
    Sequence {
        #[command(subcommand)]
        action: SequenceAction,
    },
    /// Campaign management
    Campaign {
        #[command(subcommand)]
        action: CampaignAction,
    },
}

#[derive(Subcommand, Debug)]
enum SequenceAction {
    /// Create a sequence from a RON file
    Create { file: PathBuf },
    /// List all sequences
    List,
    /// List a sequence's enrollments, newest first
    Enrollments { id: SequenceId },
    /// Turn a sequence on or off
    SetActive {
        id: SequenceId,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CampaignAction {
    /// Create a draft campaign
    Create {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        html_file: PathBuf,
    },
    /// List all campaigns, newest first
    List,
    /// Show a campaign and its most recent sends
    Show { id: CampaignId },
    /// Send a campaign now
    Send { id: CampaignId },
    /// Schedule a campaign for later (RFC 3339 timestamp)
    Schedule { id: CampaignId, at: DateTime<Utc> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => cadence::config::find_config_file()?,
    };
    let cadence: Cadence = cadence::config::load(&config_path)?;
    let runtime = cadence.build().await?;

    match cli.command {
        Commands::Tick => cmd_tick(&runtime, cli.format).await,
        Commands::Enroll { email, trigger } => {
            let report = runtime.drip.enroll(&email, trigger).await?;
            output(cli.format, &report, || {
                format!("Enrolled {email} in {} sequence(s)", report.enrolled)
            })
        }
        Commands::Cancel { email, sequence_id } => {
            let cancelled = runtime.drip.cancel(&email, sequence_id).await?;
            output(cli.format, &cancelled, || {
                if cancelled {
                    format!("Cancelled {email} in {sequence_id}")
                } else {
                    format!("No active enrollment for {email} in {sequence_id}")
                }
            })
        }
        Commands::CancelAll { email } => {
            let cancelled = runtime.drip.cancel_all(&email).await?;
            output(cli.format, &cancelled, || {
                format!("Cancelled {cancelled} enrollment(s) for {email}")
            })
        }
        Commands::Subscribe { email, client } => {
            cmd_subscribe(&runtime, cli.format, &client, &email).await
        }
        Commands::Unsubscribe { token } => cmd_unsubscribe(&runtime, cli.format, &token).await,
        Commands::Sequence { action } => cmd_sequence(&runtime, cli.format, action).await,
        Commands::Campaign { action } => cmd_campaign(&runtime, cli.format, action).await,
    }
}

/// Print `value` as JSON, or the text rendering otherwise
fn output<T: Serialize>(
    format: Format,
    value: &T,
    text: impl FnOnce() -> String,
) -> anyhow::Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Text => println!("{}", text()),
    }
    Ok(())
}

async fn cmd_tick(runtime: &Runtime, format: Format) -> anyhow::Result<()> {
    let report = runtime
        .scheduler
        .tick(&runtime.drip, &runtime.campaigns)
        .await?;

    let campaigns: Vec<_> = report
        .campaigns
        .iter()
        .map(|(id, result)| serde_json::json!({ "id": id, "result": result.summary() }))
        .collect();
    let value = serde_json::json!({ "drip": report.drip, "campaigns": campaigns });

    output(format, &value, || {
        let drip = report.drip;
        let mut text = format!(
            "Drip: {} processed, {} sent, {} failed, {} completed",
            drip.processed, drip.sent, drip.failed, drip.completed
        );
        for (id, result) in &report.campaigns {
            let summary = result.summary();
            text.push_str(&format!(
                "\nCampaign {id}: {} sent, {} failed",
                summary.sent, summary.failed
            ));
        }
        text
    })
}

async fn cmd_subscribe(
    runtime: &Runtime,
    format: Format,
    client: &str,
    email: &str,
) -> anyhow::Result<()> {
    match runtime.subscriptions.subscribe(client, email).await? {
        SubscribeOutcome::RateLimited => anyhow::bail!("Too many requests for {client}"),
        SubscribeOutcome::Subscribed {
            subscriber,
            enrolled,
        } => {
            // Nothing else drains the queue in a one-shot invocation
            runtime.outbound.process_ready().await;

            output(format, &subscriber, || {
                format!(
                    "Subscribed {} (token {}), enrolled in {enrolled} sequence(s)",
                    subscriber.email, subscriber.unsubscribe_token
                )
            })
        }
    }
}

async fn cmd_unsubscribe(runtime: &Runtime, format: Format, token: &str) -> anyhow::Result<()> {
    let (status, cancelled) = match runtime.subscriptions.unsubscribe(token).await? {
        UnsubscribeOutcome::InvalidToken => anyhow::bail!("Invalid unsubscribe token"),
        UnsubscribeOutcome::AlreadyUnsubscribed => ("already_unsubscribed", 0),
        UnsubscribeOutcome::Unsubscribed { cancelled } => ("unsubscribed", cancelled),
    };

    let value = serde_json::json!({ "status": status, "cancelled": cancelled });
    output(format, &value, || match status {
        "unsubscribed" => format!("Unsubscribed, {cancelled} enrollment(s) cancelled"),
        _ => String::from("Already unsubscribed"),
    })
}

async fn cmd_sequence(
    runtime: &Runtime,
    format: Format,
    action: SequenceAction,
) -> anyhow::Result<()> {
    match action {
        SequenceAction::Create { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let new: NewSequence = ron::from_str(&content)
                .with_context(|| format!("Invalid sequence in {}", file.display()))?;

            let sequence = runtime.drip.create_sequence(new).await?;
            output(format, &sequence, || {
                format!("Created sequence {} ({})", sequence.id, sequence.name)
            })
        }
        SequenceAction::List => {
            let sequences = runtime.drip.sequences().await?;
            output(format, &sequences, || {
                let mut text = format!(
                    "{:<28} {:<20} {:<8} {:<6} NAME",
                    "ID", "TRIGGER", "ACTIVE", "STEPS"
                );
                for sequence in &sequences {
                    text.push_str(&format!(
                        "\n{:<28} {:<20} {:<8} {:<6} {}",
                        sequence.id.to_string(),
                        sequence.trigger.as_str(),
                        sequence.active,
                        sequence.step_count(),
                        sequence.name
                    ));
                }
                text
            })
        }
        SequenceAction::Enrollments { id } => {
            let enrollments = runtime.drip.enrollments(id).await?;
            output(format, &enrollments, || {
                let mut text = format!(
                    "{:<32} {:<10} {:<5} {:<26} ENROLLED",
                    "EMAIL", "STATUS", "STEP", "NEXT SEND"
                );
                for enrollment in &enrollments {
                    let next = enrollment
                        .next_send_at
                        .map_or_else(|| String::from("-"), |at| at.to_rfc3339());
                    text.push_str(&format!(
                        "\n{:<32} {:<10} {:<5} {:<26} {}",
                        enrollment.email,
                        enrollment.status.to_string(),
                        enrollment.current_step,
                        next,
                        enrollment.enrolled_at.to_rfc3339()
                    ));
                }
                text
            })
        }
        SequenceAction::SetActive { id, active } => {
            let sequence = runtime
                .drip
                .update_sequence(
                    id,
                    SequenceUpdate {
                        name: None,
                        active: Some(active),
                    },
                )
                .await?;
            output(format, &sequence, || {
                let state = if active { "active" } else { "inactive" };
                format!("Sequence {} is now {state}", sequence.id)
            })
        }
    }
}

async fn cmd_campaign(
    runtime: &Runtime,
    format: Format,
    action: CampaignAction,
) -> anyhow::Result<()> {
    match action {
        CampaignAction::Create { subject, html_file } => {
            let html = std::fs::read_to_string(&html_file)
                .with_context(|| format!("Failed to read {}", html_file.display()))?;

            let campaign = runtime.campaigns.create_campaign(subject, html).await?;
            output(format, &campaign, || format!("Created draft campaign {}", campaign.id))
        }
        CampaignAction::List => {
            let campaigns = runtime.campaigns.campaigns().await?;
            output(format, &campaigns, || {
                let mut text = format!(
                    "{:<28} {:<10} {:>6} {:>6} {:>6} SUBJECT",
                    "ID", "STATUS", "TOTAL", "SENT", "FAILED"
                );
                for campaign in &campaigns {
                    text.push_str(&format!(
                        "\n{:<28} {:<10} {:>6} {:>6} {:>6} {}",
                        campaign.id.to_string(),
                        campaign.status.to_string(),
                        campaign.total_recipients,
                        campaign.sent_count,
                        campaign.failed_count,
                        campaign.subject
                    ));
                }
                text
            })
        }
        CampaignAction::Show { id } => {
            let detail = runtime.campaigns.campaign_detail(id).await?;
            output(format, &detail, || {
                let campaign = &detail.campaign;
                let mut text = format!(
                    "Campaign: {}\nSubject: {}\nStatus: {}\nRecipients: {} ({} sent, {} failed)",
                    campaign.id,
                    campaign.subject,
                    campaign.status,
                    campaign.total_recipients,
                    campaign.sent_count,
                    campaign.failed_count
                );
                if let Some(at) = campaign.scheduled_at {
                    text.push_str(&format!("\nScheduled: {}", at.to_rfc3339()));
                }
                for record in &detail.recent_sends {
                    text.push_str(&format!(
                        "\n  {:<32} {:<7} {}",
                        record.recipient_email,
                        record.status.to_string(),
                        record.error_message.as_deref().unwrap_or("")
                    ));
                }
                text
            })
        }
        CampaignAction::Send { id } => {
            let summary = runtime.campaigns.send(id).await?.summary();
            output(format, &summary, || match &summary.error {
                Some(error) => format!("Not sent: {error}"),
                None => format!("Sent {}, failed {}", summary.sent, summary.failed),
            })?;

            if summary.success {
                Ok(())
            } else {
                std::process::exit(1)
            }
        }
        CampaignAction::Schedule { id, at } => {
            let campaign = runtime.campaigns.schedule(id, at).await?;
            output(format, &campaign, || {
                format!("Campaign {} scheduled for {}", campaign.id, at.to_rfc3339())
            })
        }
    }
}
