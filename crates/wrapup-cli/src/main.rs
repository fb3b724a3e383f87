mod display;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wrapup_core::{
    ChangeNotification, LayoutHook, NotificationSink, PanelConfig, PanelKind, PanelVariant,
    RecordId, RefreshMode, RelevantFieldSet, Severity, UnsetPolicy, color_for, is_relevant,
    style_for,
};
use wrapup_host::{Collaborators, PanelView, RefreshDriver};
use wrapup_sync::RecordClient;

#[derive(Parser)]
#[command(name = "wrapup", version, about = "Wrap-up panel core: colors, change filtering, live panels")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the border color for a confidence score (0.0-1.0, or `none`)
    Color {
        confidence: String,
        /// Color used when the score is absent
        #[arg(long, value_enum, default_value_t = Policy::Neutral)]
        policy: Policy,
    },
    /// Check whether a change message should refresh a record
    Relevance {
        /// Record the panel is showing
        #[arg(long)]
        record_id: String,
        #[arg(long, value_enum, default_value_t = Variant::VoiceCall)]
        variant: Variant,
        /// Comma-separated relevant fields (defaults to the variant's fields)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// JSON change message file, or `-` for stdin
        #[arg(long, default_value = "-")]
        message: String,
    },
    /// Mount a live panel against a backend and drive it from stdin
    Watch {
        /// Backend base URL
        #[arg(long, env = "WRAPUP_BASE_URL")]
        base_url: String,
        #[arg(long)]
        record_id: String,
        #[arg(long, value_enum, default_value_t = Variant::VoiceCall)]
        variant: Variant,
        /// Panel config file (JSON)
        #[arg(long, env = "WRAPUP_CONFIG")]
        config: Option<PathBuf>,
        /// Poll the record every N ms instead of following the change feed
        #[arg(long)]
        poll_ms: Option<u64>,
        /// Override the debounce delay in ms
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    Neutral,
    Maximal,
}

impl From<Policy> for UnsetPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Neutral => UnsetPolicy::Neutral,
            Policy::Maximal => UnsetPolicy::Maximal,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Variant {
    VoiceCall,
    Experience,
}

impl From<Variant> for PanelVariant {
    fn from(variant: Variant) -> Self {
        PanelVariant::for_kind(match variant {
            Variant::VoiceCall => PanelKind::VoiceCall,
            Variant::Experience => PanelKind::Experience,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Color { confidence, policy } => cmd_color(&confidence, policy.into()),
        Command::Relevance {
            record_id,
            variant,
            fields,
            message,
        } => cmd_relevance(&record_id, variant.into(), fields, &message),
        Command::Watch {
            base_url,
            record_id,
            variant,
            config,
            poll_ms,
            debounce_ms,
        } => {
            let mut config = match &config {
                Some(path) => PanelConfig::from_path(path)
                    .with_context(|| format!("loading panel config {}", path.display()))?,
                None => PanelConfig::default(),
            };
            if let Some(interval_ms) = poll_ms {
                config.refresh = RefreshMode::Poll { interval_ms };
            }
            if let Some(ms) = debounce_ms {
                config.debounce_ms = ms;
            }
            config.validate().context("invalid panel config")?;
            cmd_watch(base_url, RecordId::new(record_id), variant.into(), config).await
        }
    }
}

// ── color ──

fn parse_confidence(raw: &str) -> anyhow::Result<Option<f64>> {
    match raw.trim() {
        "" | "none" | "null" => Ok(None),
        value => {
            let score: f64 = value
                .parse()
                .with_context(|| format!("not a confidence score: {value}"))?;
            Ok(Some(score))
        }
    }
}

fn cmd_color(raw: &str, policy: UnsetPolicy) -> anyhow::Result<()> {
    let confidence = parse_confidence(raw)?;
    display::print_row("color", color_for(confidence, policy));
    display::print_row("style", style_for(confidence, policy));
    Ok(())
}

// ── relevance ──

fn read_message(source: &str) -> anyhow::Result<serde_json::Value> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading change message from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading {source}"))?
    };
    serde_json::from_str(&raw).context("change message is not valid JSON")
}

fn cmd_relevance(
    record_id: &str,
    variant: PanelVariant,
    fields: Vec<String>,
    source: &str,
) -> anyhow::Result<()> {
    let message = read_message(source)?;
    let Some(notification) = ChangeNotification::from_message(&message) else {
        bail!("not a change message: no change event header");
    };
    let relevant = if fields.is_empty() {
        RelevantFieldSet::from(variant.relevant_fields())
    } else {
        RelevantFieldSet::new(fields)
    };
    let record_id = RecordId::new(record_id);

    display::print_row("record ids", notification.record_ids.join(", "));
    let changed = if notification.changed_fields.is_empty() {
        "(not listed)".to_string()
    } else {
        notification.changed_fields.join(", ")
    };
    display::print_row("changed fields", changed);
    display::print_row("relevant fields", relevant.len());
    display::print_row("relevant", is_relevant(&notification, &record_id, &relevant));
    Ok(())
}

// ── watch ──

/// Prints toasts as they arrive.
struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        display::print_toast(title, message, severity);
    }
}

/// Wakes the printer task; the card is redrawn on every layout pass.
struct Redraw(Arc<Notify>);

impl LayoutHook for Redraw {
    fn relayout(&self) {
        self.0.notify_one();
    }
}

#[derive(Debug, PartialEq)]
enum PanelCommand {
    Edit(String),
    Blur,
    Select(u8),
    Refresh,
    Show,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<PanelCommand, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    match verb {
        "edit" => Ok(PanelCommand::Edit(rest.trim().to_string())),
        "blur" | "save" => Ok(PanelCommand::Blur),
        "select" => rest
            .trim()
            .parse()
            .map(PanelCommand::Select)
            .map_err(|_| format!("select needs a slot number, got {:?}", rest.trim())),
        "refresh" => Ok(PanelCommand::Refresh),
        "show" | "" => Ok(PanelCommand::Show),
        "help" | "?" => Ok(PanelCommand::Help),
        "quit" | "exit" => Ok(PanelCommand::Quit),
        other => Err(format!("unknown command: {other}")),
    }
}

async fn cmd_watch(
    base_url: String,
    record_id: RecordId,
    variant: PanelVariant,
    config: PanelConfig,
) -> anyhow::Result<()> {
    info!(base_url = %base_url, record_id = %record_id, kind = %variant.kind, "wrapup v{}", env!("CARGO_PKG_VERSION"));

    let client = Arc::new(RecordClient::new(base_url));
    let redraw = Arc::new(Notify::new());
    let view = Arc::new(PanelView::new(
        record_id,
        variant,
        &config,
        Collaborators {
            store: client.clone(),
            remote: client.clone(),
            sink: Arc::new(ConsoleSink),
            layout: Arc::new(Redraw(redraw.clone())),
        },
    ));

    if let Err(err) = view.mount().await {
        warn!(error = %err, "initial load failed, waiting for changes");
    }
    let driver = RefreshDriver::start(view.clone(), client.as_ref(), &config)
        .await
        .context("starting refresh")?;

    let tolerance = config.scroll_tolerance_px;
    let printer = {
        let view = view.clone();
        tokio::spawn(async move {
            loop {
                redraw.notified().await;
                display::print_panel(&view.snapshot(), tolerance);
            }
        })
    };

    display::print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        match parse_command(&line) {
            Ok(PanelCommand::Edit(text)) => view.on_summary_input(text),
            Ok(PanelCommand::Blur) => {
                if view.on_summary_blur().await.is_none() {
                    println!("  nothing to save");
                }
            }
            Ok(PanelCommand::Select(slot)) => {
                let outcome = view.select_wrap_up(slot).await;
                info!(slot, outcome = ?outcome, "wrap-up selection finished");
            }
            Ok(PanelCommand::Refresh) => {
                // Failures are already shown as a toast.
                let _ = view.refresh().await;
                display::print_panel(&view.snapshot(), tolerance);
            }
            Ok(PanelCommand::Show) => display::print_panel(&view.snapshot(), tolerance),
            Ok(PanelCommand::Help) => display::print_help(),
            Ok(PanelCommand::Quit) => break,
            Err(msg) => println!("  {msg}"),
        }
    }

    // Leaving the panel counts as a blur: flush the pending edit first.
    view.on_summary_blur().await;
    driver.dispose();
    view.dispose();
    printer.abort();
    info!("panel closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_confidence_arguments() {
        assert_eq!(parse_confidence("0.42").unwrap(), Some(0.42));
        assert_eq!(parse_confidence("none").unwrap(), None);
        assert_eq!(parse_confidence(" ").unwrap(), None);
        assert!(parse_confidence("high").is_err());
    }

    #[test]
    fn parses_panel_commands() {
        assert_eq!(
            parse_command("edit Customer disputed a charge").unwrap(),
            PanelCommand::Edit("Customer disputed a charge".into())
        );
        assert_eq!(parse_command("select 2").unwrap(), PanelCommand::Select(2));
        assert_eq!(parse_command("  blur ").unwrap(), PanelCommand::Blur);
        assert_eq!(parse_command("").unwrap(), PanelCommand::Show);
        assert_eq!(parse_command("quit").unwrap(), PanelCommand::Quit);
        assert!(parse_command("select two").is_err());
        assert!(parse_command("launch").is_err());
    }

    #[test]
    fn cli_variants_map_to_panel_variants() {
        assert_eq!(PanelVariant::from(Variant::VoiceCall), PanelVariant::VOICE_CALL);
        assert_eq!(PanelVariant::from(Variant::Experience), PanelVariant::EXPERIENCE);
        assert_eq!(UnsetPolicy::from(Policy::Maximal), UnsetPolicy::Maximal);
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
