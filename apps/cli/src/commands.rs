//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use url::Url;

use clipvault_catalog::{CatalogStore, GitRemote, SaveOutcome};
use clipvault_core::{
    Action, ChatStatus, Orchestrator, Outcome, RunReport, StatusMessage, StatusReporter,
    TriggerSurface,
};
use clipvault_feed::{FeedScanner, ScanOptions};
use clipvault_media::{
    DownloadOptions, Downloader, PublicListResolver, SegmentOptions, Segmenter,
};
use clipvault_shared::{AppConfig, PipelineConfig, init_config, load_config, secret_from_env};
use clipvault_sink::HttpSink;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Clipvault — archive a content feed into chunked sink uploads.
#[derive(Parser)]
#[command(
    name = "clipvault",
    version,
    about = "Watch a content feed, chunk new items, and upload them to a sink.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Operator identity for authorized actions.
    #[arg(long, global = true, env = "CLIPVAULT_OPERATOR")]
    pub operator: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// List feed items not yet in the catalog.
    Pending,

    /// Process one pending item by its feed id.
    Process {
        /// External item id, as shown by `pending`.
        id: String,
    },

    /// Process the oldest pending item, if any (for scheduled runs).
    Auto,

    /// Show whether a job is running and in which stage.
    Status,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Tracing targets of the binary and every library crate; a bare
/// `clipvault=` directive would match only the binary.
const LOG_TARGETS: [&str; 7] = [
    "clipvault",
    "clipvault_core",
    "clipvault_feed",
    "clipvault_media",
    "clipvault_sink",
    "clipvault_catalog",
    "clipvault_shared",
];

fn filter_directives(verbose: u8) -> String {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    LOG_TARGETS.map(|target| format!("{target}={level}")).join(",")
}

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(cli.verbose)));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let operator = cli.operator;
    match cli.command {
        Command::Pending => cmd_pending(operator.as_deref()).await,
        Command::Process { id } => cmd_process(operator.as_deref(), &id).await,
        Command::Auto => cmd_auto().await,
        Command::Status => cmd_status().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Assemble the trigger surface from the loaded config.
fn build_surface(config: &AppConfig, interactive: bool) -> Result<TriggerSurface> {
    if config.feed.channel_id.is_empty() && config.feed.url.is_empty() {
        return Err(eyre!(
            "no feed configured: set [feed] channel_id or url in the config file"
        ));
    }

    let feed_url = config.feed.feed_url();
    Url::parse(&feed_url).map_err(|e| eyre!("invalid feed URL '{feed_url}': {e}"))?;
    if !config.sink.endpoint.is_empty() {
        Url::parse(&config.sink.endpoint)
            .map_err(|e| eyre!("invalid sink endpoint '{}': {e}", config.sink.endpoint))?;
    }

    let scanner = Arc::new(FeedScanner::new(feed_url, &ScanOptions::default())?);

    let mut downloader = Downloader::new(DownloadOptions::from(&config.download));
    if config.proxy.enabled {
        downloader = downloader.with_resolver(Arc::new(PublicListResolver::new(&config.proxy)?));
    }

    let segmenter = Segmenter::new(SegmentOptions::from(&config.segment));

    let sink_token = secret_from_env(&config.sink.token_env).unwrap_or_else(|e| {
        warn!(error = %e, "sink token unavailable; uploads will be rejected");
        String::new()
    });
    let sink = HttpSink::new(&config.sink.endpoint, &config.sink.chat, sink_token)?;

    let catalog_token = secret_from_env(&config.catalog.token_env).ok();
    let remote = GitRemote::new(
        &config.catalog.remote_url,
        &config.catalog.checkout_dir,
        catalog_token,
    );
    let catalog = Arc::new(CatalogStore::new(remote, &config.catalog));

    let reporter: Arc<dyn StatusReporter> = if !config.observer.endpoint.is_empty() {
        let token = secret_from_env(&config.observer.token_env).unwrap_or_default();
        Arc::new(ChatStatus::new(
            &config.observer.endpoint,
            &config.observer.chat,
            token,
        ))
    } else if interactive {
        Arc::new(SpinnerStatus::new())
    } else {
        Arc::new(clipvault_core::LogStatus)
    };

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(downloader),
        Arc::new(segmenter),
        Arc::new(sink),
        catalog.clone(),
        reporter,
        PipelineConfig::from(config),
    ));

    Ok(TriggerSurface::new(
        scanner,
        catalog,
        orchestrator,
        config.operator.authorized_id.clone(),
        config.feed.preview_limit,
    ))
}

/// CLI invocations run as the configured operator unless overridden.
fn resolve_operator(flag: Option<&str>, config: &AppConfig) -> String {
    flag.map(String::from)
        .unwrap_or_else(|| config.operator.authorized_id.clone())
}

fn print_report(report: &RunReport) {
    println!();
    println!("  Item processed successfully!");
    println!("  ID:      {}", report.item.id);
    println!("  Title:   {}", report.item.title);
    println!("  Parts:   {}", report.parts);
    let catalog = match report.outcome {
        SaveOutcome::Pushed => "pushed to remote",
        SaveOutcome::Unchanged => "already recorded",
        SaveOutcome::LocalOnly => "recorded locally (push failed)",
    };
    println!("  Catalog: {catalog}");
    println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_pending(operator: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let surface = build_surface(&config, false)?;
    let operator = resolve_operator(operator, &config);

    let pending = match surface.handle(&operator, Action::ListPending).await? {
        Outcome::Pending(items) => items,
        other => return Err(eyre!("unexpected outcome: {other:?}")),
    };

    if pending.is_empty() {
        println!("No pending items.");
        return Ok(());
    }

    println!("Pending items (newest first):");
    for item in &pending {
        println!("  {}  {}", item.id, item.title);
    }
    Ok(())
}

async fn cmd_process(operator: Option<&str>, id: &str) -> Result<()> {
    let config = load_config()?;
    // Fail before any work when the upload token is missing.
    secret_from_env(&config.sink.token_env)?;

    let surface = build_surface(&config, true)?;
    let operator = resolve_operator(operator, &config);

    info!(item_id = id, "manual trigger");
    let report = match surface
        .handle(&operator, Action::ProcessItem(id.to_string()))
        .await?
    {
        Outcome::Completed(report) => report,
        other => return Err(eyre!("unexpected outcome: {other:?}")),
    };
    print_report(&report);
    Ok(())
}

async fn cmd_auto() -> Result<()> {
    let config = load_config()?;
    secret_from_env(&config.sink.token_env)?;

    let surface = build_surface(&config, false)?;

    match surface.trigger_automatic().await? {
        Some(report) => print_report(&report),
        None => println!("Nothing to do: catalog is up to date with the feed."),
    }
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let config = load_config()?;
    let surface = build_surface(&config, false)?;

    let status = surface.query_status();
    if status.busy {
        match status.stage {
            Some(stage) => println!("Busy: job in {stage} stage."),
            None => println!("Busy: job starting."),
        }
    } else {
        println!("Idle: no job running.");
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI status reporter
// ---------------------------------------------------------------------------

/// Renders job status into an indicatif spinner.
struct SpinnerStatus {
    spinner: ProgressBar,
}

impl SpinnerStatus {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

#[async_trait]
impl StatusReporter for SpinnerStatus {
    async fn open(&self, text: &str) -> Option<StatusMessage> {
        self.spinner.set_message(text.to_string());
        Some(StatusMessage {
            id: "spinner".into(),
        })
    }

    async fn render(&self, _message: &StatusMessage, text: &str) {
        // Spinner shows only the latest line; the full history is in the log.
        if let Some(last) = text.lines().next_back() {
            self.spinner.set_message(last.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_directives_cover_the_library_crates() {
        let filter = filter_directives(1);
        assert!(filter.contains("clipvault=debug"));
        assert!(filter.contains("clipvault_core=debug"));
        assert!(filter.contains("clipvault_feed=debug"));
        assert!(filter.contains("clipvault_catalog=debug"));
        assert_eq!(filter_directives(0).matches("=info").count(), LOG_TARGETS.len());
        assert!(filter_directives(3).contains("clipvault_media=trace"));
    }
}
