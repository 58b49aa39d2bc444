mod app;
mod error;

use crate::app::App;
use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand, ValueEnum};
use exn::ResultExt;
use kiosk_config::Config;
use kiosk_engine::error::describe;
use kiosk_engine::{SyncOutcome, SyncReport};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str =
    "warn,kiosk=info,kiosk_engine=info,kiosk_cache=info,kiosk_pool=info,kiosk_archive=info,kiosk_storage=info";

#[derive(Debug, Parser)]
#[command(name = "kiosk", version, about)]
struct Cli {
    /// Config file (TOML, YAML or JSON). Defaults to `kiosk.toml` in the
    /// platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch every dataset's manifest and install content that is stale.
    Sync {
        /// Ignore cached manifests.
        #[arg(long)]
        refresh: bool,
    },
    /// Print an item by hash.
    Item { dataset: String, hash: u32 },
    /// Search items by name.
    Search { dataset: String, term: String },
    /// Print a vendor's icon URL.
    VendorIcon { dataset: String, hash: u32 },
    /// Print up to COUNT random grimoire cards.
    Grimoire { dataset: String, count: usize },
    /// Print the kind of a weapon.
    WeaponCategory { dataset: String, hash: u32 },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    // Logs go to stderr; stdout carries command output.
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(std::io::stderr)).init(),
    }
}

fn print(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).or_raise(|| ErrorKind::Output)?;
    println!("{text}");
    Ok(())
}

fn report(reports: &[SyncReport]) -> Value {
    let entries: Vec<Value> = reports
        .iter()
        .map(|report| match &report.outcome {
            Ok(outcome) => json!({
                "dataset": report.dataset,
                "status": match outcome {
                    SyncOutcome::Current(_) => "current",
                    SyncOutcome::Updated(_) => "updated",
                },
                "version": outcome.manifest().version,
            }),
            Err(err) => json!({
                "dataset": report.dataset,
                "status": "failed",
                "error": describe(err),
                "retryable": err.is_retryable(),
            }),
        })
        .collect();
    Value::Array(entries)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let mut app = App::new(config)?;
    let result = execute(&mut app, cli.command).await;
    app.shutdown().await;
    result
}

async fn execute(app: &mut App, command: Command) -> Result<ExitCode> {
    match command {
        Command::Sync { refresh } => {
            let reports = app.sync(refresh).await?;
            print(&report(&reports))?;
            let failed = reports.iter().any(|report| report.outcome.is_err());
            return Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS });
        },
        Command::Item { dataset, hash } => {
            let item = app.dataset(&dataset).await?.get_item_by_hash(hash).await.or_raise(|| ErrorKind::Lookup)?;
            print(&item.as_deref())?;
        },
        Command::Search { dataset, term } => {
            let matches = app.dataset(&dataset).await?.get_item_by_name(&term).await.or_raise(|| ErrorKind::Lookup)?;
            print(&matches)?;
        },
        Command::VendorIcon { dataset, hash } => {
            let icon = app.dataset(&dataset).await?.get_vendor_icon(hash).await.or_raise(|| ErrorKind::Lookup)?;
            print(&icon)?;
        },
        Command::Grimoire { dataset, count } => {
            let cards = app.dataset(&dataset).await?.get_grimoire_cards(count).await.or_raise(|| ErrorKind::Lookup)?;
            print(&cards.iter().map(|card| card.as_ref()).collect::<Vec<&Value>>())?;
        },
        Command::WeaponCategory { dataset, hash } => {
            let category =
                app.dataset(&dataset).await?.get_weapon_category(hash).await.or_raise(|| ErrorKind::Lookup)?;
            print(&category)?;
        },
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = ?err, "kiosk failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        },
    }
}
