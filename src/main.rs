use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use download_insights::commands::{insight_commands, monitor_commands, settings_commands};
use download_insights::logging;
use download_insights::models::insight::InsightRecord;
use download_insights::paths::{self, HOME_ENV};
use download_insights::services::config_service::JsonConfigStore;
use download_insights::services::insight_service::format_bytes;
use download_insights::state::AppState;

const UI_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(
    name = "download-insights",
    version,
    about = "Sorts finished downloads into per-site folders and logs every move"
)]
struct Cli {
    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory for settings and the analytics store.
    #[arg(long, env = HOME_ENV, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the monitored folder until Ctrl-C.
    Watch {
        /// Save this folder as the monitored folder first.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Print logged events, oldest first.
    History {
        /// Only the most recent N events.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Per-domain totals, optionally within an inclusive date range.
    Summary {
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Write the event log as CSV.
    Export { destination: PathBuf },
    /// Inspect or change saved settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    SetFolder { folder: PathBuf },
    SetHistory { path: PathBuf },
    DetectHistory,
    ClearHistory,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let (home, config_store) = match cli.home {
        Some(home) => {
            let store = JsonConfigStore::new(home.join("config.json"));
            (home, store)
        }
        None => (
            paths::app_home().context("Failed to resolve data directory")?,
            JsonConfigStore::platform_default().context("Failed to resolve config file")?,
        ),
    };
    let state = AppState::new(home, Arc::new(config_store)).context("Failed to load settings")?;

    match cli.command {
        Command::Watch { folder } => watch(&state, folder),
        Command::History { limit, json } => history(&state, limit, json),
        Command::Summary { from, to, json } => summary(&state, from, to, json),
        Command::Export { destination } => {
            let rows = insight_commands::export_history(&state, &destination)
                .with_context(|| format!("Failed to export to {}", destination.display()))?;
            println!("Exported {rows} record(s) to {}", destination.display());
            Ok(())
        }
        Command::Config { action } => config(&state, action),
    }
}

fn watch(state: &AppState, folder: Option<PathBuf>) -> Result<()> {
    if let Some(folder) = folder {
        settings_commands::set_monitored_folder(state, &folder)?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .context("Failed to install Ctrl-C handler")?;

    let folder = monitor_commands::start_monitor(state).context("Failed to start monitoring")?;
    println!("Watching {}. Press Ctrl-C to stop.", folder.display());

    let mut last_seen = insight_commands::get_latest_id(state).unwrap_or(0);
    while running.load(Ordering::SeqCst) {
        for message in state.messages.drain() {
            println!("{message}");
        }

        let (records, latest) = insight_commands::poll_new_records(state, last_seen);
        for record in &records {
            print_record(record);
        }
        last_seen = latest;

        if !state.is_monitoring() {
            tracing::warn!("monitor exited on its own");
            break;
        }
        std::thread::sleep(UI_POLL_INTERVAL);
    }

    monitor_commands::stop_monitor(state);
    for message in state.messages.drain() {
        println!("{message}");
    }
    Ok(())
}

fn print_record(record: &InsightRecord) {
    let size = record
        .file_size
        .and_then(|s| u64::try_from(s).ok())
        .map(format_bytes)
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:>5}  {}  {:<6} {:<18} {:>10}  dup:{:<3}  {}",
        record.id,
        record.timestamp,
        record.event.to_string(),
        record.domain,
        size,
        record.duplicate_label(),
        record.file_path
    );
}

fn history(state: &AppState, limit: Option<usize>, json: bool) -> Result<()> {
    let mut records = insight_commands::get_history(state)?;
    if let Some(limit) = limit {
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No downloads logged yet.");
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn summary(
    state: &AppState,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    let summary = insight_commands::get_summary(state, from, to)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!(
        "{} file(s), {}, {} duplicate(s)",
        summary.total_files,
        format_bytes(summary.total_bytes),
        summary.total_duplicates
    );
    for (domain, totals) in &summary.by_domain {
        println!(
            "  {domain:<18} {:>5} file(s) {:>10} {:>4} dup",
            totals.count,
            format_bytes(totals.bytes),
            totals.duplicates
        );
    }
    Ok(())
}

fn config(state: &AppState, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = settings_commands::show_config(state);
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::SetFolder { folder } => {
            let saved = settings_commands::set_monitored_folder(state, &folder)?;
            println!("Monitored folder set to {}", saved.display());
        }
        ConfigAction::SetHistory { path } => {
            let saved = settings_commands::set_history_path(state, &path)?;
            println!("History database set to {}", saved.display());
        }
        ConfigAction::DetectHistory => match settings_commands::detect_history_path(state)? {
            Some(found) => println!("Found history database at {}", found.display()),
            None => println!("No history database found."),
        },
        ConfigAction::ClearHistory => {
            settings_commands::clear_history_path(state)?;
            println!("Saved history path cleared.");
        }
    }
    Ok(())
}
