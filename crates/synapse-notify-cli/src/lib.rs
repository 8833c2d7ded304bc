//! Command-line front end for SynapseNotify.
//!
//! Agents call `synapsenotify check <AGENT>` at session start; the remaining
//! commands manage alerts and the tool-request log by hand.

#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use synapse_notify_core::{Alert, Config, Priority};
use synapse_notify_storage::{
    AlertQuery, AlertStore, Bell, TerminalBell, ToolRequestScanner, ingest_file,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error(transparent)]
    Core(#[from] synapse_notify_core::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(
    name = "synapsenotify",
    version,
    about = "Push notifications for AI agents"
)]
pub struct Cli {
    /// Directory holding the per-agent alert files. Overrides
    /// `SYNAPSE_NOTIFY_ALERTS_DIR`.
    #[arg(long, global = true)]
    pub alerts_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the session-start report for an agent.
    Check {
        agent: String,
        /// Don't ring the terminal bell.
        #[arg(long, default_value_t = false)]
        no_bell: bool,
    },
    /// Print the number of unread alerts.
    Count { agent: String },
    /// List alerts.
    List {
        agent: String,
        /// Include alerts already read.
        #[arg(long, default_value_t = false)]
        all: bool,
        #[arg(long)]
        priority: Option<String>,
        /// Order by priority instead of arrival.
        #[arg(long, default_value_t = false)]
        grouped: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Mark one alert, or all of them, as read.
    Read { agent: String, id: Option<String> },
    /// Delete alerts.
    Clear {
        agent: String,
        /// Only delete alerts that were already read.
        #[arg(long, default_value_t = false)]
        keep: bool,
    },
    /// Create alerts from a Synapse message file.
    Alert { file: PathBuf },
    /// Show every agent with unread alerts.
    Status,
    /// Ring the terminal bell.
    Bell,
    /// Copy TOOL_REQUEST_*.json messages into the master log.
    #[command(name = "sync-requests")]
    SyncRequests,
    /// Show tool requests still waiting for an owner.
    #[command(name = "pending-requests")]
    PendingRequests,
}

pub fn run() -> i32 {
    init_tracing();
    let cli = Cli::parse();
    match execute(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

/// Logs go to stderr so stdout stays clean for reports and `--json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Resolve the effective config: environment first, then flags.
pub fn load_config(alerts_dir: Option<PathBuf>) -> Config {
    let config = Config::from_env();
    match alerts_dir {
        Some(dir) => config.with_alerts_dir(dir),
        None => config,
    }
}

pub fn execute(cli: Cli) -> CliResult<()> {
    let config = load_config(cli.alerts_dir);
    tracing::debug!(alerts_dir = %config.alerts_dir.display(), "resolved config");
    let store = AlertStore::new(config);

    match cli.command {
        Commands::Check { agent, no_bell } => {
            println!("{}", store.check_and_report(&agent, !no_bell)?);
        }
        Commands::Count { agent } => println!("{}", store.count(&agent)?),
        Commands::List {
            agent,
            all,
            priority,
            grouped,
            json,
        } => handle_list(&store, &agent, all, priority.as_deref(), grouped, json)?,
        Commands::Read { agent, id } => {
            let marked = store.mark_read(&agent, id.as_deref())?;
            let agent = store.normalize(&agent)?;
            if marked == 0 {
                println!("No alerts to mark as read for {agent}");
            } else {
                println!("[OK] Marked {marked} alert(s) as read for {agent}");
            }
        }
        Commands::Clear { agent, keep } => {
            let removed = store.clear(&agent, keep)?;
            let agent = store.normalize(&agent)?;
            if removed == 0 {
                println!("No alerts to clear for {agent}");
            } else {
                println!("[OK] Cleared {removed} alert(s) for {agent}");
            }
        }
        Commands::Alert { file } => {
            if !file.exists() {
                return Err(CliError::NotFound(file));
            }
            let report = ingest_file(&store, &file)?;
            let name = file
                .file_name()
                .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned());
            println!(
                "[OK] Created {} alert(s) from {name} ({} already present)",
                report.created, report.duplicates
            );
        }
        Commands::Status => handle_status(&store)?,
        Commands::Bell => {
            println!("Testing terminal bell...");
            TerminalBell.ring();
            println!("[OK] Bell triggered (did you hear it?)");
        }
        Commands::SyncRequests => {
            let added = ToolRequestScanner::new(store.config()).scan_and_sync()?;
            if added > 0 {
                println!("[!] {added} new tool request(s) added to master log");
            } else {
                println!("[OK] All Synapse tool requests already in master log");
            }
        }
        Commands::PendingRequests => handle_pending_requests(&store)?,
    }
    Ok(())
}

fn handle_list(
    store: &AlertStore,
    agent: &str,
    all: bool,
    priority: Option<&str>,
    grouped: bool,
    json: bool,
) -> CliResult<()> {
    let agent = store.normalize(agent)?;
    let mut query = if all {
        AlertQuery::all()
    } else {
        AlertQuery::unread()
    };
    if let Some(p) = priority {
        query = query.with_priority(p.parse::<Priority>()?);
    }
    if grouped {
        query = query.grouped();
    }
    let alerts = store.query(&agent, &query)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }
    let qualifier = if all { "" } else { "unread " };
    if alerts.is_empty() {
        println!("No {qualifier}alerts for {agent}");
        return Ok(());
    }
    println!("{} {qualifier}alert(s) for {agent}:\n", alerts.len());
    for alert in &alerts {
        print!("{}", format_alert(alert));
    }
    Ok(())
}

fn format_alert(alert: &Alert) -> String {
    let status = if alert.read { "[READ]" } else { "[NEW]" };
    format!(
        "  {status} [{}] From {}: {}\n       ID: {} | {}\n       File: {}\n\n",
        alert.priority, alert.from_agent, alert.subject, alert.id, alert.timestamp, alert.source_file
    )
}

fn handle_status(store: &AlertStore) -> CliResult<()> {
    let status = store.status_all()?;
    if status.is_empty() {
        println!("[OK] No pending alerts for any agent");
        return Ok(());
    }
    let mut rows: Vec<(String, usize)> = status.into_iter().collect();
    // Busiest first; BTreeMap order breaks ties by name.
    rows.sort_by(|a, b| b.1.cmp(&a.1));
    println!("Agents with pending alerts:\n");
    for (agent, unread) in rows {
        println!("  {agent}: {unread} unread");
    }
    Ok(())
}

fn handle_pending_requests(store: &AlertStore) -> CliResult<()> {
    let pending = ToolRequestScanner::new(store.config()).pending_requests()?;
    if pending.is_empty() {
        println!("[OK] No pending tool requests");
        return Ok(());
    }
    println!("[!] {} PENDING TOOL REQUEST(S):\n", pending.len());
    for req in &pending {
        let purpose: String = req.purpose.chars().take(80).collect();
        println!("  [{}] {}", req.priority, req.tool_name);
        println!("       From: {}", req.requested_by);
        println!("       Purpose: {purpose}");
        println!("       ID: {}", req.synapse_message_id);
        println!();
    }
    Ok(())
}
