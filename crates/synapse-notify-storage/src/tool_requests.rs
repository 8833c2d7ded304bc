//! Tool-request intake.
//!
//! Agents ask for new tooling by dropping `TOOL_REQUEST_*.json` messages into
//! the Synapse directory. The scanner copies each unseen request into a
//! master log so the team has one place to triage them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use synapse_notify_core::{Config, Error, Result, now_iso};

use crate::lock::with_file_lock;
use crate::persist::{ReadOutcome, read_json, write_json_atomic};

pub const TOOL_REQUEST_PATTERN: &str = "TOOL_REQUEST_*.json";
pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_IN_PROGRESS: &str = "IN_PROGRESS";
pub const STATUS_COMPLETED: &str = "COMPLETED";
pub const STATUS_CANCELLED: &str = "CANCELLED";

const DETAILS_MAX_CHARS: usize = 500;
const DEFAULT_RESPONSIBLE: [&str; 3] = ["ATLAS", "FORGE", "CLIO"];

// =============================================================================
// Master log document
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingInfo {
    pub created: String,
    pub last_updated: String,
    pub responsible_agents: Vec<String>,
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    pub total_requests: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub cancelled: u64,
}

/// One tracked request. Fields humans add later (assignment, completion)
/// start out `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolRequest {
    pub request_id: u64,
    pub date_received: String,
    pub requested_by: String,
    pub synapse_message_id: String,
    pub tool_name: String,
    pub purpose: String,
    pub priority: String,
    pub details: String,
    pub use_cases: Value,
    pub status: String,
    pub assigned_to: Option<String>,
    pub date_assigned: Option<String>,
    pub date_completed: Option<String>,
    pub github_url: Option<String>,
    pub notes: String,
    pub source_file: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolRequestLog {
    pub tracking_info: TrackingInfo,
    pub active_requests: Vec<ToolRequest>,
    pub completed_requests: Vec<ToolRequest>,
    pub statistics: Statistics,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolRequestLog {
    /// A brand-new log with no requests.
    #[must_use]
    pub fn fresh() -> Self {
        let now = now_iso();
        Self {
            tracking_info: TrackingInfo {
                created: now.clone(),
                last_updated: now,
                responsible_agents: DEFAULT_RESPONSIBLE.iter().map(ToString::to_string).collect(),
                description: "Master tracking log for all tool requests".to_string(),
                extra: Map::new(),
            },
            ..Self::default()
        }
    }

    fn known_message_ids(&self) -> HashSet<String> {
        self.active_requests
            .iter()
            .chain(&self.completed_requests)
            .map(|r| r.synapse_message_id.clone())
            .collect()
    }

    /// Recount the per-status figures from the request lists.
    ///
    /// `total_requests` is a running counter and only ever grows.
    pub fn recount(&mut self) {
        let active = &self.active_requests;
        let all = || active.iter().chain(&self.completed_requests);
        let stats = Statistics {
            total_requests: self.statistics.total_requests.max(all().count() as u64),
            pending: count_status(active.iter(), STATUS_PENDING),
            in_progress: count_status(active.iter(), STATUS_IN_PROGRESS),
            completed: count_status(all(), STATUS_COMPLETED),
            cancelled: count_status(all(), STATUS_CANCELLED),
        };
        self.statistics = stats;
    }

    /// Active requests still waiting for someone to pick them up.
    pub fn pending(&self) -> impl Iterator<Item = &ToolRequest> {
        self.active_requests
            .iter()
            .filter(|r| r.status == STATUS_PENDING)
    }
}

fn count_status<'a>(requests: impl Iterator<Item = &'a ToolRequest>, status: &str) -> u64 {
    requests.filter(|r| r.status == status).count() as u64
}

// =============================================================================
// Incoming request files
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default)]
    msg_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    body: Value,
}

fn body_str(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .map(ToString::to_string)
}

fn render_details(body: &Value) -> String {
    let text = match body {
        Value::Null => return "See original Synapse message".to_string(),
        Value::String(s) if s.is_empty() => return "See original Synapse message".to_string(),
        Value::Object(m) if m.is_empty() => return "See original Synapse message".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.chars().take(DETAILS_MAX_CHARS).collect()
}

fn request_from_file(path: &Path, raw: RawRequest, request_id: u64) -> ToolRequest {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let body = &raw.body;
    ToolRequest {
        request_id,
        date_received: raw.timestamp.unwrap_or_else(now_iso),
        requested_by: raw.from.unwrap_or_else(|| "UNKNOWN".to_string()),
        synapse_message_id: message_id(path, raw.msg_id),
        tool_name: body_str(body, &["tool_name"])
            .or(raw.subject)
            .unwrap_or_else(|| "Unknown Tool".to_string()),
        purpose: body_str(body, &["problem_statement", "purpose"])
            .unwrap_or_else(|| "See Synapse message".to_string()),
        priority: raw.priority.unwrap_or_else(|| "NORMAL".to_string()),
        details: render_details(body),
        use_cases: ["success_criteria", "use_cases"]
            .iter()
            .find_map(|k| body.get(*k).cloned())
            .unwrap_or_else(|| Value::Array(Vec::new())),
        status: STATUS_PENDING.to_string(),
        notes: format!("Auto-imported from Synapse: {file_name}"),
        source_file: path.to_string_lossy().into_owned(),
        ..ToolRequest::default()
    }
}

fn message_id(path: &Path, msg_id: Option<String>) -> String {
    msg_id.filter(|id| !id.is_empty()).unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}

// =============================================================================
// Scanner
// =============================================================================

/// Syncs tool-request messages into the master log.
#[derive(Debug, Clone)]
pub struct ToolRequestScanner {
    synapse_dir: PathBuf,
    log_path: PathBuf,
    lock_timeout: Duration,
}

impl ToolRequestScanner {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            synapse_dir: config.synapse_dir.clone(),
            log_path: config.tool_request_log.clone(),
            lock_timeout: config.lock_timeout,
        }
    }

    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Request files currently in the Synapse directory, sorted by path.
    pub fn request_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.synapse_dir.join(TOOL_REQUEST_PATTERN);
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern).map_err(|e| {
            Error::InvalidArgument(format!("bad synapse directory pattern {pattern}: {e}"))
        })?;
        let mut files: Vec<PathBuf> = paths.filter_map(std::result::Result::ok).collect();
        files.sort();
        Ok(files)
    }

    /// Add every request not yet in the master log. Returns how many were
    /// added.
    ///
    /// Request files that can't be read or parsed are logged and skipped.
    /// The log is only rewritten when something was added.
    pub fn scan_and_sync(&self) -> Result<usize> {
        let files = self.request_files()?;
        if files.is_empty() {
            tracing::debug!(dir = %self.synapse_dir.display(), "no tool requests found");
            return Ok(0);
        }

        with_file_lock(&self.log_path, self.lock_timeout, || {
            let mut log = self.load_for_update()?;
            let mut seen = log.known_message_ids();
            let base_id = log.statistics.total_requests;
            let mut added = 0usize;

            for path in &files {
                let raw = match load_request(path) {
                    Ok(raw) => raw,
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "skipping tool request");
                        continue;
                    }
                };
                let id = message_id(path, raw.msg_id.clone());
                if !seen.insert(id) {
                    continue;
                }
                let request = request_from_file(path, raw, base_id + added as u64 + 1);
                tracing::info!(
                    tool = %request.tool_name,
                    requested_by = %request.requested_by,
                    "added pending tool request"
                );
                log.active_requests.push(request);
                added += 1;
            }

            if added > 0 {
                log.statistics.total_requests = base_id + added as u64;
                log.recount();
                log.tracking_info.last_updated = now_iso();
                write_json_atomic(&self.log_path, &log)?;
            }
            Ok(added)
        })
    }

    /// Pending requests in the master log. A missing log has none.
    pub fn pending_requests(&self) -> Result<Vec<ToolRequest>> {
        Ok(self
            .load()?
            .map(|log| log.pending().cloned().collect())
            .unwrap_or_default())
    }

    /// The master log, `None` if it doesn't exist yet.
    pub fn load(&self) -> Result<Option<ToolRequestLog>> {
        match read_json::<ToolRequestLog>(&self.log_path)? {
            ReadOutcome::Missing => Ok(None),
            ReadOutcome::Parsed(log) => Ok(Some(log)),
            ReadOutcome::Malformed(reason) => Err(Error::MalformedState {
                path: self.log_path.clone(),
                reason,
            }),
        }
    }

    fn load_for_update(&self) -> Result<ToolRequestLog> {
        Ok(self.load()?.unwrap_or_else(ToolRequestLog::fresh))
    }
}

fn load_request(path: &Path) -> Result<RawRequest> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| Error::InvalidSource {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
