//! Turning Synapse message records into alerts.
//!
//! A message record is a JSON file dropped into the shared message
//! directory. Its path doubles as the dedup key, so ingesting the same file
//! twice never produces a second alert for any recipient.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use synapse_notify_core::{Alert, Error, NewAlert, Priority, Result, preview_source};

use crate::store::AlertStore;

/// Fields the adapter reads from a Synapse message file.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<OneOrMany>,
    #[serde(default)]
    cc: Option<OneOrMany>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<serde_json::Value>,
    #[serde(default)]
    content: Option<serde_json::Value>,
    #[serde(default)]
    priority: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

/// A source message, reduced to what alert creation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub sender: String,
    /// `to` followed by `cc`, as written (not yet normalized).
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    /// Where the record lives; used as the alert's `source_file`.
    pub source: String,
}

impl SourceMessage {
    /// Parse a message record's JSON text.
    pub fn parse(source: &Path, json: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidSource {
            path: source.to_path_buf(),
            reason,
        };
        let raw: RawMessage = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;

        let priority = match raw.priority.as_deref().map(str::trim) {
            None | Some("") => Priority::Normal,
            Some(p) => p.parse()?,
        };
        let mut recipients = raw.to.map(OneOrMany::into_vec).unwrap_or_default();
        recipients.extend(raw.cc.map(OneOrMany::into_vec).unwrap_or_default());
        let body = raw
            .body
            .or(raw.content)
            .map(|v| preview_source(&v))
            .unwrap_or_default();

        Ok(Self {
            sender: raw
                .from
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            recipients,
            subject: raw
                .subject
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "No Subject".to_string()),
            body,
            priority,
            source: source.to_string_lossy().into_owned(),
        })
    }

    /// Read and parse a message record from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::InvalidSource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(path, &json)
    }
}

/// What one ingestion produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// One alert per concrete recipient, new or pre-existing.
    pub alerts: Vec<Alert>,
    pub created: usize,
    pub duplicates: usize,
}

/// Resolve the concrete, normalized recipients of `message`.
///
/// Broadcast markers expand to the configured roster minus the sender.
/// Each agent appears once, in first-mention order. Every identity is
/// validated before anything is returned.
pub fn resolve_recipients(store: &AlertStore, message: &SourceMessage) -> Result<Vec<String>> {
    let config = store.config();
    let sender = store.normalize(&message.sender)?;
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for raw in &message.recipients {
        let recipient = store.normalize(raw)?;
        if config.is_broadcast(&recipient) {
            for member in &config.known_agents {
                let member = store.normalize(member)?;
                if member != sender && seen.insert(member.clone()) {
                    resolved.push(member);
                }
            }
        } else if seen.insert(recipient.clone()) {
            resolved.push(recipient);
        }
    }
    Ok(resolved)
}

/// Create one alert per recipient of `message`.
pub fn ingest_message(store: &AlertStore, message: &SourceMessage) -> Result<IngestReport> {
    let recipients = resolve_recipients(store, message)?;
    let mut report = IngestReport::default();

    for recipient in recipients {
        let outcome = store.create_with_outcome(
            NewAlert::new(
                recipient,
                message.sender.as_str(),
                message.subject.as_str(),
                message.source.as_str(),
            )
            .content(message.body.as_str())
            .priority(message.priority),
        )?;
        if outcome.is_new {
            report.created += 1;
        } else {
            report.duplicates += 1;
        }
        report.alerts.push(outcome.alert);
    }

    tracing::info!(
        source = %message.source,
        created = report.created,
        duplicates = report.duplicates,
        "ingested message"
    );
    Ok(report)
}

/// Load the message record at `path` and ingest it.
pub fn ingest_file(store: &AlertStore, path: impl Into<PathBuf>) -> Result<IngestReport> {
    let path = path.into();
    let message = SourceMessage::load(&path)?;
    ingest_message(store, &message)
}
