//! Data models for SynapseNotify
//!
//! These structs are the on-disk format: one [`AgentAlertFile`] JSON
//! document per agent, holding that agent's [`Alert`]s in creation order.

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Priority
// =============================================================================

/// Alert priority.
///
/// Declaration order is display order: sorting ascending puts `Critical`
/// first and `Low` last.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Critical, Self::High, Self::Normal, Self::Low];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == upper)
            .ok_or_else(|| Error::InvalidPriority(s.to_string()))
    }
}

// =============================================================================
// Alert
// =============================================================================

/// One notification: a message from `from_agent` is waiting for `to_agent`.
///
/// # Mutability
/// Only `read` changes after creation, and only from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    /// RFC 3339 UTC, assigned by the store.
    pub timestamp: String,
    pub from_agent: String,
    pub to_agent: String,
    pub subject: String,
    pub preview: String,
    /// Dedup key (together with `to_agent`).
    pub source_file: String,
    pub priority: Priority,
    pub read: bool,
}

/// Caller-supplied fields of an alert that does not exist yet.
///
/// Identities are raw here; the store normalizes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub to_agent: String,
    pub from_agent: String,
    pub subject: String,
    pub content: String,
    pub source_file: String,
    pub priority: Priority,
}

impl NewAlert {
    pub fn new(
        to_agent: impl Into<String>,
        from_agent: impl Into<String>,
        subject: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            to_agent: to_agent.into(),
            from_agent: from_agent.into(),
            subject: subject.into(),
            content: String::new(),
            source_file: source_file.into(),
            priority: Priority::Normal,
        }
    }

    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

// =============================================================================
// AgentAlertFile
// =============================================================================

/// Persisted alert set for one agent.
///
/// `alert_count`, `unread_count` and `last_updated` are derived. They are
/// written for the benefit of humans and other tools, and recomputed by
/// [`AgentAlertFile::refresh`] before every save; readers never rely on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAlertFile {
    pub agent: String,
    pub last_updated: String,
    pub alert_count: usize,
    pub unread_count: usize,
    pub alerts: Vec<Alert>,
}

impl AgentAlertFile {
    /// An empty file for `agent`, as seen before the first alert arrives.
    #[must_use]
    pub fn empty(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            last_updated: now_iso(),
            alert_count: 0,
            unread_count: 0,
            alerts: Vec::new(),
        }
    }

    /// Recompute the derived fields and stamp `last_updated`.
    pub fn refresh(&mut self) {
        self.alert_count = self.alerts.len();
        self.unread_count = self.alerts.iter().filter(|a| !a.read).count();
        self.last_updated = now_iso();
    }

    #[must_use]
    pub fn unread(&self) -> usize {
        self.alerts.iter().filter(|a| !a.read).count()
    }

    #[must_use]
    pub fn find_by_source(&self, source_file: &str) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.source_file == source_file)
    }

    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.alerts.iter().any(|a| a.id == id)
    }

    /// Check the structural invariants a parsed file must satisfy.
    ///
    /// Returns a human-readable reason on the first violation.
    pub fn validate(&self, expected_agent: &str) -> std::result::Result<(), String> {
        if self.agent != expected_agent {
            return Err(format!(
                "file belongs to {:?}, expected {expected_agent:?}",
                self.agent
            ));
        }
        let mut ids = std::collections::HashSet::with_capacity(self.alerts.len());
        for alert in &self.alerts {
            if alert.to_agent != self.agent {
                return Err(format!(
                    "alert {} is addressed to {:?}",
                    alert.id, alert.to_agent
                ));
            }
            if alert.id.is_empty() {
                return Err("alert with empty id".to_string());
            }
            if !ids.insert(alert.id.as_str()) {
                return Err(format!("duplicate alert id {}", alert.id));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Timestamps & previews
// =============================================================================

/// Current time as RFC 3339 UTC with microsecond precision.
///
/// Fixed width, so lexical order equals chronological order.
#[must_use]
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

const ELLIPSIS: &str = "...";

/// Cut `content` to at most `max_chars` characters.
///
/// Longer content keeps its first `max_chars - 3` characters followed by
/// `...`. Counts `char`s, never splits a code point.
#[must_use]
pub fn make_preview(content: &str, max_chars: usize) -> String {
    let content = content.trim();
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = content.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Pick the text to preview from a structured message body.
///
/// Strings are used as-is. Objects prefer `announcement`, then `message`,
/// then `summary`; anything else falls back to compact JSON.
#[must_use]
pub fn preview_source(body: &serde_json::Value) -> String {
    match body {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Object(map) => ["announcement", "message", "summary"]
            .iter()
            .find_map(|key| map.get(*key).and_then(serde_json::Value::as_str))
            .map_or_else(|| body.to_string(), str::to_string),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alert(id: &str, to: &str, read: bool) -> Alert {
        Alert {
            id: id.to_string(),
            timestamp: now_iso(),
            from_agent: "FORGE".to_string(),
            to_agent: to.to_string(),
            subject: "s".to_string(),
            preview: "p".to_string(),
            source_file: format!("/{id}.json"),
            priority: Priority::Normal,
            read,
        }
    }

    #[test]
    fn priority_order_puts_critical_first() {
        let mut ps = vec![Priority::Low, Priority::Critical, Priority::Normal, Priority::High];
        ps.sort();
        assert_eq!(ps, Priority::ALL.to_vec());
    }

    #[test]
    fn priority_parse_is_case_insensitive() {
        assert_eq!(" high ".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert!(matches!(
            "urgent".parse::<Priority>(),
            Err(Error::InvalidPriority(_))
        ));
    }

    #[test]
    fn priority_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Priority::Low).unwrap(), "\"LOW\"");
        let p: Priority = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(p, Priority::Critical);
        assert!(serde_json::from_str::<Priority>("\"low\"").is_err());
    }

    #[test]
    fn alert_json_field_names() {
        let value = serde_json::to_value(alert("abc", "ATLAS", false)).unwrap();
        for key in [
            "id",
            "timestamp",
            "from_agent",
            "to_agent",
            "subject",
            "preview",
            "source_file",
            "priority",
            "read",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn refresh_recomputes_counts() {
        let mut file = AgentAlertFile::empty("ATLAS");
        file.alerts.push(alert("a", "ATLAS", true));
        file.alerts.push(alert("b", "ATLAS", false));
        file.alert_count = 99;
        file.unread_count = 42;
        file.refresh();
        assert_eq!(file.alert_count, 2);
        assert_eq!(file.unread_count, 1);
    }

    #[test]
    fn validate_rejects_foreign_and_duplicate_alerts() {
        let mut file = AgentAlertFile::empty("ATLAS");
        file.alerts.push(alert("a", "ATLAS", false));
        assert!(file.validate("ATLAS").is_ok());
        assert!(file.validate("CLIO").is_err());

        file.alerts.push(alert("a", "ATLAS", false));
        assert!(file.validate("ATLAS").unwrap_err().contains("duplicate"));

        file.alerts.pop();
        file.alerts.push(alert("b", "CLIO", false));
        assert!(file.validate("ATLAS").unwrap_err().contains("addressed"));
    }

    #[test]
    fn preview_short_content_untouched() {
        assert_eq!(make_preview("  hello  ", 80), "hello");
    }

    #[test]
    fn preview_truncates_with_suffix() {
        let long = "x".repeat(200);
        let preview = make_preview(&long, 80);
        assert_eq!(preview.chars().count(), 80);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let long = "é".repeat(100);
        let preview = make_preview(&long, 10);
        assert_eq!(preview, format!("{}...", "é".repeat(7)));
    }

    #[test]
    fn preview_source_prefers_announcement() {
        let body = json!({"summary": "s", "announcement": "a", "message": "m"});
        assert_eq!(preview_source(&body), "a");
        let body = json!({"summary": "s", "message": "m"});
        assert_eq!(preview_source(&body), "m");
        let body = json!({"other": 1});
        assert_eq!(preview_source(&body), "{\"other\":1}");
        assert_eq!(preview_source(&json!("plain")), "plain");
        assert_eq!(preview_source(&serde_json::Value::Null), "");
    }

    #[test]
    fn timestamps_sort_chronologically() {
        let a = now_iso();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_iso();
        assert!(a < b);
        assert!(a.ends_with('Z'));
    }
}
