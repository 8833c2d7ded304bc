//! The alert store: one JSON file per agent, no in-memory cache.
//!
//! Every public operation re-reads the agent's file. Mutations run as a
//! read-modify-write cycle under that file's advisory lock and replace the
//! file atomically, so concurrent processes never lose each other's writes.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sha1::{Digest, Sha1};
use synapse_notify_core::{
    AgentAlertFile, Alert, Config, Error, NewAlert, Priority, Result, agent_from_file_name,
    alert_file_name, make_preview, normalize_agent, now_iso,
};

use crate::bell::{Bell, TerminalBell};
use crate::lock::{FileLock, lock_path_for};
use crate::persist::{ReadOutcome, read_json, write_json_atomic};
use crate::report::render_report;

const ID_LEN: usize = 12;
const READ_RETRY_BASE: Duration = Duration::from_millis(15);

/// How query results are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Grouping {
    /// Creation order, oldest first.
    #[default]
    Insertion,
    /// CRITICAL, HIGH, NORMAL, LOW; creation order within each group.
    ByPriority,
}

/// Filters and ordering for [`AlertStore::query`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertQuery {
    pub unread_only: bool,
    pub priority: Option<Priority>,
    pub grouping: Grouping,
}

impl AlertQuery {
    /// Every alert, read or not.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Unread alerts only.
    #[must_use]
    pub fn unread() -> Self {
        Self {
            unread_only: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub const fn grouped(mut self) -> Self {
        self.grouping = Grouping::ByPriority;
        self
    }

    fn matches(&self, alert: &Alert) -> bool {
        (!self.unread_only || !alert.read) && self.priority.is_none_or(|p| alert.priority == p)
    }
}

/// Result of [`AlertStore::create_with_outcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    pub alert: Alert,
    /// `false` when an alert for the same source already existed and was
    /// returned unchanged.
    pub is_new: bool,
}

/// File-backed alert store.
#[derive(Clone)]
pub struct AlertStore {
    config: Config,
    bell: Arc<dyn Bell>,
}

impl std::fmt::Debug for AlertStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertStore")
            .field("alerts_dir", &self.config.alerts_dir)
            .finish_non_exhaustive()
    }
}

impl AlertStore {
    /// Create a store over `config.alerts_dir`. Nothing is touched on disk
    /// until the first write.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            bell: Arc::new(TerminalBell),
        }
    }

    /// Replace the bell rung by [`AlertStore::check_and_report`].
    #[must_use]
    pub fn with_bell(mut self, bell: Arc<dyn Bell>) -> Self {
        self.bell = bell;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Normalize an identity with this store's prefix rules.
    pub fn normalize(&self, raw: &str) -> Result<String> {
        normalize_agent(raw, &self.config.identity_prefixes)
    }

    /// Path of the alert file for a normalized agent.
    #[must_use]
    pub fn alert_path(&self, agent: &str) -> PathBuf {
        self.config.alerts_dir.join(alert_file_name(agent))
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Create an alert, or return the existing one for the same source.
    pub fn create(&self, new: NewAlert) -> Result<Alert> {
        self.create_with_outcome(new).map(|outcome| outcome.alert)
    }

    /// Like [`AlertStore::create`], but reports whether a record was added.
    pub fn create_with_outcome(&self, new: NewAlert) -> Result<CreateOutcome> {
        let to_agent = self.normalize(&new.to_agent)?;
        let from_agent = self.normalize(&new.from_agent)?;
        if new.source_file.trim().is_empty() {
            return Err(Error::InvalidArgument("source_file must not be empty".into()));
        }
        let preview_max = self
            .config
            .preview_max_chars
            .max(synapse_notify_core::config::MIN_PREVIEW_CHARS);

        let outcome = self.mutate(&to_agent, |file| {
            if let Some(existing) = file.find_by_source(&new.source_file) {
                return (
                    CreateOutcome {
                        alert: existing.clone(),
                        is_new: false,
                    },
                    false,
                );
            }

            let timestamp = now_iso();
            let mut id = generate_alert_id(&to_agent, &new.source_file, &timestamp);
            while file.contains_id(&id) {
                id = generate_alert_id(&to_agent, &new.source_file, &timestamp);
            }
            let alert = Alert {
                id,
                timestamp,
                from_agent,
                to_agent: to_agent.clone(),
                subject: new.subject,
                preview: make_preview(&new.content, preview_max),
                source_file: new.source_file,
                priority: new.priority,
                read: false,
            };
            file.alerts.push(alert.clone());
            (
                CreateOutcome {
                    alert,
                    is_new: true,
                },
                true,
            )
        })?;

        if outcome.is_new {
            tracing::info!(
                agent = %outcome.alert.to_agent,
                from = %outcome.alert.from_agent,
                id = %outcome.alert.id,
                priority = %outcome.alert.priority,
                "alert created"
            );
        } else {
            tracing::debug!(
                agent = %outcome.alert.to_agent,
                source = %outcome.alert.source_file,
                "alert already exists for source"
            );
        }
        Ok(outcome)
    }

    /// Mark one alert (by id) or every unread alert as read.
    ///
    /// Returns how many alerts changed. Unknown or already-read ids are a
    /// no-op, not an error.
    pub fn mark_read(&self, agent: &str, id: Option<&str>) -> Result<usize> {
        let agent = self.normalize(agent)?;
        if !self.alert_path(&agent).exists() {
            return Ok(0);
        }
        let marked = self.mutate(&agent, |file| {
            let mut marked = 0usize;
            for alert in file
                .alerts
                .iter_mut()
                .filter(|a| !a.read && id.is_none_or(|wanted| a.id == wanted))
            {
                alert.read = true;
                marked += 1;
            }
            (marked, marked > 0)
        })?;
        if marked > 0 {
            tracing::info!(agent = %agent, marked, "alerts marked read");
        }
        Ok(marked)
    }

    /// Remove every alert, or only the read ones when `keep_unread` is set.
    ///
    /// Returns how many alerts were removed.
    pub fn clear(&self, agent: &str, keep_unread: bool) -> Result<usize> {
        let agent = self.normalize(agent)?;
        if !self.alert_path(&agent).exists() {
            return Ok(0);
        }
        let removed = self.mutate(&agent, |file| {
            let before = file.alerts.len();
            if keep_unread {
                file.alerts.retain(|a| !a.read);
            } else {
                file.alerts.clear();
            }
            let removed = before - file.alerts.len();
            (removed, removed > 0)
        })?;
        if removed > 0 {
            tracing::info!(agent = %agent, removed, keep_unread, "alerts cleared");
        }
        Ok(removed)
    }

    /// Run one locked read-modify-write cycle on `agent`'s file.
    ///
    /// `f` returns its result plus whether it changed the file; unchanged
    /// files are not rewritten.
    fn mutate<T, F>(&self, agent: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut AgentAlertFile) -> (T, bool),
    {
        let path = self.alert_path(agent);
        let mut lock = FileLock::new(lock_path_for(&path)).with_timeout(self.config.lock_timeout);
        lock.acquire()?;

        let mut file = match read_json::<AgentAlertFile>(&path)? {
            ReadOutcome::Missing => AgentAlertFile::empty(agent),
            ReadOutcome::Parsed(file) => {
                file.validate(agent)
                    .map_err(|reason| Error::MalformedState {
                        path: path.clone(),
                        reason,
                    })?;
                file
            }
            ReadOutcome::Malformed(reason) => {
                return Err(Error::MalformedState { path, reason });
            }
        };

        let (result, changed) = f(&mut file);
        if changed {
            file.refresh();
            write_json_atomic(&path, &file)?;
        }
        lock.release()?;
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Alerts for `agent` matching `query`. A missing or unreadable file
    /// yields an empty list.
    pub fn query(&self, agent: &str, query: &AlertQuery) -> Result<Vec<Alert>> {
        let agent = self.normalize(agent)?;
        let Some(file) = self.read_lenient(&agent)? else {
            return Ok(Vec::new());
        };
        let mut alerts: Vec<Alert> = file.alerts.into_iter().filter(|a| query.matches(a)).collect();
        if query.grouping == Grouping::ByPriority {
            // Stable: creation order survives inside each priority.
            alerts.sort_by_key(|a| a.priority);
        }
        Ok(alerts)
    }

    /// Number of unread alerts for `agent`.
    pub fn count(&self, agent: &str) -> Result<usize> {
        let agent = self.normalize(agent)?;
        Ok(self.read_lenient(&agent)?.map_or(0, |file| file.unread()))
    }

    /// Unread counts for every agent that has at least one unread alert.
    pub fn status_all(&self) -> Result<BTreeMap<String, usize>> {
        let mut status = BTreeMap::new();
        let entries = match fs::read_dir(&self.config.alerts_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(status),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            let name = entry.file_name();
            let Some(agent) = name.to_str().and_then(agent_from_file_name) else {
                continue;
            };
            let unread = match self.read_lenient(agent) {
                Ok(file) => file.map_or(0, |file| file.unread()),
                Err(Error::Io(err)) => {
                    tracing::warn!(agent, error = %err, "skipping unreadable alert file");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if unread > 0 {
                status.insert(agent.to_string(), unread);
            }
        }
        Ok(status)
    }

    /// Build the session-start report for `agent`.
    ///
    /// Rings the bell once when `ring_bell` is set, the bell is enabled in
    /// the config, and there is at least one unread alert.
    pub fn check_and_report(&self, agent: &str, ring_bell: bool) -> Result<String> {
        let agent = self.normalize(agent)?;
        let unread = self.query(&agent, &AlertQuery::unread())?;
        if ring_bell && self.config.bell_enabled && !unread.is_empty() {
            self.bell.ring();
        }
        Ok(render_report(&agent, &unread))
    }

    /// The raw alert file for `agent`, `None` if it has never received one.
    ///
    /// Unlike [`AlertStore::query`] this does not hide a malformed file.
    pub fn load_file(&self, agent: &str) -> Result<Option<AgentAlertFile>> {
        let agent = self.normalize(agent)?;
        self.read_with_retry(&agent)
    }

    /// Unlocked read used by query-class operations: malformed files are
    /// logged and treated as empty.
    fn read_lenient(&self, agent: &str) -> Result<Option<AgentAlertFile>> {
        match self.read_with_retry(agent) {
            Err(Error::MalformedState { path, reason }) => {
                tracing::warn!(
                    agent,
                    path = %path.display(),
                    %reason,
                    "ignoring malformed alert file"
                );
                Ok(None)
            }
            other => other,
        }
    }

    /// Unlocked read that retries a malformed parse a few times before
    /// giving up, in case it raced a writer.
    fn read_with_retry(&self, agent: &str) -> Result<Option<AgentAlertFile>> {
        let path = self.alert_path(agent);
        let mut attempt = 0u32;
        loop {
            let reason = match read_json::<AgentAlertFile>(&path)? {
                ReadOutcome::Missing => return Ok(None),
                ReadOutcome::Parsed(file) => match file.validate(agent) {
                    Ok(()) => return Ok(Some(file)),
                    Err(reason) => reason,
                },
                ReadOutcome::Malformed(reason) => reason,
            };
            if attempt >= self.config.read_retries {
                return Err(Error::MalformedState { path, reason });
            }
            attempt += 1;
            std::thread::sleep(READ_RETRY_BASE * attempt);
        }
    }
}

/// Short, effectively unique alert id.
///
/// Hashes the recipient, source, timestamp, pid, and a process-local
/// sequence, so two alerts created in the same microsecond still differ.
fn generate_alert_id(agent: &str, source_file: &str, timestamp: &str) -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha1::new();
    for part in [agent, source_file, timestamp] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_LEN);
    id
}
