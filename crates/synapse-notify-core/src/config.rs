//! Configuration management for SynapseNotify
//!
//! Configuration is loaded from environment variables. Every path the store
//! touches lives on [`Config`], which is passed explicitly to the store so
//! tests can point it at a temporary directory.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Agents that receive alerts when a message is broadcast.
pub const DEFAULT_KNOWN_AGENTS: &[&str] = &[
    "FORGE", "ATLAS", "CLIO", "NEXUS", "BOLT", "GEMINI", "IRIS", "PORTER",
];

/// Recipient values that expand to the whole roster.
pub const DEFAULT_BROADCAST_ALIASES: &[&str] = &["ALL", "TEAM_BRAIN"];

/// Client prefixes stripped from identities (`CURSOR_FORGE` -> `FORGE`).
pub const DEFAULT_IDENTITY_PREFIXES: &[&str] = &["CURSOR_", "CLI_"];

/// Smallest preview budget that still leaves room for the `...` suffix.
pub const MIN_PREVIEW_CHARS: usize = 4;

/// Main configuration struct for SynapseNotify
#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub alerts_dir: PathBuf,
    pub lock_timeout: Duration,
    /// Re-read attempts when an unlocked read hits a half-written file.
    pub read_retries: u32,

    // Alerts
    pub preview_max_chars: usize,
    pub bell_enabled: bool,

    // Identities
    pub known_agents: Vec<String>,
    pub broadcast_aliases: Vec<String>,
    pub identity_prefixes: Vec<String>,

    // Tool requests
    pub synapse_dir: PathBuf,
    pub tool_request_log: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let base = default_base_dir();
        Self {
            alerts_dir: base.join("alerts"),
            lock_timeout: Duration::from_millis(5_000),
            read_retries: 3,
            preview_max_chars: 80,
            bell_enabled: true,
            known_agents: to_owned_list(DEFAULT_KNOWN_AGENTS),
            broadcast_aliases: to_owned_list(DEFAULT_BROADCAST_ALIASES),
            identity_prefixes: to_owned_list(DEFAULT_IDENTITY_PREFIXES),
            synapse_dir: base.join("synapse").join("active"),
            tool_request_log: base.join("tool_requests.json"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Storage
        if let Some(v) = env_value("SYNAPSE_NOTIFY_ALERTS_DIR") {
            config.alerts_dir = expand_path(&v);
        }
        config.lock_timeout = Duration::from_millis(env_parse(
            "SYNAPSE_NOTIFY_LOCK_TIMEOUT_MS",
            u64::try_from(config.lock_timeout.as_millis()).unwrap_or(u64::MAX),
        ));
        config.read_retries = env_parse("SYNAPSE_NOTIFY_READ_RETRIES", config.read_retries);

        // Alerts
        config.preview_max_chars = env_parse("SYNAPSE_NOTIFY_PREVIEW_CHARS", config.preview_max_chars)
            .max(MIN_PREVIEW_CHARS);
        config.bell_enabled = env_bool("SYNAPSE_NOTIFY_BELL", config.bell_enabled);

        // Identities
        if let Some(v) = env_value("SYNAPSE_NOTIFY_KNOWN_AGENTS") {
            config.known_agents = parse_list(&v);
        }
        if let Some(v) = env_value("SYNAPSE_NOTIFY_BROADCAST") {
            config.broadcast_aliases = parse_list(&v);
        }
        if let Some(v) = env_value("SYNAPSE_NOTIFY_PREFIXES") {
            config.identity_prefixes = parse_list(&v);
        }

        // Tool requests
        if let Some(v) = env_value("SYNAPSE_DIR") {
            config.synapse_dir = expand_path(&v);
        }
        if let Some(v) = env_value("SYNAPSE_NOTIFY_TOOL_REQUEST_LOG") {
            config.tool_request_log = expand_path(&v);
        }

        config
    }

    /// Returns a copy rooted at `alerts_dir`, leaving everything else as-is.
    #[must_use]
    pub fn with_alerts_dir(mut self, alerts_dir: impl Into<PathBuf>) -> Self {
        self.alerts_dir = alerts_dir.into();
        self
    }

    /// Whether `normalized` names a broadcast target rather than one agent.
    #[must_use]
    pub fn is_broadcast(&self, normalized: &str) -> bool {
        self.broadcast_aliases
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(normalized))
    }
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".synapse_notify")
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
}

/// Read a value from the environment, treating blank values as unset.
#[must_use]
pub fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Split a comma- or whitespace-separated list, dropping empty entries.
#[must_use]
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => true,
        "0" | "false" | "f" | "no" | "n" | "off" => false,
        _ => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env_value(key).map_or(default, |v| parse_bool(&v, default))
}

/// Parse a numeric setting, keeping `default` when the value is unset or
/// unparseable.
fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    let Some(raw) = env_value(key) else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(key, value = %raw, "ignoring unparseable setting");
        default
    })
}
