//! Agent identity normalization.
//!
//! Identities arrive from message headers, CLI arguments and scripts in
//! whatever case the author typed. They are folded into one canonical form
//! before they are used as lookup keys or file names.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static AGENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9_.\-]{0,63}$").expect("agent regex"));

/// Normalize an agent identity.
///
/// Trims, upper-cases, turns whitespace runs into `_`, then strips client
/// prefixes (`CURSOR_`, `CLI_`, ...) for as long as one matches and leaves a
/// non-empty remainder. The result must match `^[A-Z0-9][A-Z0-9_.-]{0,63}$`
/// and contain no `..`, so it is always safe to embed in a file name.
///
/// Applying the function to its own output returns the same value.
pub fn normalize_agent(raw: &str, prefixes: &[String]) -> Result<String> {
    let mut name = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase();

    loop {
        let stripped = prefixes.iter().find_map(|prefix| {
            let prefix = prefix.to_uppercase();
            name.strip_prefix(prefix.as_str())
                .filter(|rest| !rest.is_empty() && !prefix.is_empty())
                .map(str::to_string)
        });
        match stripped {
            Some(rest) => name = rest,
            None => break,
        }
    }

    if !AGENT_RE.is_match(&name) || name.contains("..") {
        return Err(Error::InvalidAgent(raw.to_string()));
    }
    Ok(name)
}

/// File name holding the alerts of an already-normalized agent.
#[must_use]
pub fn alert_file_name(agent: &str) -> String {
    format!("{agent}{ALERT_FILE_SUFFIX}")
}

/// Suffix shared by every agent alert file.
pub const ALERT_FILE_SUFFIX: &str = "_alerts.json";

/// Recover the agent from an alert file name, if it is one.
#[must_use]
pub fn agent_from_file_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(ALERT_FILE_SUFFIX)
        .filter(|agent| AGENT_RE.is_match(agent))
}
