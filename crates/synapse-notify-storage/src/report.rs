//! Session-start report rendering.

use std::fmt::Write as _;

use synapse_notify_core::{Alert, Priority};

const RULE_WIDTH: usize = 60;
const HIGH_PREVIEW_CHARS: usize = 50;

/// Render the report shown to `agent` at the start of a session.
///
/// `unread` must be in insertion order. CRITICAL alerts are listed first
/// with full detail, then HIGH, then NORMAL and LOW together in their
/// original order.
#[must_use]
pub fn render_report(agent: &str, unread: &[Alert]) -> String {
    if unread.is_empty() {
        return format!("[OK] No new messages for {agent}");
    }

    let rule = "=".repeat(RULE_WIDTH);
    let by = |wanted: &[Priority]| -> Vec<&Alert> {
        unread
            .iter()
            .filter(|a| wanted.contains(&a.priority))
            .collect()
    };
    let critical = by(&[Priority::Critical]);
    let high = by(&[Priority::High]);
    let rest = by(&[Priority::Normal, Priority::Low]);

    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "[!] {} NEW MESSAGE(S) FOR {agent}", unread.len());
    let _ = writeln!(out, "{rule}");
    out.push('\n');

    if !critical.is_empty() {
        out.push_str("[!!!] CRITICAL MESSAGES:\n");
        for alert in critical {
            let _ = writeln!(out, "  From: {}", alert.from_agent);
            let _ = writeln!(out, "  Subject: {}", alert.subject);
            let _ = writeln!(out, "  Preview: {}", alert.preview);
            let _ = writeln!(out, "  File: {}", alert.source_file);
            out.push('\n');
        }
    }

    if !high.is_empty() {
        out.push_str("[!] HIGH PRIORITY:\n");
        for alert in high {
            let short: String = alert.preview.chars().take(HIGH_PREVIEW_CHARS).collect();
            let _ = writeln!(out, "  From: {} - {}", alert.from_agent, alert.subject);
            let _ = writeln!(out, "  Preview: {short}...");
            out.push('\n');
        }
    }

    if !rest.is_empty() {
        out.push_str("[i] NORMAL MESSAGES:\n");
        for alert in rest {
            let _ = writeln!(out, "  From: {} - {}", alert.from_agent, alert.subject);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Run: synapsenotify read {agent} - to mark all as read");
    let _ = writeln!(out, "Run: synapsenotify clear {agent} - to clear alerts");
    out.push_str(&rule);
    out
}
