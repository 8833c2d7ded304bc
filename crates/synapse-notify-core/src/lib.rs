//! Core types, configuration, and models for SynapseNotify
//!
//! This crate provides:
//! - Configuration management (`Config`, environment parsing)
//! - Data models (`Alert`, `AgentAlertFile`, `Priority`)
//! - Agent identity normalization
//! - Common error types

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod identity;
pub mod models;

// Re-export key types for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use identity::{agent_from_file_name, alert_file_name, normalize_agent};
pub use models::{
    AgentAlertFile, Alert, NewAlert, Priority, make_preview, now_iso, preview_source,
};
