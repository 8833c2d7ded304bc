//! File-backed alert storage for SynapseNotify.
//!
//! Each agent owns one JSON document under the alerts directory. All
//! mutations go through [`AlertStore`], which serializes writers with an
//! advisory lock next to the file and replaces the file atomically.

#![forbid(unsafe_code)]

pub mod bell;
pub mod ingest;
pub mod lock;
pub mod persist;
pub mod report;
pub mod store;
pub mod tool_requests;

pub use bell::{Bell, SilentBell, TerminalBell};
pub use ingest::{IngestReport, SourceMessage, ingest_file, ingest_message, resolve_recipients};
pub use lock::{FileLock, lock_path_for, with_file_lock};
pub use report::render_report;
pub use store::{AlertQuery, AlertStore, CreateOutcome, Grouping};
pub use tool_requests::{ToolRequest, ToolRequestLog, ToolRequestScanner};
