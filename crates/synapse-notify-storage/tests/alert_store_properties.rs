//! End-to-end behavior of the alert store across ingestion, reads, and
//! concurrent writers.
//!
//! Run:
//! ```bash
//! cargo test -p synapse-notify-storage --test alert_store_properties
//! ```

#![allow(
    clippy::too_many_lines,
    clippy::cast_possible_truncation,
    clippy::doc_markdown,
    clippy::redundant_closure_for_method_calls,
    clippy::missing_const_for_fn
)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use synapse_notify_core::{Config, NewAlert, Priority};
use synapse_notify_storage::{AlertQuery, AlertStore, SilentBell, ingest_file};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config(root: &Path) -> Config {
    Config {
        bell_enabled: false,
        lock_timeout: Duration::from_secs(30),
        known_agents: ["ATLAS", "BOLT", "CLIO", "FORGE"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        ..Config::default().with_alerts_dir(root.join("alerts"))
    }
}

fn test_store(tmp: &TempDir) -> AlertStore {
    AlertStore::new(test_config(tmp.path())).with_bell(Arc::new(SilentBell))
}

fn write_message(dir: &Path, name: &str, json: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, json).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[test]
fn ingesting_the_same_file_twice_creates_one_alert() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    let msg = write_message(
        &tmp.path().join("synapse"),
        "m1.json",
        r#"{"from":"FORGE","to":["ATLAS"],"subject":"Build","body":"green","priority":"HIGH"}"#,
    );

    let first = ingest_file(&store, &msg).unwrap();
    let second = ingest_file(&store, &msg).unwrap();

    assert_eq!(first.created, 1);
    assert_eq!(second.duplicates, 1);
    assert_eq!(first.alerts[0].id, second.alerts[0].id);
    assert_eq!(store.query("ATLAS", &AlertQuery::all()).unwrap().len(), 1);
}

#[test]
fn broadcast_reaches_everyone_but_the_sender() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    let msg = write_message(
        &tmp.path().join("synapse"),
        "b.json",
        r#"{"from":"ATLAS","to":"ALL","subject":"Standup"}"#,
    );

    ingest_file(&store, &msg).unwrap();

    assert_eq!(store.count("ATLAS").unwrap(), 0);
    for agent in ["BOLT", "CLIO", "FORGE"] {
        assert_eq!(store.count(agent).unwrap(), 1, "{agent}");
    }
    assert!(!store.alert_path("ATLAS").exists());
}

// ---------------------------------------------------------------------------
// Read / clear / status
// ---------------------------------------------------------------------------

#[test]
fn read_is_monotonic() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    let a = store
        .create(NewAlert::new("ATLAS", "FORGE", "one", "/s/1.json"))
        .unwrap();
    store
        .create(NewAlert::new("ATLAS", "FORGE", "two", "/s/2.json"))
        .unwrap();

    assert_eq!(store.mark_read("ATLAS", Some(&a.id)).unwrap(), 1);
    // Re-creating the same source does not resurrect it as unread.
    store
        .create(NewAlert::new("ATLAS", "BOLT", "one again", "/s/1.json"))
        .unwrap();
    assert_eq!(store.mark_read("ATLAS", Some(&a.id)).unwrap(), 0);
    assert_eq!(store.count("ATLAS").unwrap(), 1);

    let all = store.query("ATLAS", &AlertQuery::all()).unwrap();
    assert!(all.iter().find(|x| x.id == a.id).unwrap().read);
}

#[test]
fn new_source_after_read_all_is_unread() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    store
        .create(NewAlert::new("ATLAS", "FORGE", "old", "/s/old.json"))
        .unwrap();
    store.mark_read("ATLAS", None).unwrap();
    assert!(store.query("ATLAS", &AlertQuery::unread()).unwrap().is_empty());

    let fresh = store
        .create(NewAlert::new("ATLAS", "FORGE", "new", "/s/new.json"))
        .unwrap();
    let unread = store.query("ATLAS", &AlertQuery::unread()).unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].id, fresh.id);
}

#[test]
fn clear_keep_unread_then_clear_all() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    for i in 0..3 {
        store
            .create(NewAlert::new("CLIO", "FORGE", format!("s{i}"), format!("/s/{i}.json")))
            .unwrap();
    }
    let alerts = store.query("CLIO", &AlertQuery::all()).unwrap();
    store.mark_read("CLIO", Some(&alerts[0].id)).unwrap();
    store.mark_read("CLIO", Some(&alerts[1].id)).unwrap();

    assert_eq!(store.clear("CLIO", true).unwrap(), 2);
    let left = store.query("CLIO", &AlertQuery::all()).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, alerts[2].id);

    assert_eq!(store.clear("CLIO", false).unwrap(), 1);
    assert!(store.query("CLIO", &AlertQuery::all()).unwrap().is_empty());
    assert!(store.alert_path("CLIO").exists());
}

#[test]
fn status_lists_only_agents_with_unread() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    store
        .create(NewAlert::new("ATLAS", "FORGE", "x", "/s/x.json"))
        .unwrap();
    store
        .create(NewAlert::new("ATLAS", "FORGE", "y", "/s/y.json"))
        .unwrap();
    store
        .create(NewAlert::new("BOLT", "FORGE", "z", "/s/z.json"))
        .unwrap();
    store.mark_read("BOLT", None).unwrap();

    let status = store.status_all().unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status["ATLAS"], 2);
}

#[test]
fn report_groups_by_priority() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    let add = |subject: &str, priority: Priority| {
        store
            .create(
                NewAlert::new("IRIS", "FORGE", subject, format!("/s/{subject}.json"))
                    .priority(priority),
            )
            .unwrap();
    };
    add("later-normal", Priority::Normal);
    add("urgent", Priority::Critical);
    add("soon", Priority::High);

    let report = store.check_and_report("IRIS", true).unwrap();
    let pos = |needle: &str| report.find(needle).unwrap();
    assert!(pos("[!!!] CRITICAL MESSAGES:") < pos("[!] HIGH PRIORITY:"));
    assert!(pos("[!] HIGH PRIORITY:") < pos("[i] NORMAL MESSAGES:"));
    assert!(pos("urgent") < pos("soon"));
    assert!(pos("soon") < pos("later-normal"));
    assert!(report.contains("3 NEW MESSAGE(S) FOR IRIS"));

    let grouped = store
        .query("IRIS", &AlertQuery::unread().grouped())
        .unwrap();
    let order: Vec<_> = grouped.iter().map(|a| a.priority).collect();
    assert_eq!(order, [Priority::Critical, Priority::High, Priority::Normal]);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_writers_lose_nothing() {
    const WRITERS: usize = 12;
    const PER_WRITER: usize = 5;

    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_WRITER {
                    store
                        .create(NewAlert::new(
                            "NEXUS",
                            format!("W{w}"),
                            "load",
                            format!("/s/w{w}-{i}.json"),
                        ))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let file = store.load_file("NEXUS").unwrap().unwrap();
    assert_eq!(file.alerts.len(), WRITERS * PER_WRITER);
    assert_eq!(file.alert_count, WRITERS * PER_WRITER);
    assert_eq!(file.unread_count, WRITERS * PER_WRITER);
}

#[test]
fn concurrent_duplicates_collapse_to_one() {
    const WRITERS: usize = 8;

    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store
                    .create_with_outcome(NewAlert::new("BOLT", "FORGE", "same", "/s/same.json"))
                    .unwrap()
            })
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_new).count(), 1);
    let ids: std::collections::HashSet<_> = outcomes.iter().map(|o| o.alert.id.clone()).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(store.query("BOLT", &AlertQuery::all()).unwrap().len(), 1);
}

#[test]
fn readers_never_see_a_torn_file() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    store
        .create(NewAlert::new("ATLAS", "FORGE", "seed", "/s/seed.json"))
        .unwrap();

    let writer = {
        let store = store.clone();
        thread::spawn(move || {
            for i in 0..40 {
                store
                    .create(NewAlert::new("ATLAS", "FORGE", "w", format!("/s/t{i}.json")))
                    .unwrap();
            }
        })
    };
    let mut last = 0;
    while !writer.is_finished() {
        let n = store.load_file("ATLAS").unwrap().unwrap().alerts.len();
        assert!(n >= last);
        last = n;
    }
    writer.join().unwrap();
    assert_eq!(store.count("ATLAS").unwrap(), 41);
}
