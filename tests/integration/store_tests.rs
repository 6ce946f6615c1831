//! Coordination guarantees across independent store connections
//!
//! Each `SqliteStore::open` is a separate connection to the same file, the
//! same way separate crawler processes see the database.

use skein::frontier::{DedupFilter, Frontier};
use skein::state::ItemState;
use skein::storage::{CoordinationStore, SqliteStore, UrlRecord};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

fn open(path: &Path) -> Arc<dyn CoordinationStore> {
    Arc::new(SqliteStore::open(path).unwrap())
}

fn record(raw: &str) -> UrlRecord {
    UrlRecord::seed(raw, Url::parse(raw).unwrap())
}

#[test]
fn test_claim_is_exclusive_across_connections() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("claims.db");
    let session_id = open(&db_path).open_session("shared", "hash").unwrap().id;

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let handles: Vec<_> = (0..contenders)
        .map(|_| {
            let db_path = db_path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let dedup = DedupFilter::new(open(&db_path), session_id);
                barrier.wait();
                dedup
                    .try_claim(&Url::parse("http://a.test/page").unwrap())
                    .unwrap()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn test_claim_and_push_enqueues_once_across_connections() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("push.db");
    let session_id = open(&db_path).open_session("shared", "hash").unwrap().id;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let db_path = db_path.clone();
            thread::spawn(move || {
                let dedup = DedupFilter::new(open(&db_path), session_id);
                for i in 0..25 {
                    dedup
                        .try_claim_and_push(&record(&format!("http://a.test/{}", i)))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store = SqliteStore::open(&db_path).unwrap();
    assert_eq!(store.count_claims(session_id).unwrap(), 25);
    assert_eq!(store.frontier_entries(session_id).unwrap().len(), 25);
}

#[test]
fn test_expired_lease_recovered_exactly_once() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("lease.db");
    let session_id = open(&db_path).open_session("shared", "hash").unwrap().id;

    let crashed = Frontier::new(open(&db_path), session_id);
    crashed.push(&record("http://a.test/")).unwrap();
    let lease = Duration::from_millis(50);
    let lost = crashed.pop(lease).unwrap().unwrap();

    let survivor = Frontier::new(open(&db_path), session_id);
    assert!(survivor.pop(lease).unwrap().is_none());

    thread::sleep(lease + Duration::from_millis(20));
    let recovered = survivor.pop(Duration::from_secs(60)).unwrap().unwrap();
    assert_eq!(recovered.id, lost.id);
    assert!(survivor.pop(Duration::from_secs(60)).unwrap().is_none());

    assert!(!crashed.complete(&lost).unwrap());
    assert!(survivor.complete(&recovered).unwrap());
    assert_eq!(survivor.outstanding().unwrap(), 0);
}

#[test]
fn test_sessions_are_isolated() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("sessions.db");
    let store = SqliteStore::open(&db_path).unwrap();

    let first = store.open_session("first", "hash").unwrap().id;
    let second = store.open_session("second", "hash").unwrap().id;
    assert!(store.claim_and_push(first, &record("http://a.test/")).unwrap());
    assert!(store.claim_and_push(second, &record("http://a.test/")).unwrap());

    store.reset_session("first").unwrap();
    assert!(store.find_session("first").unwrap().is_none());
    assert_eq!(store.count_claims(second).unwrap(), 1);

    let counts = store.count_items_by_state(second).unwrap();
    assert_eq!(counts[&ItemState::Pending], 1);
}
