//! End-to-end blocking scenarios against the public API.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use claw_blacklist::{
    AddressState, Blacklist, BlacklistConfig, BlacklistError, BlockStore, FirewallBackend,
    RecordingFirewall, ResponseWatch, UNAUTHORIZED,
};

// ==================== Helper Functions ====================

fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid test address")
}

fn store_path(dir: &Path) -> PathBuf {
    dir.join("state").join("blacklist.txt")
}

fn provision_with(
    dir: &Path,
    threshold: u32,
    firewall: &Arc<RecordingFirewall>,
) -> Result<Blacklist, BlacklistError> {
    let config = BlacklistConfig::builder()
        .file(store_path(dir))
        .threshold(threshold)
        .build();
    Blacklist::provision(config, Box::new(Arc::clone(firewall)))
}

fn unauthorized(blacklist: &Blacklist, remote: &str) {
    let mut watch = ResponseWatch::new(blacklist, remote);
    watch.write_header(UNAUTHORIZED);
    watch.write_body();
}

// ==================== Scenarios ====================

#[test]
fn test_public_address_blocked_after_threshold() {
    let dir = tempfile::tempdir().expect("tempdir");
    let firewall = Arc::new(RecordingFirewall::new());
    let blacklist = provision_with(dir.path(), 3, &firewall).expect("provision");

    for port in [50001, 50002, 50003] {
        unauthorized(&blacklist, &format!("203.0.113.5:{port}"));
    }

    assert_eq!(firewall.calls(), vec![ip("203.0.113.5")]);
    assert_eq!(blacklist.counter().count(&ip("203.0.113.5")), 0);
    assert_eq!(blacklist.counter().tracked(), 0);

    blacklist.close();
    let contents = fs::read_to_string(store_path(dir.path())).expect("read store");
    assert_eq!(contents, "203.0.113.5\n");
}

#[test]
fn test_loopback_never_blocked() {
    let dir = tempfile::tempdir().expect("tempdir");
    let firewall = Arc::new(RecordingFirewall::new());
    let blacklist = provision_with(dir.path(), 3, &firewall).expect("provision");

    for _ in 0..10 {
        unauthorized(&blacklist, "127.0.0.1:8080");
    }

    assert!(firewall.calls().is_empty());
    assert_eq!(blacklist.state(&ip("127.0.0.1")), AddressState::Exempt);
}

#[test]
fn test_malformed_persisted_line_fails_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = store_path(dir.path());
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, "not-an-ip\n").expect("seed store");

    let firewall = Arc::new(RecordingFirewall::new());
    let result = provision_with(dir.path(), 3, &firewall);

    let err = result.expect_err("malformed list must abort");
    assert!(err.is_fatal());
    assert!(matches!(err, BlacklistError::InvalidStoredAddress { line: 1, .. }));
    assert!(firewall.calls().is_empty());
}

#[test]
fn test_below_threshold_never_blocks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let firewall = Arc::new(RecordingFirewall::new());
    let blacklist = provision_with(dir.path(), 4, &firewall).expect("provision");

    for _ in 0..3 {
        unauthorized(&blacklist, "198.51.100.44:1234");
    }

    assert!(firewall.calls().is_empty());
    assert_eq!(blacklist.state(&ip("198.51.100.44")), AddressState::Counting(3));
}

#[test]
fn test_fresh_count_after_block() {
    let dir = tempfile::tempdir().expect("tempdir");
    let firewall = Arc::new(RecordingFirewall::new());
    let blacklist = provision_with(dir.path(), 2, &firewall).expect("provision");
    let addr = ip("198.51.100.45");

    blacklist.record_failure(&addr);
    blacklist.record_failure(&addr);

    // The counter entry is gone; a direct count starts over at one.
    assert_eq!(blacklist.counter().count(&addr), 0);
    assert_eq!(blacklist.counter().record_failure(&addr).count, 1);
}

#[test]
fn test_store_round_trip_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = store_path(dir.path());
    let addrs = [ip("203.0.113.1"), ip("2001:db8::2"), ip("198.51.100.3")];

    let store = BlockStore::open(&path).expect("open");
    for addr in &addrs {
        store.append(addr).expect("append");
    }
    store.close();

    assert_eq!(BlockStore::load_all(&path).expect("reload"), addrs.to_vec());
}

#[test]
fn test_reconciliation_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let firewall = Arc::new(RecordingFirewall::new());

    let first = provision_with(dir.path(), 1, &firewall).expect("provision");
    first.record_failure(&ip("203.0.113.10"));
    first.record_failure(&ip("203.0.113.11"));
    first.close();
    assert_eq!(firewall.rules().len(), 2);

    // Same firewall, rules still installed.
    let second = provision_with(dir.path(), 1, &firewall).expect("reprovision");
    assert_eq!(firewall.rules().len(), 2);
    assert_eq!(firewall.calls().len(), 2);
    assert_eq!(second.blocked_count(), 2);
    second.close();

    // A firewall that lost its rules gets them back.
    let flushed = Arc::new(RecordingFirewall::new());
    let third = provision_with(dir.path(), 1, &flushed).expect("reprovision after flush");
    assert_eq!(flushed.rules(), vec![ip("203.0.113.10"), ip("203.0.113.11")]);
    assert!(third.firewall().is_blocked(&ip("203.0.113.11")).expect("query"));
}

#[test]
fn test_failed_block_retried_on_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let broken = Arc::new(RecordingFirewall::new());
    broken.fail_for(ip("203.0.113.20"));

    let first = provision_with(dir.path(), 1, &broken).expect("provision");
    first.record_failure(&ip("203.0.113.20"));
    first.close();
    assert!(broken.rules().is_empty());

    let healthy = Arc::new(RecordingFirewall::new());
    let _second = provision_with(dir.path(), 1, &healthy).expect("reprovision");
    assert_eq!(healthy.rules(), vec![ip("203.0.113.20")]);
}

#[test]
fn test_concurrent_clients() {
    let dir = tempfile::tempdir().expect("tempdir");
    let firewall = Arc::new(RecordingFirewall::new());
    let blacklist = Arc::new(provision_with(dir.path(), 5, &firewall).expect("provision"));

    let handles: Vec<_> = (1..=8u8)
        .map(|client| {
            let blacklist = Arc::clone(&blacklist);
            thread::spawn(move || {
                for port in 0..5u16 {
                    unauthorized(&blacklist, &format!("203.0.113.{client}:{port}"));
                }
                // Private peers hammering the same endpoint are ignored.
                for port in 0..20u16 {
                    unauthorized(&blacklist, &format!("10.0.0.{client}:{port}"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    let mut blocked = firewall.calls();
    blocked.sort();
    let expected: Vec<IpAddr> = (1..=8u8).map(|c| IpAddr::from([203, 0, 113, c])).collect();
    assert_eq!(blocked, expected);
    assert_eq!(blacklist.blocked_count(), 8);

    let blacklist = Arc::try_unwrap(blacklist).expect("sole owner");
    blacklist.close();
    assert_eq!(BlockStore::load_all(store_path(dir.path())).expect("reload").len(), 8);
}
