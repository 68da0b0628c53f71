//! Per-request status observation for host HTTP runtimes.
//!
//! A host wraps its response writer in a [`ResponseWatch`] and forwards the
//! header and body writes to it. The watch reports the final status to the
//! [`Blacklist`] exactly once per request, no matter how many times the
//! host attempts to write headers.

use crate::policy::Blacklist;

/// Status implied by a body write that precedes any header write.
pub const IMPLICIT_STATUS: u16 = 200;

/// Reports one response status per request to a [`Blacklist`].
#[derive(Debug)]
pub struct ResponseWatch<'a> {
    blacklist: &'a Blacklist,
    remote_addr: &'a str,
    status: Option<u16>,
}

impl<'a> ResponseWatch<'a> {
    /// Watch the response to a request from `remote_addr` (`host:port`).
    #[must_use]
    pub const fn new(blacklist: &'a Blacklist, remote_addr: &'a str) -> Self {
        Self {
            blacklist,
            remote_addr,
            status: None,
        }
    }

    /// Record the response status.
    ///
    /// Only the first call is reported; returns whether this call was it.
    pub fn write_header(&mut self, status: u16) -> bool {
        if self.status.is_some() {
            return false;
        }
        self.status = Some(status);
        self.blacklist.observe(self.remote_addr, status);
        true
    }

    /// Record a body write, implying a 200 status if none was written.
    pub fn write_body(&mut self) {
        if self.status.is_none() {
            self.write_header(IMPLICIT_STATUS);
        }
    }

    /// The status reported so far.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlacklistConfig;
    use crate::firewall::RecordingFirewall;
    use crate::policy::{AddressState, UNAUTHORIZED};
    use std::net::IpAddr;
    use std::sync::Arc;

    fn setup(dir: &std::path::Path, threshold: u32) -> (Blacklist, Arc<RecordingFirewall>) {
        let firewall = Arc::new(RecordingFirewall::new());
        let config = BlacklistConfig::builder()
            .file(dir.join("blocked"))
            .threshold(threshold)
            .build();
        let blacklist = Blacklist::provision(config, Box::new(Arc::clone(&firewall))).unwrap();
        (blacklist, firewall)
    }

    #[test]
    fn test_repeated_header_writes_signal_once() {
        let dir = tempfile::tempdir().unwrap();
        let (blacklist, _) = setup(dir.path(), 5);
        let addr: IpAddr = "203.0.113.5".parse().unwrap();

        let mut watch = ResponseWatch::new(&blacklist, "203.0.113.5:5555");
        assert!(watch.write_header(UNAUTHORIZED));
        assert!(!watch.write_header(UNAUTHORIZED));
        assert!(!watch.write_header(UNAUTHORIZED));
        assert_eq!(watch.status(), Some(UNAUTHORIZED));

        assert_eq!(blacklist.state(&addr), AddressState::Counting(1));
    }

    #[test]
    fn test_body_write_implies_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (blacklist, _) = setup(dir.path(), 1);
        let addr: IpAddr = "203.0.113.5".parse().unwrap();

        let mut watch = ResponseWatch::new(&blacklist, "203.0.113.5:5555");
        watch.write_body();
        assert_eq!(watch.status(), Some(IMPLICIT_STATUS));

        // A late 401 after the implicit 200 is ignored.
        assert!(!watch.write_header(UNAUTHORIZED));
        assert_eq!(blacklist.state(&addr), AddressState::Unseen);
    }

    #[test]
    fn test_body_after_header_keeps_status() {
        let dir = tempfile::tempdir().unwrap();
        let (blacklist, firewall) = setup(dir.path(), 1);

        let mut watch = ResponseWatch::new(&blacklist, "203.0.113.5:5555");
        watch.write_header(UNAUTHORIZED);
        watch.write_body();
        watch.write_body();

        assert_eq!(watch.status(), Some(UNAUTHORIZED));
        assert_eq!(firewall.calls().len(), 1);
    }

    #[test]
    fn test_one_watch_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let (blacklist, firewall) = setup(dir.path(), 3);

        for port in 0..3 {
            let remote = format!("198.51.100.9:{port}");
            let mut watch = ResponseWatch::new(&blacklist, &remote);
            watch.write_header(UNAUTHORIZED);
            watch.write_body();
        }

        assert_eq!(firewall.calls(), vec!["198.51.100.9".parse::<IpAddr>().unwrap()]);
    }
}
