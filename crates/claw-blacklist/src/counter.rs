//! Per-address consecutive failure counting.

use std::net::IpAddr;

use dashmap::DashMap;
use tracing::debug;

/// Outcome of recording one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTally {
    /// Count after this failure.
    pub count: u32,
    /// True only for the failure that moved the count onto the threshold.
    pub threshold_reached: bool,
}

/// Concurrency-safe failure counts keyed by address.
///
/// The map is sharded, so updates for unrelated addresses do not contend
/// on a single lock. Each increment and its threshold test happen under
/// the shard lock for that address.
#[derive(Debug)]
pub struct FailureCounter {
    counts: DashMap<IpAddr, u32>,
    threshold: u32,
}

impl FailureCounter {
    /// Create a counter that reports a crossing at `threshold` failures.
    ///
    /// A threshold of zero is treated as one.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            counts: DashMap::new(),
            threshold: threshold.max(1),
        }
    }

    /// Record one failure for `ip`.
    ///
    /// Exactly one caller observes `threshold_reached` for a given crossing,
    /// even under concurrent updates. Increments after the crossing keep
    /// counting but do not report it again until the entry is cleared.
    pub fn record_failure(&self, ip: &IpAddr) -> FailureTally {
        let mut entry = self.counts.entry(*ip).or_insert(0);
        let before = *entry;
        let count = before.saturating_add(1);
        *entry = count;

        let threshold_reached = before < self.threshold && count >= self.threshold;
        debug!(ip = %ip, count, threshold = self.threshold, "Failure recorded");

        FailureTally {
            count,
            threshold_reached,
        }
    }

    /// Forget all failures for `ip`. Returns whether an entry existed.
    pub fn clear(&self, ip: &IpAddr) -> bool {
        self.counts.remove(ip).is_some()
    }

    /// Current count for `ip` (zero when untracked).
    #[must_use]
    pub fn count(&self, ip: &IpAddr) -> u32 {
        self.counts.get(ip).map_or(0, |c| *c)
    }

    /// Number of addresses with a live count.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.counts.len()
    }

    /// The configured threshold.
    #[must_use]
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }
}
