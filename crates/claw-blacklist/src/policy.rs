//! Blocking policy: decides when an address is blocked and sequences the
//! firewall call, persistence and counter reset.

use std::collections::HashSet;
use std::net::IpAddr;

use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::address::{is_exempt, parse_remote_addr};
use crate::config::BlacklistConfig;
use crate::counter::FailureCounter;
use crate::error::BlacklistResult;
use crate::firewall::FirewallBackend;
use crate::store::BlockStore;

/// HTTP status that counts as a failure.
pub const UNAUTHORIZED: u16 = 401;

/// Where an address stands in the blocking state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressState {
    /// Loopback or private address; never counted.
    Exempt,
    /// No failures recorded.
    Unseen,
    /// Failures recorded but below the threshold.
    Counting(u32),
    /// Dropped at the firewall and persisted. Terminal.
    Blocked,
}

impl AddressState {
    /// Check if the address is blocked.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked)
    }
}

/// Brute-force blocking engine.
///
/// Owns the failure counter, the firewall backend and the persisted
/// list. Shared between request handlers through an `Arc`.
#[derive(Debug)]
pub struct Blacklist {
    /// Configuration.
    config: BlacklistConfig,
    /// Consecutive failures per address.
    counter: FailureCounter,
    /// Packet filter receiving drop rules.
    firewall: Box<dyn FirewallBackend>,
    /// Persisted list, open for append.
    store: BlockStore,
    /// Addresses blocked by this process or restored at startup.
    blocked: RwLock<HashSet<IpAddr>>,
}

impl Blacklist {
    /// Reconcile the persisted list into the firewall and open it for append.
    ///
    /// The whole list is parsed before any rule is touched, so a malformed
    /// line aborts without side effects. Addresses the backend already
    /// drops are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the persisted list
    /// is unreadable or malformed, a persisted address cannot be re-applied,
    /// or the list cannot be opened for append.
    pub fn provision(
        config: BlacklistConfig,
        firewall: Box<dyn FirewallBackend>,
    ) -> BlacklistResult<Self> {
        let config = config.normalized();
        config.validate()?;

        let persisted = BlockStore::load_all(&config.file)?;
        let mut blocked = HashSet::with_capacity(persisted.len());
        let mut reapplied = 0usize;

        for ip in persisted {
            if !blocked.insert(ip) {
                continue;
            }
            if firewall.ensure_blocked(&ip)? {
                reapplied += 1;
            } else {
                debug!(ip = %ip, "Persisted IP already dropped");
            }
        }

        let store = BlockStore::open(&config.file)?;

        info!(
            file = %config.file.display(),
            threshold = config.threshold,
            backend = firewall.name(),
            persisted = blocked.len(),
            reapplied = reapplied,
            "Blacklist provisioned"
        );

        Ok(Self {
            counter: FailureCounter::new(config.threshold),
            config,
            firewall,
            store,
            blocked: RwLock::new(blocked),
        })
    }

    // ==================== Events ====================

    /// Handle an unauthorized response sent to `remote_addr` (`host:port`).
    ///
    /// Unparsable addresses are logged and ignored.
    pub fn record_unauthorized(&self, remote_addr: &str) {
        match parse_remote_addr(remote_addr) {
            Ok(ip) => {
                self.record_failure(&ip);
            }
            Err(e) => {
                error!(remote_addr = %remote_addr, error = %e, "Cannot attribute unauthorized response");
            }
        }
    }

    /// Handle a non-401 response sent to `remote_addr`.
    ///
    /// Does nothing unless `reset_on_success` is configured.
    pub fn record_success(&self, remote_addr: &str) {
        if !self.config.reset_on_success {
            return;
        }
        match parse_remote_addr(remote_addr) {
            Ok(ip) => self.record_success_for(&ip),
            Err(e) => {
                error!(remote_addr = %remote_addr, error = %e, "Cannot attribute successful response");
            }
        }
    }

    /// Dispatch on the final response status for `remote_addr`.
    pub fn observe(&self, remote_addr: &str, status: u16) {
        if status == UNAUTHORIZED {
            self.record_unauthorized(remote_addr);
        } else {
            self.record_success(remote_addr);
        }
    }

    /// Count one failure for `ip` and block it once the threshold is hit.
    pub fn record_failure(&self, ip: &IpAddr) -> AddressState {
        let ip = ip.to_canonical();

        if is_exempt(&ip) {
            return AddressState::Exempt;
        }
        if self.blocked.read().contains(&ip) {
            return AddressState::Blocked;
        }

        self.count_failure(ip)
    }

    /// Increment the count for `ip`, then settle against any block that
    /// landed after the caller's blocked-set check.
    ///
    /// A block inserts into the blocked set before it clears the counter,
    /// so an increment that follows the clear always sees the address as
    /// blocked here and removes the entry it just created.
    fn count_failure(&self, ip: IpAddr) -> AddressState {
        let tally = self.counter.record_failure(&ip);
        if self.blocked.read().contains(&ip) {
            self.counter.clear(&ip);
            return AddressState::Blocked;
        }
        if !tally.threshold_reached {
            return AddressState::Counting(tally.count);
        }

        self.block(ip, tally.count);
        AddressState::Blocked
    }

    /// Forget failures for `ip` if `reset_on_success` is configured.
    pub fn record_success_for(&self, ip: &IpAddr) {
        if !self.config.reset_on_success {
            return;
        }
        let ip = ip.to_canonical();
        if self.counter.clear(&ip) {
            debug!(ip = %ip, "Failure count reset after success");
        }
    }

    /// Firewall, then persistence, then counter reset.
    ///
    /// A failed rule install is still persisted so the next startup retries
    /// it; a failed append does not undo the rule.
    fn block(&self, ip: IpAddr, failures: u32) {
        self.blocked.write().insert(ip);

        if let Err(e) = self.firewall.block(&ip) {
            error!(ip = %ip, error = %e, "Failed to install drop rule, will retry on restart");
        }
        if let Err(e) = self.store.append(&ip) {
            error!(ip = %ip, error = %e, "Failed to persist blocked IP");
        }
        self.counter.clear(&ip);

        info!(ip = %ip, failures = failures, "IP blocked");
    }

    // ==================== Queries ====================

    /// Current state of `ip`.
    #[must_use]
    pub fn state(&self, ip: &IpAddr) -> AddressState {
        let ip = ip.to_canonical();
        if is_exempt(&ip) {
            AddressState::Exempt
        } else if self.blocked.read().contains(&ip) {
            AddressState::Blocked
        } else {
            match self.counter.count(&ip) {
                0 => AddressState::Unseen,
                n => AddressState::Counting(n),
            }
        }
    }

    /// Number of blocked addresses, restored ones included.
    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.blocked.read().len()
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &BlacklistConfig {
        &self.config
    }

    /// Get a reference to the failure counter.
    #[must_use]
    pub const fn counter(&self) -> &FailureCounter {
        &self.counter
    }

    /// Get a reference to the firewall backend.
    #[must_use]
    pub fn firewall(&self) -> &dyn FirewallBackend {
        self.firewall.as_ref()
    }

    /// Release the persisted list. Close failures are logged only.
    pub fn close(self) {
        let blocked = self.blocked.read().len();
        self.store.close();
        info!(blocked = blocked, "Blacklist closed");
    }
}
