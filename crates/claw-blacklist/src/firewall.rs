//! Firewall backends that install per-address drop rules.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::process::{Command, Output};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::FirewallConfig;
use crate::error::{BlacklistError, BlacklistResult};

/// Capability to drop all inbound traffic from a single address.
pub trait FirewallBackend: Send + Sync + fmt::Debug {
    /// Backend identifier used in logs.
    fn name(&self) -> &'static str;

    /// Install a drop rule for `ip`.
    ///
    /// Installing a rule that already exists succeeds without adding a
    /// duplicate.
    ///
    /// # Errors
    ///
    /// Returns `BlacklistError::Firewall` if the rule could not be installed.
    fn block(&self, ip: &IpAddr) -> BlacklistResult<()>;

    /// Whether a drop rule for `ip` is currently installed.
    ///
    /// # Errors
    ///
    /// Returns `BlacklistError::Firewall` if the rule set could not be queried.
    fn is_blocked(&self, ip: &IpAddr) -> BlacklistResult<bool>;

    /// Install a drop rule for `ip` unless one exists.
    ///
    /// Returns whether a rule was added. Backends whose `block` already
    /// checks for the rule override this to avoid querying twice.
    ///
    /// # Errors
    ///
    /// Returns `BlacklistError::Firewall` if the query or install fails.
    fn ensure_blocked(&self, ip: &IpAddr) -> BlacklistResult<bool> {
        if self.is_blocked(ip)? {
            return Ok(false);
        }
        self.block(ip)?;
        Ok(true)
    }
}

impl<T: FirewallBackend + ?Sized> FirewallBackend for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn block(&self, ip: &IpAddr) -> BlacklistResult<()> {
        (**self).block(ip)
    }

    fn is_blocked(&self, ip: &IpAddr) -> BlacklistResult<bool> {
        (**self).is_blocked(ip)
    }

    fn ensure_blocked(&self, ip: &IpAddr) -> BlacklistResult<bool> {
        (**self).ensure_blocked(ip)
    }
}

// ─────────────────────────────────────────────────────────────
// iptables
// ─────────────────────────────────────────────────────────────

/// Exit status iptables uses when `-C` finds no matching rule.
const RULE_NOT_FOUND: i32 = 1;

/// Drop rules managed through the host `iptables` / `ip6tables` tools.
#[derive(Debug)]
pub struct IptablesFirewall {
    config: FirewallConfig,
    ipv6_available: bool,
}

impl IptablesFirewall {
    /// Probe the packet filter and create the backend.
    ///
    /// # Errors
    ///
    /// Returns `BlacklistError::FirewallUnavailable` if the IPv4 tool cannot
    /// list the configured chain, or the IPv6 tool cannot while
    /// `require_ipv6` is set.
    pub fn new(config: &FirewallConfig) -> BlacklistResult<Self> {
        probe(&config.iptables, config).map_err(BlacklistError::FirewallUnavailable)?;

        let ipv6_available = match probe(&config.ip6tables, config) {
            Ok(()) => true,
            Err(e) if config.require_ipv6 => return Err(BlacklistError::FirewallUnavailable(e)),
            Err(e) => {
                warn!(error = %e, "ip6tables unavailable, IPv6 addresses cannot be blocked");
                false
            }
        };

        info!(
            table = %config.table,
            chain = %config.chain,
            ipv6 = ipv6_available,
            "iptables firewall ready"
        );

        Ok(Self {
            config: config.clone(),
            ipv6_available,
        })
    }

    /// Whether IPv6 rules can be installed.
    #[must_use]
    pub const fn ipv6_available(&self) -> bool {
        self.ipv6_available
    }

    fn tool_for(&self, ip: &IpAddr) -> BlacklistResult<&str> {
        match ip {
            IpAddr::V4(_) => Ok(self.config.iptables.as_str()),
            IpAddr::V6(_) if self.ipv6_available => Ok(self.config.ip6tables.as_str()),
            IpAddr::V6(_) => Err(BlacklistError::Firewall {
                ip: *ip,
                message: "ip6tables unavailable".into(),
            }),
        }
    }

    fn run(&self, ip: &IpAddr, op: &str) -> BlacklistResult<Output> {
        let tool = self.tool_for(ip)?;
        let args = drop_rule_args(&self.config, op, ip);
        Command::new(tool)
            .args(&args)
            .output()
            .map_err(|e| BlacklistError::Firewall {
                ip: *ip,
                message: format!("failed to execute {tool}: {e}"),
            })
    }
}

impl FirewallBackend for IptablesFirewall {
    fn name(&self) -> &'static str {
        "iptables"
    }

    fn block(&self, ip: &IpAddr) -> BlacklistResult<()> {
        self.ensure_blocked(ip).map(|_| ())
    }

    fn ensure_blocked(&self, ip: &IpAddr) -> BlacklistResult<bool> {
        if self.is_blocked(ip)? {
            debug!(ip = %ip, "Drop rule already present");
            return Ok(false);
        }

        let output = self.run(ip, "-A")?;
        if output.status.success() {
            info!(ip = %ip, chain = %self.config.chain, "Added drop rule");
            Ok(true)
        } else {
            Err(BlacklistError::Firewall {
                ip: *ip,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn is_blocked(&self, ip: &IpAddr) -> BlacklistResult<bool> {
        let output = self.run(ip, "-C")?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(RULE_NOT_FOUND) => Ok(false),
            _ => Err(BlacklistError::Firewall {
                ip: *ip,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

/// Arguments for a drop-rule operation (`-A` or `-C`) on `ip`.
fn drop_rule_args(config: &FirewallConfig, op: &str, ip: &IpAddr) -> Vec<String> {
    vec![
        "-w".to_string(),
        "-t".to_string(),
        config.table.clone(),
        op.to_string(),
        config.chain.clone(),
        "-s".to_string(),
        ip.to_string(),
        "-j".to_string(),
        "DROP".to_string(),
    ]
}

/// Check that `tool` can list the configured chain.
fn probe(tool: &str, config: &FirewallConfig) -> Result<(), String> {
    let output = Command::new(tool)
        .args(["-w", "-t", config.table.as_str(), "-n", "-L", config.chain.as_str()])
        .output()
        .map_err(|e| format!("{tool}: {e}"))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("{tool}: {}", stderr.trim()))
    }
}

// ─────────────────────────────────────────────────────────────
// Recording backend
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<IpAddr>,
    rules: Vec<IpAddr>,
    failing: HashSet<IpAddr>,
    unreachable: bool,
}

/// In-memory backend that records every block request.
///
/// Used by tests and dry runs. Addresses marked with [`fail_for`] return
/// an error from [`FirewallBackend::block`] instead of installing a rule;
/// [`set_unreachable`] makes every operation fail as if the packet filter
/// were gone.
///
/// [`fail_for`]: RecordingFirewall::fail_for
/// [`set_unreachable`]: RecordingFirewall::set_unreachable
#[derive(Debug, Default)]
pub struct RecordingFirewall {
    state: Mutex<RecordingState>,
}

impl RecordingFirewall {
    /// Create an empty recording backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with rules already installed.
    #[must_use]
    pub fn with_rules(rules: impl IntoIterator<Item = IpAddr>) -> Self {
        let firewall = Self::new();
        {
            let mut state = firewall.state.lock();
            for ip in rules {
                if !state.rules.contains(&ip) {
                    state.rules.push(ip);
                }
            }
        }
        firewall
    }

    /// Make every future block of `ip` fail.
    pub fn fail_for(&self, ip: IpAddr) {
        self.state.lock().failing.insert(ip);
    }

    /// Simulate the packet filter disappearing (or coming back).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Every address passed to `block`, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<IpAddr> {
        self.state.lock().calls.clone()
    }

    /// Installed rules, in installation order.
    #[must_use]
    pub fn rules(&self) -> Vec<IpAddr> {
        self.state.lock().rules.clone()
    }
}

impl FirewallBackend for RecordingFirewall {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn block(&self, ip: &IpAddr) -> BlacklistResult<()> {
        let mut state = self.state.lock();
        state.calls.push(*ip);

        if state.unreachable {
            return Err(BlacklistError::FirewallUnavailable("recording backend unreachable".into()));
        }
        if state.failing.contains(ip) {
            return Err(BlacklistError::Firewall {
                ip: *ip,
                message: "simulated failure".into(),
            });
        }

        if state.rules.contains(ip) {
            debug!(ip = %ip, "Drop rule already present");
        } else {
            state.rules.push(*ip);
        }
        Ok(())
    }

    fn is_blocked(&self, ip: &IpAddr) -> BlacklistResult<bool> {
        let state = self.state.lock();
        if state.unreachable {
            return Err(BlacklistError::FirewallUnavailable("recording backend unreachable".into()));
        }
        Ok(state.rules.contains(ip))
    }
}
