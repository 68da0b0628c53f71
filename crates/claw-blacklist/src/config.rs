//! Blacklist configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BlacklistError, BlacklistResult};

/// Threshold used when none (or zero) is configured.
pub const DEFAULT_THRESHOLD: u32 = 5;

/// Configuration for the iptables backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FirewallConfig {
    /// Table holding the drop rules.
    pub table: String,
    /// Chain on the inbound path the rules are appended to.
    pub chain: String,
    /// Path or name of the IPv4 tool.
    pub iptables: String,
    /// Path or name of the IPv6 tool.
    pub ip6tables: String,
    /// Fail initialisation when the IPv6 tool is unreachable.
    pub require_ipv6: bool,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            table: "filter".to_string(),
            chain: "INPUT".to_string(),
            iptables: "iptables".to_string(),
            ip6tables: "ip6tables".to_string(),
            require_ipv6: false,
        }
    }
}

/// Main blacklist configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlacklistConfig {
    /// Persisted list of blocked addresses, one per line.
    pub file: PathBuf,
    /// Consecutive unauthorized responses that trigger a block.
    pub threshold: u32,
    /// Forget an address's failures when it gets a non-401 response.
    pub reset_on_success: bool,
    /// Firewall backend settings.
    pub firewall: FirewallConfig,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::new(),
            threshold: DEFAULT_THRESHOLD,
            reset_on_success: false,
            firewall: FirewallConfig::default(),
        }
    }
}

impl BlacklistConfig {
    /// Create a configuration persisting to `file` with default settings.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    /// Create a new builder for blacklist configuration.
    #[must_use]
    pub fn builder() -> BlacklistConfigBuilder {
        BlacklistConfigBuilder::default()
    }

    /// Parse a JSON document, apply defaults and validate.
    ///
    /// # Errors
    ///
    /// Returns `BlacklistError::ConfigParse` for malformed JSON or unknown
    /// keys, `BlacklistError::Config` if validation fails.
    pub fn from_json(json: &str) -> BlacklistResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// configuration.
    pub fn from_file(path: impl AsRef<Path>) -> BlacklistResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            BlacklistError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Replace an unset (zero) threshold with the default.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.threshold == 0 {
            self.threshold = DEFAULT_THRESHOLD;
        }
        self
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `BlacklistError::Config` describing the first problem found.
    pub fn validate(&self) -> BlacklistResult<()> {
        if self.file.as_os_str().is_empty() {
            return Err(BlacklistError::Config("file must be set".into()));
        }
        if self.threshold == 0 {
            return Err(BlacklistError::Config("threshold must be positive".into()));
        }
        if self.firewall.chain.trim().is_empty() {
            return Err(BlacklistError::Config("firewall.chain must be set".into()));
        }
        if self.firewall.table.trim().is_empty() {
            return Err(BlacklistError::Config("firewall.table must be set".into()));
        }
        Ok(())
    }
}

/// Builder for `BlacklistConfig`.
#[derive(Debug, Clone, Default)]
pub struct BlacklistConfigBuilder {
    config: BlacklistConfig,
}

impl BlacklistConfigBuilder {
    /// Set the persisted list location.
    #[must_use]
    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.config.file = file.into();
        self
    }

    /// Set the block threshold.
    #[must_use]
    pub const fn threshold(mut self, threshold: u32) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Enable or disable reset-on-success.
    #[must_use]
    pub const fn reset_on_success(mut self, reset: bool) -> Self {
        self.config.reset_on_success = reset;
        self
    }

    /// Set firewall configuration.
    #[must_use]
    pub fn firewall(mut self, config: FirewallConfig) -> Self {
        self.config.firewall = config;
        self
    }

    /// Build the configuration, applying defaults.
    #[must_use]
    pub fn build(self) -> BlacklistConfig {
        self.config.normalized()
    }
}
