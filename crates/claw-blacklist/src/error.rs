//! Error types for the blacklist engine.

use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while provisioning or running the blacklist.
#[derive(Debug, Error)]
pub enum BlacklistError {
    /// The packet-filter subsystem could not be reached.
    #[error("Firewall backend unavailable: {0}")]
    FirewallUnavailable(String),

    /// Installing or querying a drop rule failed.
    #[error("Firewall rule for {ip} failed: {message}")]
    Firewall {
        /// The address the rule was for.
        ip: IpAddr,
        /// Backend-specific failure detail.
        message: String,
    },

    /// A non-blank line of the persisted list is not an IP address.
    #[error("Invalid address {value:?} at {path}:{line}")]
    InvalidStoredAddress {
        /// The persisted list file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// The offending line, trimmed.
        value: String,
    },

    /// The persisted list could not be opened for append.
    #[error("Cannot open block store {path}: {source}")]
    StoreOpen {
        /// The persisted list file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The remote address could not be split into host and port.
    #[error("Invalid remote address: {0}")]
    InvalidRemoteAddr(String),

    /// The host part is not a valid IP address.
    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration could not be deserialized.
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlacklistError {
    /// Whether this error must abort startup.
    ///
    /// Per-event errors (a bad remote address, one failed rule install) are
    /// logged and processing continues.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FirewallUnavailable(_)
                | Self::InvalidStoredAddress { .. }
                | Self::StoreOpen { .. }
                | Self::Config(_)
                | Self::ConfigParse(_)
        )
    }
}

/// Result type for blacklist operations.
pub type BlacklistResult<T> = Result<T, BlacklistError>;
