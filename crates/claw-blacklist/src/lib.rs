//! # claw-blacklist
//!
//! Brute-force mitigation for Clawbernetes HTTP endpoints.
//!
//! The engine watches the status of every response. Each unauthorized
//! (401) response counts against the client address; once an address
//! reaches the configured threshold it is dropped at the firewall and
//! written to a persisted list, so the block survives restarts.
//!
//! ## Components
//!
//! - [`BlockStore`] - Append-only persisted list of blocked addresses
//! - [`FirewallBackend`] - Drop-rule capability ([`IptablesFirewall`], [`RecordingFirewall`])
//! - [`FailureCounter`] - Sharded per-address consecutive failure counts
//! - [`Blacklist`] - Exemption, threshold and block sequencing
//! - [`ResponseWatch`] - One status signal per request for host runtimes
//!
//! Loopback and private-range addresses are never counted. Blocks are
//! permanent.
//!
//! # Example
//!
//! ```rust
//! use claw_blacklist::{AddressState, Blacklist, BlacklistConfig, RecordingFirewall};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = BlacklistConfig::builder()
//!     .file(dir.path().join("blocked"))
//!     .threshold(3)
//!     .build();
//!
//! // Replays the persisted list into the firewall before serving.
//! let blacklist = Blacklist::provision(config, Box::new(RecordingFirewall::new())).unwrap();
//!
//! for _ in 0..3 {
//!     blacklist.observe("203.0.113.5:41000", 401);
//! }
//!
//! let ip = "203.0.113.5".parse().unwrap();
//! assert_eq!(blacklist.state(&ip), AddressState::Blocked);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod config;
pub mod counter;
pub mod error;
pub mod firewall;
pub mod observer;
pub mod policy;
pub mod store;

// Re-export main types
pub use address::{is_exempt, parse_client_address, parse_remote_addr, split_host_port};
pub use config::{BlacklistConfig, BlacklistConfigBuilder, FirewallConfig, DEFAULT_THRESHOLD};
pub use counter::{FailureCounter, FailureTally};
pub use error::{BlacklistError, BlacklistResult};
pub use firewall::{FirewallBackend, IptablesFirewall, RecordingFirewall};
pub use observer::ResponseWatch;
pub use policy::{AddressState, Blacklist, UNAUTHORIZED};
pub use store::{BlockStore, StoredAddresses};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::BlacklistConfig;
    pub use crate::error::{BlacklistError, BlacklistResult};
    pub use crate::firewall::{FirewallBackend, IptablesFirewall, RecordingFirewall};
    pub use crate::observer::ResponseWatch;
    pub use crate::policy::{AddressState, Blacklist};
}
