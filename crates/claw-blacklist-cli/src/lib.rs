//! # claw-blacklist-cli
//!
//! Operator commands for the claw-blacklist engine:
//! - `reconcile` replays the persisted list into the firewall
//! - `check` validates configuration and the persisted list
//! - `list` prints the blocked addresses

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, ConfigArgs, Format};
