//! Command implementations.
//!
//! Each command writes its report to the given writer; logging goes
//! through `tracing`.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use claw_blacklist::{
    Blacklist, BlacklistConfig, BlockStore, FirewallBackend, IptablesFirewall, RecordingFirewall,
};

use crate::cli::Format;

/// Load and validate the configuration at `path`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid.
pub fn load_config(path: &Path) -> Result<BlacklistConfig> {
    BlacklistConfig::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// Replay the persisted list into the firewall.
///
/// With `dry_run` the list is only read: a recording backend stands in
/// for iptables, the addresses it would have blocked are printed, and
/// nothing is created or written on disk.
///
/// # Errors
///
/// Returns an error if the configuration or persisted list is invalid, or
/// a persisted address cannot be re-applied.
pub fn reconcile<W: Write>(out: &mut W, config_path: &Path, dry_run: bool) -> Result<()> {
    let config = load_config(config_path)?;

    if dry_run {
        let addresses = BlockStore::load_all(&config.file)
            .with_context(|| format!("invalid persisted list {}", config.file.display()))?;
        let recorder = RecordingFirewall::new();
        let mut persisted = HashSet::with_capacity(addresses.len());

        for ip in addresses {
            if persisted.insert(ip) && recorder.ensure_blocked(&ip)? {
                writeln!(out, "would block {ip}")?;
            }
        }
        writeln!(out, "{} persisted addresses (dry run)", persisted.len())?;
        return Ok(());
    }

    let firewall = IptablesFirewall::new(&config.firewall).context("firewall unavailable")?;
    let backend = firewall.name();
    let blacklist =
        Blacklist::provision(config, Box::new(firewall)).context("reconciliation failed")?;

    let enforced = blacklist.blocked_count();
    info!(enforced, backend, "Reconciliation complete");
    writeln!(out, "{enforced} persisted addresses enforced via {backend}")?;
    blacklist.close();
    Ok(())
}

/// Validate the configuration and parse the whole persisted list.
///
/// # Errors
///
/// Returns an error describing the first problem found.
pub fn check<W: Write>(out: &mut W, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let addresses = BlockStore::load_all(&config.file)
        .with_context(|| format!("invalid persisted list {}", config.file.display()))?;

    writeln!(out, "configuration ok")?;
    writeln!(out, "  file:             {}", config.file.display())?;
    writeln!(out, "  threshold:        {}", config.threshold)?;
    writeln!(out, "  reset on success: {}", config.reset_on_success)?;
    writeln!(out, "  firewall:         {}/{}", config.firewall.table, config.firewall.chain)?;
    writeln!(out, "  persisted:        {}", addresses.len())?;
    Ok(())
}

/// Print the persisted addresses in file order.
///
/// # Errors
///
/// Returns an error if the configuration or persisted list is invalid.
pub fn list<W: Write>(out: &mut W, config_path: &Path, format: Format) -> Result<()> {
    let config = load_config(config_path)?;
    let addresses = BlockStore::load_all(&config.file)
        .with_context(|| format!("invalid persisted list {}", config.file.display()))?;

    match format {
        Format::Text => {
            for ip in &addresses {
                writeln!(out, "{ip}")?;
            }
        }
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, &addresses)
                .context("JSON serialization failed")?;
            writeln!(out)?;
        }
    }
    Ok(())
}
