//! Append-only persisted list of blocked addresses.
//!
//! The file holds one address per line. It is read once at startup to
//! reconcile the firewall, then opened for append so every new block is
//! recorded. Nothing is ever rewritten or removed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::address::parse_client_address;
use crate::error::{BlacklistError, BlacklistResult};

/// Lazy reader over a persisted list.
///
/// Yields each non-blank line parsed as an address. A malformed line
/// yields `BlacklistError::InvalidStoredAddress`. Call [`BlockStore::load`]
/// again to restart from the top.
#[derive(Debug)]
pub struct StoredAddresses {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    line_no: usize,
}

impl StoredAddresses {
    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            lines: None,
            line_no: 0,
        }
    }

    /// The file being read.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for StoredAddresses {
    type Item = BlacklistResult<IpAddr>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(BlacklistError::Io(e))),
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return Some(parse_client_address(trimmed).map_err(|_| {
                BlacklistError::InvalidStoredAddress {
                    path: self.path.clone(),
                    line: self.line_no,
                    value: trimmed.to_string(),
                }
            }));
        }
    }
}

/// Writable handle on the persisted list.
#[derive(Debug)]
pub struct BlockStore {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl BlockStore {
    /// Read the persisted list at `path`.
    ///
    /// A missing file is an empty list.
    ///
    /// # Errors
    ///
    /// Returns `BlacklistError::Io` if the file exists but cannot be opened.
    pub fn load(path: impl AsRef<Path>) -> BlacklistResult<StoredAddresses> {
        let path = path.as_ref().to_path_buf();
        match File::open(&path) {
            Ok(file) => Ok(StoredAddresses {
                path,
                lines: Some(BufReader::new(file).lines()),
                line_no: 0,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No persisted block list, starting empty");
                Ok(StoredAddresses::empty(path))
            }
            Err(e) => Err(BlacklistError::Io(e)),
        }
    }

    /// Read and validate the whole persisted list.
    ///
    /// # Errors
    ///
    /// Returns the first read or parse error encountered.
    pub fn load_all(path: impl AsRef<Path>) -> BlacklistResult<Vec<IpAddr>> {
        Self::load(path)?.collect()
    }

    /// Open the persisted list for append, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `BlacklistError::StoreOpen` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> BlacklistResult<Self> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| BlacklistError::StoreOpen {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one address as a new line.
    ///
    /// # Errors
    ///
    /// Returns `BlacklistError::Io` if the write or flush fails.
    pub fn append(&self, ip: &IpAddr) -> BlacklistResult<()> {
        let line = format!("{ip}\n");
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        debug!(ip = %ip, path = %self.path.display(), "Persisted blocked IP");
        Ok(())
    }

    /// The persisted list location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush, sync and release the file. Failures are logged only.
    pub fn close(self) {
        let path = self.path;
        let file = match self.writer.into_inner().into_inner() {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e.error(), "Failed to flush block store");
                return;
            }
        };
        if let Err(e) = file.sync_all() {
            warn!(path = %path.display(), error = %e, "Failed to sync block store");
        }
    }
}
