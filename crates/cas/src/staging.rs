//! Staging: in-progress blob writes that are hashed as they stream.
//!
//! A staging blob is a dot-prefixed temp file inside the blob directory, so
//! sealing it is a same-filesystem rename. Bytes are fed to the SHA-256
//! hasher as they are written; nothing is re-read when sealing.
//!
//! Layout:
//! ```text
//! {blobs}/
//! ├── sha256-3f2a...        # Sealed content
//! └── .partial-Xk2P9a       # In-progress content
//! ```
//!
//! A staging blob dropped without being sealed deletes its temp file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest as _, Sha256};
use tempfile::NamedTempFile;

use crate::digest::Digest;
use crate::error::CasError;

/// Filename prefix for staging files. Never parses as a digest.
pub const PARTIAL_PREFIX: &str = ".partial-";

/// A blob being written. Implements `io::Write`.
#[derive(Debug)]
pub struct StagingBlob {
    file: NamedTempFile,
    hasher: Sha256,
    bytes_written: u64,
}

impl StagingBlob {
    pub(crate) fn create_in(dir: &Path) -> Result<Self, CasError> {
        let file = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempfile_in(dir)
            .map_err(CasError::io("failed to create staging file", dir))?;

        Ok(Self {
            file,
            hasher: Sha256::new(),
            bytes_written: 0,
        })
    }

    /// Path of the staging file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush and fsync, then hand back the temp file with its digest and size.
    pub(crate) fn finish(mut self) -> Result<(NamedTempFile, Digest, u64), CasError> {
        let path = self.file.path().to_path_buf();
        self.file
            .flush()
            .and_then(|()| self.file.as_file().sync_all())
            .map_err(CasError::io("failed to sync staging file", &path))?;

        Ok((self.file, Digest::from_hasher(self.hasher), self.bytes_written))
    }
}

impl Write for StagingBlob {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// A staging file left behind in the blob directory.
#[derive(Debug, Clone)]
pub struct Partial {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl Partial {
    /// Whether this partial has been untouched for longer than `grace`.
    pub fn is_stale(&self, grace: Duration, now: SystemTime) -> bool {
        now.duration_since(self.modified)
            .map(|age| age > grace)
            .unwrap_or(false)
    }
}

/// List staging leftovers in `dir`. Entries that vanish mid-scan are skipped.
pub(crate) fn list_partials(dir: &Path) -> Result<Vec<Partial>, CasError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CasError::io("failed to read blob directory", dir)(e)),
    };

    let mut partials = Vec::new();
    for entry in entries.flatten() {
        let is_partial = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(PARTIAL_PREFIX));
        if !is_partial {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            partials.push(Partial {
                path: entry.path(),
                modified,
            });
        }
    }
    Ok(partials)
}
