//! Digest: a SHA-256 content digest in `sha256:<64 hex chars>` form.
//!
//! Blob files are named with the colon swapped for a hyphen
//! (`sha256-<hex>`), so both spellings parse to the same digest.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The only digest algorithm the store understands.
pub const ALGORITHM: &str = "sha256";

const HEX_LEN: usize = 64;

/// A content digest - always lowercase `sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

/// Errors that can occur when parsing a digest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("unsupported digest {0:?}: expected sha256:<hex>")]
    UnsupportedAlgorithm(String),

    #[error("invalid digest length: expected 64 hex chars, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character in digest")]
    InvalidHex,
}

impl Digest {
    /// Hash data and return its digest.
    pub fn from_data(data: &[u8]) -> Self {
        Self::from_hasher(Sha256::new_with_prefix(data))
    }

    /// Finish an incremental hash.
    pub(crate) fn from_hasher(hasher: Sha256) -> Self {
        Self(format!("{ALGORITHM}:{}", hex::encode(hasher.finalize())))
    }

    /// Parse `sha256:<hex>` or the on-disk `sha256-<hex>` spelling.
    pub fn parse(s: &str) -> Result<Self, DigestError> {
        let hex_part = s
            .strip_prefix("sha256:")
            .or_else(|| s.strip_prefix("sha256-"))
            .ok_or_else(|| DigestError::UnsupportedAlgorithm(s.to_string()))?;

        if hex_part.len() != HEX_LEN {
            return Err(DigestError::InvalidLength(hex_part.len()));
        }
        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DigestError::InvalidHex);
        }

        Ok(Self(format!("{ALGORITHM}:{}", hex_part.to_ascii_lowercase())))
    }

    /// Recover a digest from a blob filename, if it is one.
    pub fn from_filename(name: &str) -> Option<Self> {
        if !name.starts_with("sha256-") {
            return None;
        }
        Self::parse(name).ok()
    }

    /// The hex portion without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.0[ALGORITHM.len() + 1..]
    }

    /// Filename used for the blob on disk.
    pub fn filename(&self) -> String {
        format!("{ALGORITHM}-{}", self.hex())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
