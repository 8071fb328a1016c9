//! Store errors and how they map onto request outcomes.

use std::io;
use std::path::{Path, PathBuf};

use cas::{CasError, Digest};
use thiserror::Error;

use crate::name::{ModelName, NameError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("model '{0}' not found")]
    NotFound(ModelName),

    #[error("invalid model name: {0}")]
    InvalidName(#[from] NameError),

    #[error("manifest {} is corrupt: {source}", path.display())]
    CorruptManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("manifest references missing blob {0}")]
    MissingBlob(Digest),

    #[error("{context} ({}): {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Blob(#[from] CasError),
}

/// Coarse classification for the request layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidName,
    Internal,
}

impl StoreError {
    pub(crate) fn io(context: &'static str, path: &Path) -> impl FnOnce(io::Error) -> StoreError {
        let path = path.to_path_buf();
        move |source| StoreError::Io {
            context,
            path,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::InvalidName(_) => ErrorKind::InvalidName,
            StoreError::CorruptManifest { .. }
            | StoreError::MissingBlob(_)
            | StoreError::Io { .. }
            | StoreError::Blob(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Response for a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Done,
    NotFound,
    InvalidName,
    InternalError,
}

impl DeleteStatus {
    pub fn from_result<T>(result: &Result<T, StoreError>) -> Self {
        match result {
            Ok(_) => DeleteStatus::Done,
            Err(err) => match err.kind() {
                ErrorKind::NotFound => DeleteStatus::NotFound,
                ErrorKind::InvalidName => DeleteStatus::InvalidName,
                ErrorKind::Internal => DeleteStatus::InternalError,
            },
        }
    }
}
