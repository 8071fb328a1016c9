//! Errors surfaced by the content store.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CasError {
    #[error("{context} ({}): {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CasError {
    /// Build a `map_err` adapter that tags an I/O error with context and path.
    pub(crate) fn io(context: &'static str, path: &Path) -> impl FnOnce(io::Error) -> CasError {
        let path = path.to_path_buf();
        move |source| CasError::Io {
            context,
            path,
            source,
        }
    }
}
