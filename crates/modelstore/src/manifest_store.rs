//! ManifestStore: one JSON file per resolved model name.
//!
//! Layout:
//! ```text
//! {manifests}/
//! └── registry.ollama.ai/
//!     └── library/
//!         └── test/
//!             ├── latest            # Manifest JSON
//!             └── .manifest-Xk2P9a  # In-flight write, renamed over `latest`
//! ```
//!
//! The filesystem is the only source of truth; nothing is cached between
//! calls.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::manifest::Manifest;
use crate::name::ModelName;

const TEMP_PREFIX: &str = ".manifest-";

/// Directory depth of a manifest file below the root: host/namespace/model/tag.
const MANIFEST_DEPTH: usize = 4;

/// Attempts at creating a temp file when a concurrent delete prunes its directory.
const CREATE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct ManifestStore {
    root: PathBuf,
}

impl ManifestStore {
    /// Open the store at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(StoreError::io("failed to create manifest directory", &root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self, name: &ModelName) -> PathBuf {
        self.root.join(name.relative_path())
    }

    /// Load a manifest. A missing manifest is `Ok(None)`.
    pub fn load(&self, name: &ModelName) -> Result<Option<Manifest>, StoreError> {
        read_manifest(&self.manifest_path(name))
    }

    /// Create or fully replace a manifest.
    pub fn write(&self, name: &ModelName, manifest: &Manifest) -> Result<(), StoreError> {
        let path = self.manifest_path(name);
        let dir = path.parent().unwrap_or(&self.root);

        let mut temp = self.create_temp_in(dir)?;
        serde_json::to_writer(&mut temp, manifest)
            .map_err(io::Error::from)
            .and_then(|()| temp.flush())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(StoreError::io("failed to write manifest", temp.path()))?;

        temp.persist(&path)
            .map_err(|e| StoreError::io("failed to move manifest into place", &path)(e.error))?;

        debug!(name = %name, "wrote manifest");
        Ok(())
    }

    /// Remove a manifest and prune directories it leaves empty.
    ///
    /// Returns the removed manifest, or `NotFound` if there was none.
    pub fn delete(&self, name: &ModelName) -> Result<Manifest, StoreError> {
        let path = self.manifest_path(name);
        let manifest = read_manifest(&path)?.ok_or_else(|| StoreError::NotFound(name.clone()))?;

        match fs::remove_file(&path) {
            Ok(()) => {}
            // Another deleter got there first; that call reports the deletion.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.clone()))
            }
            Err(e) => return Err(StoreError::io("failed to remove manifest", &path)(e)),
        }

        self.prune_ancestors(&path);
        debug!(name = %name, "removed manifest");
        Ok(manifest)
    }

    /// Lazily walk every manifest currently on disk.
    ///
    /// This is a best-effort snapshot: manifests written or removed during the
    /// walk may or may not show up. Files that vanish mid-walk are skipped,
    /// as are in-flight temp files and paths that are not valid names. A
    /// manifest that fails to parse is yielded as an error.
    pub fn list_all(&self) -> impl Iterator<Item = Result<(ModelName, Manifest), StoreError>> + '_ {
        WalkDir::new(&self.root)
            .min_depth(MANIFEST_DEPTH)
            .max_depth(MANIFEST_DEPTH)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| self.manifest_entry(entry))
    }

    /// Remove every empty directory below the root, deepest first.
    ///
    /// Returns how many were removed. The root itself is always kept.
    pub fn prune_empty_dirs(&self) -> usize {
        let mut removed = 0;
        let walk = WalkDir::new(&self.root).min_depth(1).contents_first(true);
        for entry in walk.into_iter().flatten() {
            if entry.file_type().is_dir() && fs::remove_dir(entry.path()).is_ok() {
                debug!(dir = %entry.path().display(), "pruned empty manifest directory");
                removed += 1;
            }
        }
        removed
    }

    fn manifest_entry(
        &self,
        entry: walkdir::Result<walkdir::DirEntry>,
    ) -> Option<Result<(ModelName, Manifest), StoreError>> {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.io_error().is_some_and(|e| e.kind() == io::ErrorKind::NotFound) => {
                return None
            }
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                return Some(Err(StoreError::io("failed to walk manifests", &path)(err.into())));
            }
        };

        if !entry.file_type().is_file() || entry.file_name().to_string_lossy().starts_with('.') {
            return None;
        }

        let relative = entry.path().strip_prefix(&self.root).ok()?;
        let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
        let name = match segments.map(|s| ModelName::from_path_segments(&s)) {
            Some(Ok(name)) => name,
            _ => {
                warn!(
                    path = %entry.path().display(),
                    "ignoring file that is not a valid manifest path"
                );
                return None;
            }
        };

        read_manifest(entry.path())
            .transpose()
            .map(|result| result.map(|manifest| (name, manifest)))
    }

    fn create_temp_in(&self, dir: &Path) -> Result<NamedTempFile, StoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let created = fs::create_dir_all(dir)
                .and_then(|()| tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir));
            match created {
                Ok(temp) => return Ok(temp),
                Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < CREATE_ATTEMPTS => {
                    debug!(
                        dir = %dir.display(),
                        "manifest directory pruned during write, retrying"
                    );
                }
                Err(e) => return Err(StoreError::io("failed to create manifest temp file", dir)(e)),
            }
        }
    }

    fn prune_ancestors(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            match fs::remove_dir(current) {
                Ok(()) => debug!(dir = %current.display(), "pruned empty manifest directory"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                // Not empty, so nothing above it is either.
                Err(_) => break,
            }
            dir = current.parent();
        }
    }
}

fn read_manifest(path: &Path) -> Result<Option<Manifest>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io("failed to read manifest", path)(e)),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::CorruptManifest {
            path: path.to_path_buf(),
            source,
        })
}
