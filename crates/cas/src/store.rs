//! FileStore: filesystem-backed content addressable blob storage.
//!
//! Implements the ContentStore trait over a single flat directory.
//!
//! Layout:
//! ```text
//! {blobs}/
//! ├── sha256-2222...2222    # one file per unique digest
//! ├── sha256-e3b0...b855
//! └── .partial-Xk2P9a       # staging, see `staging.rs`
//! ```
//!
//! Blobs are write-once. Every write goes through a staging file and a
//! rename, so a reader never sees a half-written blob.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::digest::Digest;
use crate::error::CasError;
use crate::layer::Layer;
use crate::staging::{self, StagingBlob};

/// Iterator over the digests of stored blobs.
pub type Digests<'a> = Box<dyn Iterator<Item = Digest> + Send + 'a>;

/// Trait for content storage backends.
pub trait ContentStore: Send + Sync {
    /// Stream content into the store, returning a layer for it.
    ///
    /// If identical content already exists, nothing new is written.
    fn put(&self, reader: &mut dyn Read, media_type: &str) -> Result<Layer, CasError>;

    /// Check if a blob exists.
    fn exists(&self, digest: &Digest) -> bool;

    /// Remove a blob. Returns `Ok(false)` if it was already absent.
    fn delete(&self, digest: &Digest) -> Result<bool, CasError>;

    /// Lazily list every stored digest.
    fn enumerate(&self) -> Result<Digests<'_>, CasError>;

    /// Get the filesystem path for a blob, if present.
    fn path(&self, digest: &Digest) -> Option<PathBuf>;

    /// Last modification time of a blob, or `Ok(None)` if absent.
    ///
    /// A sealed blob keeps the mtime of its final staging write.
    fn modified(&self, digest: &Digest) -> Result<Option<SystemTime>, CasError>;

    /// Remove staging leftovers untouched for longer than `grace`.
    ///
    /// Returns the number of files removed.
    fn purge_partials(&self, grace: Duration) -> Result<usize, CasError>;
}

/// Filesystem-based content store.
#[derive(Debug, Clone)]
pub struct FileStore {
    blobs_dir: PathBuf,
}

impl FileStore {
    /// Create a FileStore rooted at `blobs_dir`, creating it if needed.
    pub fn new(blobs_dir: impl Into<PathBuf>) -> Result<Self, CasError> {
        let blobs_dir = blobs_dir.into();
        fs::create_dir_all(&blobs_dir)
            .map_err(CasError::io("failed to create blob directory", &blobs_dir))?;
        Ok(Self { blobs_dir })
    }

    pub fn blobs_dir(&self) -> &Path {
        &self.blobs_dir
    }

    /// Where a blob with this digest lives, whether or not it exists.
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.blobs_dir.join(digest.filename())
    }

    /// Start an incremental write. Call `seal()` when done.
    pub fn create_staging(&self) -> Result<StagingBlob, CasError> {
        StagingBlob::create_in(&self.blobs_dir)
    }

    /// Seal a staging blob: finish its digest and move it into place.
    ///
    /// If a blob with the same digest and size already exists the staging
    /// file is discarded. An existing file of the wrong size is treated as
    /// damaged and replaced.
    pub fn seal(&self, staging: StagingBlob, media_type: &str) -> Result<Layer, CasError> {
        let (temp, digest, size) = staging.finish()?;
        let blob_path = self.blob_path(&digest);

        match fs::metadata(&blob_path) {
            Ok(meta) if meta.len() == size => {
                debug!(%digest, size, "blob already present, discarding staging file");
            }
            Ok(meta) => {
                warn!(%digest, expected = size, found = meta.len(), "replacing damaged blob");
                temp.persist(&blob_path)
                    .map_err(|e| CasError::io("failed to replace blob", &blob_path)(e.error))?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match temp.persist_noclobber(&blob_path) {
                    Ok(_) => debug!(%digest, size, "stored blob"),
                    Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                        // A concurrent writer sealed the same content first.
                        debug!(%digest, "blob appeared while sealing, discarding staging file");
                    }
                    Err(e) => {
                        return Err(CasError::io("failed to move blob into place", &blob_path)(
                            e.error,
                        ))
                    }
                }
            }
            Err(e) => return Err(CasError::io("failed to stat blob", &blob_path)(e)),
        }

        Ok(Layer::new(media_type, digest, size))
    }

    /// Open a blob for reading. Returns `Ok(None)` if it doesn't exist.
    pub fn open(&self, digest: &Digest) -> Result<Option<File>, CasError> {
        let path = self.blob_path(digest);
        match File::open(&path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CasError::io("failed to open blob", &path)(e)),
        }
    }

    /// Size in bytes of a stored blob, or `Ok(None)` if absent.
    pub fn size(&self, digest: &Digest) -> Result<Option<u64>, CasError> {
        let path = self.blob_path(digest);
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CasError::io("failed to stat blob", &path)(e)),
        }
    }

    /// Staging leftovers currently in the blob directory.
    pub fn partials(&self) -> Result<Vec<staging::Partial>, CasError> {
        staging::list_partials(&self.blobs_dir)
    }
}

impl ContentStore for FileStore {
    fn put(&self, reader: &mut dyn Read, media_type: &str) -> Result<Layer, CasError> {
        let mut staging = self.create_staging()?;
        io::copy(reader, &mut staging)
            .map_err(CasError::io("failed to stream blob", staging.path()))?;
        self.seal(staging, media_type)
    }

    fn exists(&self, digest: &Digest) -> bool {
        self.blob_path(digest).is_file()
    }

    fn delete(&self, digest: &Digest) -> Result<bool, CasError> {
        let path = self.blob_path(digest);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(%digest, "removed blob");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(%digest, "blob already absent");
                Ok(false)
            }
            Err(e) => Err(CasError::io("failed to remove blob", &path)(e)),
        }
    }

    fn enumerate(&self) -> Result<Digests<'_>, CasError> {
        let entries = match fs::read_dir(&self.blobs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty()))
            }
            Err(e) => {
                return Err(CasError::io("failed to read blob directory", &self.blobs_dir)(e))
            }
        };

        Ok(Box::new(entries.filter_map(|entry| {
            let entry = entry.ok()?;
            Digest::from_filename(entry.file_name().to_str()?)
        })))
    }

    fn path(&self, digest: &Digest) -> Option<PathBuf> {
        let path = self.blob_path(digest);
        if path.is_file() {
            Some(path)
        } else {
            None
        }
    }

    fn modified(&self, digest: &Digest) -> Result<Option<SystemTime>, CasError> {
        let path = self.blob_path(digest);
        match fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => Ok(Some(modified)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CasError::io("failed to stat blob", &path)(e)),
        }
    }

    fn purge_partials(&self, grace: Duration) -> Result<usize, CasError> {
        let now = SystemTime::now();
        let mut removed = 0;

        for partial in self.partials()? {
            if !partial.is_stale(grace, now) {
                continue;
            }
            match fs::remove_file(&partial.path) {
                Ok(()) => {
                    debug!(path = %partial.path.display(), "removed stale staging file");
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CasError::io("failed to remove staging file", &partial.path)(e))
                }
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn blob_files(store: &FileStore) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(store.blobs_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_put_and_read_back() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileStore::new(temp_dir.path().join("blobs"))?;

        let layer = store.put(&mut &b"Hello, World!"[..], "text/plain")?;

        assert_eq!(layer.digest, Digest::from_data(b"Hello, World!"));
        assert_eq!(layer.size, 13);
        assert_eq!(layer.media_type, "text/plain");

        let path = store.path(&layer.digest).expect("should exist");
        assert_eq!(
            path,
            temp_dir.path().join("blobs").join(format!("sha256-{}", layer.digest.hex()))
        );

        let mut data = Vec::new();
        store.open(&layer.digest)?.expect("should open").read_to_end(&mut data)?;
        assert_eq!(data, b"Hello, World!");
        assert_eq!(store.size(&layer.digest)?, Some(13));
        assert_eq!(store.size(&Digest::from_data(b"absent"))?, None);

        let modified = store.modified(&layer.digest)?.expect("sealed blob has an mtime");
        assert!(modified <= SystemTime::now());
        assert_eq!(store.modified(&Digest::from_data(b"absent"))?, None);

        Ok(())
    }

    #[test]
    fn test_deduplication() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileStore::new(temp_dir.path())?;

        let first = store.put(&mut &b"Duplicate Me"[..], "text/plain")?;
        let second = store.put(&mut &b"Duplicate Me"[..], "text/plain")?;

        assert_eq!(first.digest, second.digest);
        assert_eq!(blob_files(&store), vec![first.digest.filename()]);
        Ok(())
    }

    #[test]
    fn test_seal_replaces_damaged_blob() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileStore::new(temp_dir.path())?;

        let digest = Digest::from_data(b"the real bytes");
        fs::write(store.blob_path(&digest), b"trunc")?;

        store.put(&mut &b"the real bytes"[..], "application/octet-stream")?;
        assert_eq!(fs::read(store.blob_path(&digest))?, b"the real bytes");
        Ok(())
    }

    #[test]
    fn test_staging_seal() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileStore::new(temp_dir.path())?;

        let mut staging = store.create_staging()?;
        staging.write_all(b"Seal ")?;
        staging.write_all(b"me!")?;
        let staging_path = staging.path().to_path_buf();

        let layer = store.seal(staging, "text/plain")?;

        assert!(!staging_path.exists());
        assert!(store.exists(&layer.digest));
        assert_eq!(layer.size, 8);
        assert_eq!(fs::read(store.blob_path(&layer.digest))?, b"Seal me!");
        Ok(())
    }

    #[test]
    fn test_delete_is_idempotent() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileStore::new(temp_dir.path())?;

        let layer = store.put(&mut &b"delete me twice"[..], "text/plain")?;

        assert!(store.delete(&layer.digest)?);
        assert!(!store.exists(&layer.digest));
        assert!(!store.delete(&layer.digest)?);
        Ok(())
    }

    #[test]
    fn test_enumerate_skips_foreign_files() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileStore::new(temp_dir.path())?;

        let a = store.put(&mut &b"a"[..], "text/plain")?;
        let b = store.put(&mut &b"b"[..], "text/plain")?;
        fs::write(temp_dir.path().join("README"), b"not a blob")?;
        fs::write(temp_dir.path().join(format!("sha256-{}", "2".repeat(65))), b"typo")?;
        let _open_staging = store.create_staging()?;

        let mut found: Vec<Digest> = store.enumerate()?.collect();
        found.sort();
        let mut expected = vec![a.digest, b.digest];
        expected.sort();

        assert_eq!(found, expected);
        Ok(())
    }

    #[test]
    fn test_purge_partials_respects_grace() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileStore::new(temp_dir.path())?;

        let leftover = temp_dir.path().join(".partial-crashed");
        fs::write(&leftover, b"half a blob")?;

        assert_eq!(store.purge_partials(Duration::from_secs(3600))?, 0);
        assert!(leftover.exists());

        thread::sleep(Duration::from_millis(20));
        assert_eq!(store.purge_partials(Duration::ZERO)?, 1);
        assert!(!leftover.exists());
        Ok(())
    }

    #[test]
    fn test_concurrent_writes() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = Arc::new(FileStore::new(temp_dir.path())?);
        let expected = Digest::from_data(b"Concurrent Data");

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    store
                        .put(&mut &b"Concurrent Data"[..], "application/octet-stream")
                        .expect("write failed")
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().digest, expected);
        }

        assert_eq!(blob_files(&store), vec![expected.filename()]);
        Ok(())
    }
}
