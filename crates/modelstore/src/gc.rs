//! Mark-and-sweep reclamation of blobs.
//!
//! There is no stored reference count. Every pass rebuilds the live set from
//! the manifests on disk at that moment, so a crash at any point leaves at
//! worst some unreferenced blobs for the next pass to collect.
//!
//! Race policy: a push can land a manifest after the live set is built. To
//! narrow that window, each blob is re-checked against a fresh walk of the
//! manifests immediately before it is unlinked, and kept if anything now
//! references it.

use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, SystemTime};

use cas::{ContentStore, Digest};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::manifest_store::ManifestStore;
use crate::name::ModelName;

/// A blob that could not be removed.
#[derive(Debug, Clone, Serialize)]
pub struct BlobFailure {
    pub digest: Digest,
    pub message: String,
}

/// Outcome of deleting one manifest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GcReport {
    pub manifests_removed: usize,
    pub blobs_removed: usize,
    /// Candidates kept because another manifest references them.
    pub blobs_retained: usize,
    /// Of those kept, how many only showed up as live on the re-check.
    pub blobs_rechecked_live: usize,
    /// The live set could not be computed, so no blob was touched.
    pub sweep_skipped: bool,
    pub failures: Vec<BlobFailure>,
}

/// Outcome of a full orphan sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub blobs_removed: usize,
    /// Unreferenced blobs kept because they were written within the grace window.
    pub blobs_within_grace: usize,
    pub blobs_rechecked_live: usize,
    pub partials_removed: usize,
    pub dirs_pruned: usize,
    pub failures: Vec<BlobFailure>,
}

enum Reclaim {
    Removed,
    Absent,
    Live,
    Failed(BlobFailure),
}

pub struct GarbageCollector<'a> {
    manifests: &'a ManifestStore,
    blobs: &'a dyn ContentStore,
}

impl<'a> GarbageCollector<'a> {
    pub fn new(manifests: &'a ManifestStore, blobs: &'a dyn ContentStore) -> Self {
        Self { manifests, blobs }
    }

    /// Delete one manifest and reclaim the blobs only it referenced.
    ///
    /// `NotFound` leaves the content store untouched. Once the manifest is
    /// gone the call succeeds; blob failures are reported, not returned.
    pub fn delete_manifest(&self, name: &ModelName) -> Result<GcReport, StoreError> {
        let manifest = self.manifests.delete(name)?;
        let candidates = manifest.digests();
        info!(name = %name, candidates = candidates.len(), "deleted manifest");

        let mut report = GcReport {
            manifests_removed: 1,
            ..GcReport::default()
        };

        let live = match self.live_set() {
            Ok(live) => live,
            Err(err) => {
                warn!(name = %name, %err, "skipping blob sweep, live set unavailable");
                report.sweep_skipped = true;
                report.blobs_retained = candidates.len();
                return Ok(report);
            }
        };

        self.sweep_candidates(candidates, &live, &mut report);

        info!(
            name = %name,
            blobs_removed = report.blobs_removed,
            blobs_retained = report.blobs_retained,
            failures = report.failures.len(),
            "blob sweep complete"
        );
        Ok(report)
    }

    /// Remove every blob no manifest references, plus stale staging files.
    ///
    /// For recovering from crashes between a manifest delete and its sweep.
    /// Blobs and staging files modified within `grace` are kept: a push
    /// seals its blobs before it writes the manifest that references them.
    /// Refuses to run if any manifest cannot be read.
    pub fn sweep_orphans(&self, grace: Duration) -> Result<SweepReport, StoreError> {
        let live = self.live_set()?;
        let now = SystemTime::now();
        let mut report = SweepReport::default();

        for digest in self.blobs.enumerate()? {
            report.scanned += 1;
            if live.contains(&digest) {
                continue;
            }
            match self.blobs.modified(&digest) {
                Ok(Some(modified)) if within_grace(modified, grace, now) => {
                    debug!(%digest, "unreferenced blob is within grace, keeping it");
                    report.blobs_within_grace += 1;
                    continue;
                }
                Ok(Some(_)) => {}
                Ok(None) => continue,
                Err(err) => {
                    warn!(%digest, %err, "failed to stat blob, keeping it");
                    report.failures.push(BlobFailure {
                        digest: digest.clone(),
                        message: err.to_string(),
                    });
                    continue;
                }
            }
            match self.reclaim(&digest) {
                Reclaim::Removed => report.blobs_removed += 1,
                Reclaim::Absent => {}
                Reclaim::Live => report.blobs_rechecked_live += 1,
                Reclaim::Failed(failure) => report.failures.push(failure),
            }
        }

        report.partials_removed = self.blobs.purge_partials(grace)?;
        report.dirs_pruned = self.manifests.prune_empty_dirs();

        info!(
            scanned = report.scanned,
            blobs_removed = report.blobs_removed,
            blobs_within_grace = report.blobs_within_grace,
            partials_removed = report.partials_removed,
            dirs_pruned = report.dirs_pruned,
            "orphan sweep complete"
        );
        Ok(report)
    }

    /// Union of every digest referenced by a manifest on disk.
    ///
    /// Fails if any manifest is unreadable, since its references are unknown.
    pub fn live_set(&self) -> Result<HashSet<Digest>, StoreError> {
        let mut live = HashSet::new();
        for entry in self.manifests.list_all() {
            let (_, manifest) = entry?;
            live.extend(manifest.references().cloned());
        }
        debug!(live = live.len(), "computed live set");
        Ok(live)
    }

    fn sweep_candidates(
        &self,
        candidates: BTreeSet<Digest>,
        live: &HashSet<Digest>,
        report: &mut GcReport,
    ) {
        for digest in candidates {
            if live.contains(&digest) {
                debug!(%digest, "blob still referenced");
                report.blobs_retained += 1;
                continue;
            }
            match self.reclaim(&digest) {
                Reclaim::Removed => report.blobs_removed += 1,
                Reclaim::Absent => {}
                Reclaim::Live => {
                    report.blobs_retained += 1;
                    report.blobs_rechecked_live += 1;
                }
                Reclaim::Failed(failure) => report.failures.push(failure),
            }
        }
    }

    /// Re-check one orphan candidate and remove it if still unreferenced.
    fn reclaim(&self, digest: &Digest) -> Reclaim {
        match self.is_referenced(digest) {
            Ok(false) => {}
            Ok(true) => {
                debug!(%digest, "blob became live before removal, keeping it");
                return Reclaim::Live;
            }
            Err(err) => {
                warn!(%digest, %err, "liveness re-check failed, keeping blob");
                return Reclaim::Live;
            }
        }

        match self.blobs.delete(digest) {
            Ok(true) => Reclaim::Removed,
            Ok(false) => Reclaim::Absent,
            Err(err) => {
                warn!(%digest, %err, "failed to remove blob");
                Reclaim::Failed(BlobFailure {
                    digest: digest.clone(),
                    message: err.to_string(),
                })
            }
        }
    }

    fn is_referenced(&self, digest: &Digest) -> Result<bool, StoreError> {
        for entry in self.manifests.list_all() {
            let (_, manifest) = entry?;
            if manifest.references_digest(digest) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Whether something last modified at `modified` is too young to reclaim.
///
/// A timestamp in the future counts as young.
fn within_grace(modified: SystemTime, grace: Duration, now: SystemTime) -> bool {
    now.duration_since(modified)
        .map(|age| age <= grace)
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use cas::{FileStore, Layer};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        manifests: ManifestStore,
        blobs: FileStore,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let manifests = ManifestStore::new(temp.path().join("manifests")).unwrap();
            let blobs = FileStore::new(temp.path().join("blobs")).unwrap();
            Self {
                _temp: temp,
                manifests,
                blobs,
            }
        }

        fn put(&self, data: &[u8]) -> Layer {
            self.blobs.put(&mut &data[..], "application/octet-stream").unwrap()
        }

        fn gc(&self) -> GarbageCollector<'_> {
            GarbageCollector::new(&self.manifests, &self.blobs)
        }
    }

    #[test]
    fn test_recheck_keeps_blob_that_became_live() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let layer = fx.put(b"pushed meanwhile");

        // Simulate a push that landed after the live set was computed.
        let stale_live = HashSet::new();
        fx.manifests.write(&"late".parse()?, &Manifest::new(layer.clone(), vec![]))?;

        let mut report = GcReport::default();
        fx.gc().sweep_candidates(BTreeSet::from([layer.digest.clone()]), &stale_live, &mut report);

        assert!(fx.blobs.exists(&layer.digest));
        assert_eq!(report.blobs_removed, 0);
        assert_eq!(report.blobs_retained, 1);
        assert_eq!(report.blobs_rechecked_live, 1);
        Ok(())
    }

    #[test]
    fn test_absent_candidate_is_not_a_failure() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let ghost = Digest::from_data(b"never stored");

        let mut report = GcReport::default();
        fx.gc().sweep_candidates(BTreeSet::from([ghost]), &HashSet::new(), &mut report);

        assert_eq!(report.blobs_removed, 0);
        assert!(report.failures.is_empty());
        Ok(())
    }

    #[test]
    fn test_corrupt_manifest_blocks_sweep() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let doomed = fx.put(b"only in doomed");
        let name: ModelName = "doomed".parse()?;
        fx.manifests.write(&name, &Manifest::new(doomed.clone(), vec![]))?;

        let broken = fx.manifests.manifest_path(&"broken".parse()?);
        fs::create_dir_all(broken.parent().unwrap())?;
        fs::write(&broken, b"garbage")?;

        let report = fx.gc().delete_manifest(&name)?;

        assert_eq!(report.manifests_removed, 1);
        assert!(report.sweep_skipped);
        assert!(fx.blobs.exists(&doomed.digest));
        assert!(fx.gc().sweep_orphans(Duration::ZERO).is_err());
        Ok(())
    }

    #[test]
    fn test_within_grace() {
        let now = SystemTime::now();
        let hour = Duration::from_secs(3600);

        assert!(within_grace(now - Duration::from_secs(60), hour, now));
        assert!(!within_grace(now - 2 * hour, hour, now));
        assert!(within_grace(now + Duration::from_secs(60), Duration::ZERO, now));
    }

    #[test]
    fn test_live_set_unions_all_manifests() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let a = fx.put(b"a");
        let b = fx.put(b"b");
        let c = fx.put(b"c");
        fx.manifests.write(&"one".parse()?, &Manifest::new(a.clone(), vec![b.clone()]))?;
        fx.manifests.write(&"two".parse()?, &Manifest::new(b.clone(), vec![c.clone(), c.clone()]))?;

        let live = fx.gc().live_set()?;
        assert_eq!(live, HashSet::from([a.digest, b.digest, c.digest]));
        Ok(())
    }
}
