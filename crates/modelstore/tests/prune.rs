//! Integration tests for crash recovery via the orphan sweep.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use modelstore::{ContentStore, ModelStore, StoreConfig};
use tempfile::TempDir;

fn test_store() -> Result<(ModelStore, TempDir)> {
    let temp_dir = TempDir::new()?;
    let store = ModelStore::open(&StoreConfig::with_root(temp_dir.path()))?;
    Ok((store, temp_dir))
}

/// Make a file look like it was last written two hours ago.
fn backdate(path: &Path) -> Result<()> {
    let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 3600);
    File::options().write(true).open(path)?.set_modified(two_hours_ago)?;
    Ok(())
}

#[test]
fn test_prune_recovers_crash_between_manifest_delete_and_sweep() -> Result<()> {
    let (store, _temp) = test_store()?;
    let shared = store.put_blob(&mut &b"shared"[..], "application/octet-stream")?;
    let doomed = store.put_blob(&mut &b"doomed"[..], "application/octet-stream")?;

    let a = store.create_model("a", shared.clone(), vec![doomed.clone()])?;
    store.create_model("b", shared.clone(), vec![])?;

    // The process died right after unlinking the manifest.
    fs::remove_file(store.manifests().manifest_path(&a))?;
    backdate(&store.blobs().blob_path(&doomed.digest))?;

    let report = store.prune(Duration::from_secs(3600))?;

    assert_eq!(report.scanned, 2);
    assert_eq!(report.blobs_removed, 1);
    assert_eq!(report.blobs_within_grace, 0);
    assert!(report.failures.is_empty());
    assert!(!store.blobs().exists(&doomed.digest));
    assert!(store.blobs().exists(&shared.digest));
    assert!(store.show("b").is_ok());
    Ok(())
}

#[test]
fn test_prune_removes_stale_staging_and_empty_dirs() -> Result<()> {
    let (store, _temp) = test_store()?;

    let mut staging = store.blobs().create_staging()?;
    staging.write_all(b"half a download")?;
    let staged_path = staging.path().to_path_buf();
    std::mem::forget(staging);

    fs::create_dir_all(store.manifests().root().join("registry.ollama.ai/library/gone"))?;

    let fresh = store.prune(Duration::from_secs(3600))?;
    assert_eq!(fresh.partials_removed, 0);
    assert!(staged_path.exists());

    std::thread::sleep(Duration::from_millis(20));
    let report = store.prune(Duration::ZERO)?;
    assert_eq!(report.partials_removed, 1);
    assert!(!staged_path.exists());
    assert_eq!(fs::read_dir(store.manifests().root())?.count(), 0);
    assert!(store.manifests().root().is_dir());
    Ok(())
}

#[test]
fn test_prune_with_nothing_to_do() -> Result<()> {
    let (store, _temp) = test_store()?;
    let layer = store.put_blob(&mut &b"in use"[..], "application/octet-stream")?;
    store.create_model("kept", layer.clone(), vec![layer.clone()])?;

    let report = store.prune(Duration::ZERO)?;

    assert_eq!(report.scanned, 1);
    assert_eq!(report.blobs_removed, 0);
    assert!(store.blobs().exists(&layer.digest));
    Ok(())
}

#[test]
fn test_prune_keeps_fresh_unreferenced_blob() -> Result<()> {
    let (store, _temp) = test_store()?;

    // Sealed, but the push has not written its manifest yet.
    let fresh = store.put_blob(&mut &b"just downloaded layer"[..], "application/octet-stream")?;

    let report = store.prune(Duration::from_secs(3600))?;

    assert_eq!(report.scanned, 1);
    assert_eq!(report.blobs_removed, 0);
    assert_eq!(report.blobs_within_grace, 1);
    assert!(store.blobs().exists(&fresh.digest));

    // The push can still complete.
    store.create_model("inflight", fresh.clone(), vec![fresh.clone()])?;
    assert_eq!(store.show("inflight")?.config, fresh);

    // Once it is old enough and still unreferenced, it goes.
    store.delete_model("inflight")?;
    let again = store.put_blob(&mut &b"just downloaded layer"[..], "application/octet-stream")?;
    backdate(&store.blobs().blob_path(&again.digest))?;
    let report = store.prune(Duration::from_secs(3600))?;
    assert_eq!(report.blobs_removed, 1);
    assert!(!store.blobs().exists(&again.digest));
    Ok(())
}
