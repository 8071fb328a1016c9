//! ModelStore: the content store and manifest store under one root.
//!
//! Layout:
//! ```text
//! {root}/
//! ├── blobs/
//! │   └── sha256-<hex>                          # see `cas::FileStore`
//! └── manifests/
//!     └── <host>/<namespace>/<model>/<tag>      # see `ManifestStore`
//! ```
//!
//! Every method re-derives state from disk, so a `ModelStore` can be cloned
//! into as many worker threads as needed.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cas::{ContentStore, FileStore, Layer};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::gc::{GarbageCollector, GcReport, SweepReport};
use crate::manifest::Manifest;
use crate::manifest_store::ManifestStore;
use crate::name::{ModelName, NameDefaults};

#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
    defaults: NameDefaults,
    blobs: FileStore,
    manifests: ManifestStore,
}

impl ModelStore {
    /// Open (and if needed create) the store described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let blobs = FileStore::new(config.blobs_dir())?;
        let manifests = ManifestStore::new(config.manifests_dir())?;
        debug!(root = %config.root.display(), "opened model store");

        Ok(Self {
            root: config.root.clone(),
            defaults: config.defaults.clone(),
            blobs,
            manifests,
        })
    }

    /// Open a store at `root` with default name resolution.
    pub fn at_path(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open(&StoreConfig::with_root(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn defaults(&self) -> &NameDefaults {
        &self.defaults
    }

    pub fn blobs(&self) -> &FileStore {
        &self.blobs
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    pub fn collector(&self) -> GarbageCollector<'_> {
        GarbageCollector::new(&self.manifests, &self.blobs)
    }

    /// Resolve a user-supplied name against the configured defaults.
    pub fn resolve(&self, name: &str) -> Result<ModelName, StoreError> {
        Ok(ModelName::parse_with(name, &self.defaults)?)
    }

    /// Delete a model and reclaim the blobs nothing else uses.
    ///
    /// Use [`crate::DeleteStatus::from_result`] to turn the result into a
    /// response.
    pub fn delete_model(&self, name: &str) -> Result<GcReport, StoreError> {
        let name = self.resolve(name)?;
        self.collector().delete_manifest(&name)
    }

    /// Stream a blob into the content store.
    pub fn put_blob(&self, reader: &mut dyn Read, media_type: &str) -> Result<Layer, StoreError> {
        Ok(self.blobs.put(reader, media_type)?)
    }

    /// Write (or fully replace) a manifest for `name`.
    ///
    /// Every referenced blob must already be in the store.
    pub fn create_model(
        &self,
        name: &str,
        config: Layer,
        layers: Vec<Layer>,
    ) -> Result<ModelName, StoreError> {
        let name = self.resolve(name)?;
        let manifest = Manifest::new(config, layers);

        if let Some(missing) = manifest.references().find(|d| !self.blobs.exists(d)) {
            return Err(StoreError::MissingBlob(missing.clone()));
        }

        self.manifests.write(&name, &manifest)?;
        Ok(name)
    }

    /// Load a manifest, failing with `NotFound` if absent.
    pub fn show(&self, name: &str) -> Result<Manifest, StoreError> {
        let name = self.resolve(name)?;
        self.manifests.load(&name)?.ok_or(StoreError::NotFound(name))
    }

    /// All manifests, sorted by name.
    pub fn list(&self) -> Result<Vec<(ModelName, Manifest)>, StoreError> {
        let mut models = self.manifests.list_all().collect::<Result<Vec<_>, _>>()?;
        models.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(models)
    }

    /// Reclaim orphaned blobs and staging files older than `grace`.
    pub fn prune(&self, grace: Duration) -> Result<SweepReport, StoreError> {
        self.collector().sweep_orphans(grace)
    }
}
