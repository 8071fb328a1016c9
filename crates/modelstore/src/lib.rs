//! Named, versioned model manifests over a content-addressed blob store.
//!
//! Blobs (model weights, configs) live once in the `cas` crate's
//! [`FileStore`](cas::FileStore). Manifests name them. Deleting a manifest
//! runs a mark-and-sweep pass that removes exactly the blobs no remaining
//! manifest references.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use modelstore::{DeleteStatus, ModelStore, StoreConfig};
//!
//! let config = StoreConfig::from_env();
//! let store = ModelStore::open(&config).unwrap();
//!
//! let weights = store
//!     .put_blob(&mut &b"...weights..."[..], "application/vnd.ollama.image.model")
//!     .unwrap();
//! let config_blob = store
//!     .put_blob(&mut &b"{}"[..], "application/vnd.docker.container.image.v1+json")
//!     .unwrap();
//! store.create_model("mymodel:v1", config_blob, vec![weights]).unwrap();
//!
//! let result = store.delete_model("mymodel:v1");
//! assert_eq!(DeleteStatus::from_result(&result), DeleteStatus::Done);
//! ```
//!
//! # Concurrency
//!
//! All operations are blocking and hold no state between calls. Writes are
//! temp-file-then-rename. Each blob is re-checked against the current
//! manifests right before it is deleted; see [`gc`].

pub mod config;
pub mod error;
pub mod gc;
pub mod manifest;
pub mod manifest_store;
pub mod name;
pub mod store;

pub use cas::{ContentStore, Digest, FileStore, Layer};
pub use config::{ConfigError, StoreConfig};
pub use error::{DeleteStatus, ErrorKind, StoreError};
pub use gc::{BlobFailure, GarbageCollector, GcReport, SweepReport};
pub use manifest::{
    Manifest, ModelConfig, CONFIG_MEDIA_TYPE, MANIFEST_MEDIA_TYPE, MODEL_LAYER_MEDIA_TYPE,
};
pub use manifest_store::ManifestStore;
pub use name::{ModelName, NameDefaults, NameError};
pub use store::ModelStore;
