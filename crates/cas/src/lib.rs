//! Content Addressable Storage (CAS) for model blobs.
//!
//! Blobs are identified by their SHA-256 digest and stored once, no matter
//! how many manifests reference them:
//! - **writes** stream through a staging file and are renamed into place
//! - **deletes** are idempotent, so overlapping GC passes never fault
//! - **enumeration** is lazy, for orphan audits
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cas::{ContentStore, FileStore};
//!
//! let store = FileStore::new("/var/lib/modelstore/blobs").unwrap();
//!
//! // Store content
//! let layer = store.put(&mut &b"Hello, World!"[..], "text/plain").unwrap();
//! println!("Stored as: {}", layer.digest);
//!
//! // Get filesystem path (for external tools)
//! if let Some(path) = store.path(&layer.digest) {
//!     println!("File at: {}", path.display());
//! }
//!
//! // Remove it; a second delete is a no-op
//! store.delete(&layer.digest).unwrap();
//! store.delete(&layer.digest).unwrap();
//! ```
//!
//! # Layout
//!
//! Blob files live flat in one directory as `sha256-<hex>`, the same naming
//! other model stores use, so an existing blob directory can be opened as-is.

pub mod digest;
pub mod error;
pub mod layer;
pub mod staging;
pub mod store;

// Re-exports for convenience
pub use digest::{Digest, DigestError};
pub use error::CasError;
pub use layer::Layer;
pub use staging::{Partial, StagingBlob};
pub use store::{ContentStore, Digests, FileStore};
