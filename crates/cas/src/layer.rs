//! Layer: a typed, sized reference to one blob.
//!
//! Layers are what manifests are made of, and what `ContentStore::put`
//! hands back once content has landed in the store.

use crate::digest::Digest;
use serde::{Deserialize, Serialize};

/// Reference to a blob in the store.
///
/// Serialized with camelCase keys (`mediaType`, `digest`, `size`), which is
/// the on-disk manifest format. Unknown keys are ignored on read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    /// Media type of the referenced content.
    pub media_type: String,

    /// Content digest of the blob.
    pub digest: Digest,

    /// Size of the blob in bytes.
    pub size: u64,
}

impl Layer {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
        }
    }
}
