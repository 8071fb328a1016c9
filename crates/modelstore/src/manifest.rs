//! Manifest and config record types.

use std::collections::BTreeSet;
use std::iter;

use cas::{Digest, Layer};
use serde::{Deserialize, Serialize};

pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";
pub const MODEL_LAYER_MEDIA_TYPE: &str = "application/vnd.ollama.image.model";

/// A named model version: one config blob plus an ordered list of layers.
///
/// `layers` may repeat a digest, including the config's own digest.
/// Decoding is strict about the fields below and ignores anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    pub media_type: String,
    pub config: Layer,
    pub layers: Vec<Layer>,
}

impl Manifest {
    pub fn new(config: Layer, layers: Vec<Layer>) -> Self {
        Self {
            schema_version: 2,
            media_type: MANIFEST_MEDIA_TYPE.to_string(),
            config,
            layers,
        }
    }

    /// Every digest referenced, config first, duplicates included.
    pub fn references(&self) -> impl Iterator<Item = &Digest> {
        iter::once(&self.config.digest).chain(self.layers.iter().map(|l| &l.digest))
    }

    /// The set of distinct digests this manifest keeps alive.
    pub fn digests(&self) -> BTreeSet<Digest> {
        self.references().cloned().collect()
    }

    pub fn references_digest(&self, digest: &Digest) -> bool {
        self.references().any(|d| d == digest)
    }

    /// Sum of recorded sizes, counting each listed entry.
    pub fn total_size(&self) -> u64 {
        self.config.size + self.layers.iter().map(|l| l.size).sum::<u64>()
    }
}

/// Model configuration record, stored as a manifest's config blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub model_format: String,
    #[serde(default)]
    pub model_family: String,
    #[serde(default)]
    pub model_families: Vec<String>,
    #[serde(default)]
    pub model_type: String,
    #[serde(default)]
    pub file_type: String,

    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub rootfs: RootFs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub diff_ids: Vec<String>,
}

impl ModelConfig {
    /// JSON encoding, newline terminated.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
