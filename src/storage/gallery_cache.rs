use crate::common::{GateError, Result};
use crate::core::recognizer::Embedding;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const CACHE_VERSION: u32 = 1;
pub const CACHE_FILE_NAME: &str = "gallery.bincode";

/// Identifies a reference image on disk without reading its pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub file_name: String,
    pub size: u64,
    pub modified_secs: u64,
}

impl Fingerprint {
    pub fn with_embedding(self, label: String, embedding: Embedding) -> CachedEmbedding {
        CachedEmbedding { fingerprint: self, label, embedding }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEmbedding {
    pub fingerprint: Fingerprint,
    pub label: String,
    pub embedding: Embedding,
}

impl CachedEmbedding {
    pub fn fingerprint(path: &Path, metadata: &fs::Metadata) -> Fingerprint {
        let modified_secs = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Fingerprint {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: metadata.len(),
            modified_secs,
        }
    }

    pub fn matches(&self, fingerprint: &Fingerprint) -> bool {
        &self.fingerprint == fingerprint
    }
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CachedEmbedding>,
}

/// Embeddings of reference images from the previous start.
pub struct GalleryCache {
    path: PathBuf,
}

impl GalleryCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CACHE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached entries. A missing, unreadable or outdated cache yields none.
    pub fn load(&self) -> Vec<CachedEmbedding> {
        if !self.path.exists() {
            return Vec::new();
        }

        match self.read() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Ignoring embedding cache {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    fn read(&self) -> Result<Vec<CachedEmbedding>> {
        let data = fs::read(&self.path)?;
        let file: CacheFile = bincode::deserialize(&data)
            .map_err(|e| GateError::Storage(format!("Failed to deserialize: {}", e)))?;

        if file.version != CACHE_VERSION {
            return Err(GateError::Storage(format!(
                "Cache version {} does not match {}", file.version, CACHE_VERSION
            )));
        }
        Ok(file.entries)
    }

    pub fn save(&self, entries: &[CachedEmbedding]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = CacheFile { version: CACHE_VERSION, entries: entries.to_vec() };
        let encoded = bincode::serialize(&file)
            .map_err(|e| GateError::Storage(format!("Failed to serialize: {}", e)))?;
        fs::write(&self.path, encoded)?;
        Ok(())
    }
}
