use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::common::{GateError, Result};
use crate::core::matcher::Identity;
use crate::core::recognizer::{cosine_similarity, Embedding};
use crate::storage::{CachedEmbedding, GalleryCache};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub label: String,
    pub embedding: Embedding,
}

/// Known faces, one embedding per reference image.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGallery {
    entries: Vec<GalleryEntry>,
}

impl ReferenceGallery {
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    /// Loads every reference image in `dir`, labelled by file stem.
    ///
    /// `embed` returns `None` for images without a detectable face; those are
    /// skipped. Embeddings found in `cache` for unchanged files are reused.
    pub fn load<F>(dir: &Path, cache: Option<&GalleryCache>, mut embed: F) -> Result<Self>
    where
        F: FnMut(&DynamicImage) -> Result<Option<Embedding>>,
    {
        let images = list_reference_images(dir)?;
        let cached = cache.map(|c| c.load()).unwrap_or_default();

        let mut entries = Vec::new();
        let mut fresh = Vec::new();
        let mut reused = 0usize;

        for path in images {
            let Some(label) = label_for(&path) else {
                tracing::warn!("Skipping reference image with unusable name: {}", path.display());
                continue;
            };
            let metadata = fs::metadata(&path)?;
            let fingerprint = CachedEmbedding::fingerprint(&path, &metadata);

            let hit = cached.iter().find(|c| c.matches(&fingerprint));
            let embedding = match hit {
                Some(entry) => {
                    reused += 1;
                    entry.embedding.clone()
                }
                None => {
                    let image = match image::open(&path) {
                        Ok(image) => image,
                        Err(e) => {
                            tracing::warn!("Skipping unreadable reference image {}: {}", path.display(), e);
                            continue;
                        }
                    };
                    match embed(&image)? {
                        Some(embedding) => embedding,
                        None => {
                            tracing::warn!("No face found in reference image {}", path.display());
                            continue;
                        }
                    }
                }
            };

            fresh.push(fingerprint.with_embedding(label.clone(), embedding.clone()));
            entries.push(GalleryEntry { label, embedding });
        }

        if entries.is_empty() {
            return Err(GateError::Gallery(format!(
                "No usable reference faces in {}", dir.display()
            )));
        }

        if let Some(cache) = cache {
            if let Err(e) = cache.save(&fresh) {
                tracing::warn!("Failed to write embedding cache: {}", e);
            }
        }

        tracing::info!(
            "Loaded {} reference face(s) from {} ({} from cache)",
            entries.len(), dir.display(), reused
        );
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Distinct labels in load order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !labels.contains(&entry.label.as_str()) {
                labels.push(&entry.label);
            }
        }
        labels
    }

    /// Highest-similarity label, or `Unknown` below `threshold`.
    pub fn best_match(&self, embedding: &[f32], threshold: f32) -> (Identity, f32) {
        let best = self
            .entries
            .iter()
            .map(|entry| (entry, cosine_similarity(embedding, &entry.embedding)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((entry, similarity)) if similarity >= threshold => {
                (Identity::known(entry.label.clone()), similarity)
            }
            Some((_, similarity)) => (Identity::Unknown, similarity),
            None => (Identity::Unknown, 0.0),
        }
    }
}

fn list_reference_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(GateError::Gallery(format!(
            "Reference image directory not found: {}", dir.display()
        )));
    }

    let mut images: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    images.sort();
    Ok(images)
}

fn label_for(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn gallery() -> ReferenceGallery {
        ReferenceGallery::from_entries(vec![
            GalleryEntry { label: "mohamed".into(), embedding: vec![1.0, 0.0, 0.0] },
            GalleryEntry { label: "ali".into(), embedding: vec![0.0, 1.0, 0.0] },
        ])
    }

    fn write_image(dir: &Path, name: &str, shade: u8) {
        GrayImage::from_pixel(8, 8, Luma([shade])).save(dir.join(name)).unwrap();
    }

    #[test]
    fn best_match_picks_most_similar_label() {
        let (identity, similarity) = gallery().best_match(&[0.9, 0.1, 0.0], 0.5);
        assert_eq!(identity, Identity::known("mohamed"));
        assert!(similarity > 0.9);
    }

    #[test]
    fn best_match_below_threshold_is_unknown() {
        let (identity, _) = gallery().best_match(&[0.0, 0.0, 1.0], 0.5);
        assert_eq!(identity, Identity::Unknown);
    }

    #[test]
    fn empty_gallery_matches_nothing() {
        let (identity, similarity) = ReferenceGallery::default().best_match(&[1.0], 0.0);
        assert_eq!(identity, Identity::Unknown);
        assert_eq!(similarity, 0.0);
    }

    #[test]
    fn loads_images_labelled_by_file_stem() {
        let tmp = tempfile::tempdir().unwrap();
        write_image(tmp.path(), "mohamed.jpg", 200);
        write_image(tmp.path(), "ali.png", 100);
        fs::write(tmp.path().join("notes.txt"), "not an image").unwrap();

        let gallery = ReferenceGallery::load(tmp.path(), None, |image| {
            Ok(Some(vec![image.to_luma8().get_pixel(0, 0)[0] as f32, 1.0]))
        })
        .unwrap();

        assert_eq!(gallery.labels(), vec!["ali", "mohamed"]);
    }

    #[test]
    fn images_without_faces_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_image(tmp.path(), "mohamed.png", 200);
        write_image(tmp.path(), "blank.png", 0);

        let gallery = ReferenceGallery::load(tmp.path(), None, |image| {
            let shade = image.to_luma8().get_pixel(0, 0)[0];
            Ok((shade > 0).then(|| vec![1.0, 0.0]))
        })
        .unwrap();

        assert_eq!(gallery.labels(), vec!["mohamed"]);
    }

    #[test]
    fn directory_without_faces_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_image(tmp.path(), "blank.png", 0);

        let result = ReferenceGallery::load(tmp.path(), None, |_| Ok(None));
        assert!(matches!(result, Err(GateError::Gallery(_))));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let result = ReferenceGallery::load(Path::new("/nonexistent/images"), None, |_| Ok(None));
        assert!(matches!(result, Err(GateError::Gallery(_))));
    }

    #[test]
    fn cached_embeddings_skip_recomputation() {
        let images = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        write_image(images.path(), "mohamed.png", 200);
        let cache = GalleryCache::new(cache_dir.path().join("gallery.bincode"));

        let mut calls = 0;
        ReferenceGallery::load(images.path(), Some(&cache), |_| {
            calls += 1;
            Ok(Some(vec![0.5, 0.5]))
        })
        .unwrap();
        assert_eq!(calls, 1);

        let reloaded = ReferenceGallery::load(images.path(), Some(&cache), |_| {
            panic!("embedding should come from the cache")
        })
        .unwrap();
        assert_eq!(reloaded.entries()[0].embedding, vec![0.5, 0.5]);
    }
}
