pub mod gallery_cache;

pub use gallery_cache::{CachedEmbedding, Fingerprint, GalleryCache};
