pub mod detector;
pub mod gallery;
pub mod matcher;
pub mod recognizer;

pub use detector::{FaceDetector, FaceBox};
pub use gallery::{GalleryEntry, ReferenceGallery};
pub use matcher::{BoundingBox, Detection, FaceMatcher, Frame, Identity, OnnxFaceMatcher};
pub use recognizer::{FaceRecognizer, cosine_similarity, Embedding};

use crate::common::{GateError, Result};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder};
use std::path::Path;
use std::sync::Arc;

pub(crate) fn build_session(
    name: &str,
    model_path: &Path,
    optimization_level: u32,
) -> Result<(Arc<Environment>, Session)> {
    let environment = Arc::new(
        Environment::builder()
            .with_name(name)
            .build()
            .map_err(|e| GateError::Model(format!("Failed to create environment: {}", e)))?
    );

    if !model_path.exists() {
        return Err(GateError::Model(
            format!("Model for {} not found at: {:?}", name, model_path)
        ));
    }

    let opt_level = match optimization_level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    };

    let session = SessionBuilder::new(&environment)?
        .with_optimization_level(opt_level)?
        .with_model_from_file(model_path)?;

    Ok((environment, session))
}
