use std::fmt;

use image::DynamicImage;

use crate::common::{Config, Result};
use crate::core::detector::{FaceBox, FaceDetector};
use crate::core::gallery::ReferenceGallery;
use crate::core::recognizer::FaceRecognizer;
use crate::storage::GalleryCache;

/// A captured camera frame.
pub type Frame = DynamicImage;

/// Best-match identity of a detected face.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    /// An empty label is not a valid identity and maps to `Unknown`.
    pub fn known(label: impl Into<String>) -> Self {
        let label = label.into();
        if label.is_empty() {
            Identity::Unknown
        } else {
            Identity::Known(label)
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Identity::Known(label) => Some(label),
            Identity::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Identity::Unknown)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Known(label) => f.write_str(label),
            Identity::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Face location in pixel coordinates, `(top, right, bottom, left)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl BoundingBox {
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self { top, right, bottom, left }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

impl From<&FaceBox> for BoundingBox {
    fn from(face: &FaceBox) -> Self {
        Self {
            top: face.y1.max(0.0).round() as u32,
            right: face.x2.max(0.0).round() as u32,
            bottom: face.y2.max(0.0).round() as u32,
            left: face.x1.max(0.0).round() as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub identity: Identity,
}

impl Detection {
    pub fn new(bounding_box: BoundingBox, identity: Identity) -> Self {
        Self { bounding_box, identity }
    }
}

/// Maps one frame to the faces in it, in a stable order.
///
/// Errors are returned as values; a failing frame must not poison later ones.
pub trait FaceMatcher {
    fn match_faces(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Face matcher backed by the ONNX detector and embedding models and a
/// reference gallery computed at startup.
pub struct OnnxFaceMatcher {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    gallery: ReferenceGallery,
    match_threshold: f32,
}

impl OnnxFaceMatcher {
    pub fn new(config: &Config, cache: Option<&GalleryCache>) -> Result<Self> {
        let detector = FaceDetector::new(config)?;
        let recognizer = FaceRecognizer::new(config)?;

        let gallery = ReferenceGallery::load(&config.gallery.images_dir, cache, |image| {
            let faces = detector.detect(image)?;
            // Detections come back sorted by confidence, best first
            match faces.first() {
                Some(face) => recognizer.get_embedding(image, face).map(Some),
                None => Ok(None),
            }
        })?;

        Ok(Self {
            detector,
            recognizer,
            gallery,
            match_threshold: config.recognizer.match_threshold,
        })
    }

    pub fn gallery(&self) -> &ReferenceGallery {
        &self.gallery
    }
}

impl FaceMatcher for OnnxFaceMatcher {
    fn match_faces(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let faces = self.detector.detect(frame)?;

        let mut detections = Vec::with_capacity(faces.len());
        for face in &faces {
            let embedding = self.recognizer.get_embedding(frame, face)?;
            let (identity, similarity) = self.gallery.best_match(&embedding, self.match_threshold);
            tracing::debug!("Face {:?} matched {} (similarity {:.3})", face, identity, similarity);
            detections.push(Detection::new(BoundingBox::from(face), identity));
        }

        // Left to right, so multi-face frames dispatch in a stable order
        detections.sort_by_key(|d| d.bounding_box.left);
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_label_is_unknown() {
        assert_eq!(Identity::known(""), Identity::Unknown);
        assert_eq!(Identity::known("ali"), Identity::Known("ali".into()));
    }

    #[test]
    fn identity_display() {
        assert_eq!(Identity::known("mohamed").to_string(), "mohamed");
        assert_eq!(Identity::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn bounding_box_from_face_box() {
        let face = FaceBox { x1: 10.4, y1: 20.6, x2: 110.0, y2: 140.2, confidence: 0.9 };
        let bbox = BoundingBox::from(&face);
        assert_eq!(bbox, BoundingBox::new(21, 110, 140, 10));
        assert_eq!(bbox.width(), 100);
        assert_eq!(bbox.height(), 119);
    }
}
