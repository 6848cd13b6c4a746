use crate::common::{Config, GateError, Result};
use crate::core::detector::FaceBox;
use ort::{Environment, Session, Value};
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

pub type Embedding = Vec<f32>;

pub struct FaceRecognizer {
    session: Session,
    _environment: Arc<Environment>,
    input_size: u32,
    normalization_value: f32,
}

impl FaceRecognizer {
    pub fn new(config: &Config) -> Result<Self> {
        let (environment, session) = super::build_session(
            "face_recognizer",
            &config.models.recognizer_path,
            config.performance.optimization_level,
        )?;

        Ok(Self {
            session,
            _environment: environment,
            input_size: config.recognizer.input_size,
            normalization_value: config.recognizer.normalization_value,
        })
    }

    pub fn get_embedding(&self, image: &DynamicImage, face: &FaceBox) -> Result<Embedding> {
        let face_img = crop_face(image, face)?;

        let resized = face_img.resize_exact(self.input_size, self.input_size, FilterType::Triangle);

        let input_array = self.preprocess_face(&resized);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;

        let embedding = outputs
            .first()
            .ok_or_else(|| GateError::Model("Recognizer produced no outputs".into()))?
            .try_extract::<f32>()?
            .view()
            .iter()
            .copied()
            .collect();
        Ok(embedding)
    }

    fn preprocess_face(&self, img: &DynamicImage) -> Array4<f32> {
        // Single channel input for the embedding model
        let gray = img.to_luma8();
        let size = self.input_size as usize;
        let norm_val = self.normalization_value;
        let mut array = Array4::<f32>::zeros((1, 1, size, size));

        for (x, y, pixel) in gray.enumerate_pixels() {
            array[[0, 0, y as usize, x as usize]] = (pixel[0] as f32 - norm_val) / norm_val;
        }

        array
    }
}

/// Crops `face` out of `image`, clamped to the image bounds.
pub fn crop_face(image: &DynamicImage, face: &FaceBox) -> Result<DynamicImage> {
    let x = face.x1.max(0.0) as u32;
    let y = face.y1.max(0.0) as u32;
    if x >= image.width() || y >= image.height() {
        return Err(GateError::Model(format!(
            "Face box ({:.0}, {:.0}) lies outside the {}x{} frame",
            face.x1, face.y1, image.width(), image.height()
        )));
    }

    let width = ((face.x2 - face.x1).max(1.0) as u32).min(image.width() - x);
    let height = ((face.y2 - face.y1).max(1.0) as u32).min(image.height() - y);

    Ok(image.crop_imm(x, y, width.max(1), height.max(1)))
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
