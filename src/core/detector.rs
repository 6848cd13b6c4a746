use crate::common::{Config, GateError, Result};
use ort::{Environment, Session, Value};
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

const NMS_IOU_THRESHOLD: f32 = 0.45;
const MIN_BOX_SIZE: f32 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    input_width: u32,
    input_height: u32,
    confidence: f32,
    max_faces: usize,
}

impl FaceDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let (environment, session) = super::build_session(
            "face_detector",
            &config.models.detector_path,
            config.performance.optimization_level,
        )?;

        Ok(Self {
            session,
            _environment: environment,
            input_width: config.detector.input_width,
            input_height: config.detector.input_height,
            confidence: config.detector.confidence,
            max_faces: config.detector.max_faces,
        })
    }

    /// Detects faces, returning boxes in `image` coordinates, best first.
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == self.input_width && image.height() == self.input_height {
            image_to_array(image)
        } else {
            let resized = image.resize_exact(
                self.input_width,
                self.input_height,
                FilterType::Nearest,
            );
            image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let output = outputs
            .first()
            .ok_or_else(|| GateError::Model("Detector produced no outputs".into()))?
            .try_extract::<f32>()?
            .view()
            .to_owned();
        let shape = output.shape().to_vec();
        let data: Vec<f32> = output.iter().copied().collect();

        let candidates = decode_predictions(&data, &shape, self.input_width, self.input_height);
        let mut faces = apply_nms(candidates, NMS_IOU_THRESHOLD);
        faces.retain(|face| face.confidence >= self.confidence);
        faces.truncate(self.max_faces);

        let scale_x = orig_width / self.input_width as f32;
        let scale_y = orig_height / self.input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        Ok(faces)
    }
}

fn image_to_array(img: &DynamicImage) -> Array4<f32> {
    let gray = img.to_luma8();
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    let mut array = Array4::<f32>::zeros((1, 3, height, width));

    let norm_factor = 1.0 / 255.0;
    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = pixel[0] as f32 * norm_factor;
        let (x, y) = (x as usize, y as usize);
        // Detector expects three channels
        array[[0, 0, y, x]] = value;
        array[[0, 1, y, x]] = value;
        array[[0, 2, y, x]] = value;
    }

    array
}

/// Decodes raw YOLO-style predictions into corner boxes in detector input space.
///
/// Accepts `[1, N, 5+]`, transposed `[1, 5+, N]` or 2-D `[N, 5+]` layouts where each
/// prediction is `[x_center, y_center, width, height, confidence, ...]`.
pub fn decode_predictions(
    data: &[f32],
    shape: &[usize],
    input_width: u32,
    input_height: u32,
) -> Vec<FaceBox> {
    let (num_predictions, prediction_length, is_transposed) = match shape {
        [_, a, b] if *b > *a && *a <= 10 => (*b, *a, true),
        [_, a, b] => (*a, *b, false),
        [a, b] => (*a, *b, false),
        _ => {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return Vec::new();
        }
    };

    if prediction_length < 5 || data.len() < num_predictions * prediction_length {
        tracing::warn!("Detector output too short for shape {:?}", shape);
        return Vec::new();
    }

    let field = |i: usize, k: usize| {
        if is_transposed {
            data[k * num_predictions + i]
        } else {
            data[i * prediction_length + k]
        }
    };

    let mut faces = Vec::new();
    for i in 0..num_predictions {
        let confidence = field(i, 4);
        if confidence <= 0.001 {
            continue;
        }

        let (mut cx, mut cy, mut w, mut h) = (field(i, 0), field(i, 1), field(i, 2), field(i, 3));
        // Normalized coordinates
        if cx <= 1.0 && cy <= 1.0 && w <= 1.0 && h <= 1.0 {
            cx *= input_width as f32;
            w *= input_width as f32;
            cy *= input_height as f32;
            h *= input_height as f32;
        }

        let x1 = (cx - w / 2.0).max(0.0);
        let y1 = (cy - h / 2.0).max(0.0);
        let x2 = (cx + w / 2.0).min(input_width as f32);
        let y2 = (cy + h / 2.0).min(input_height as f32);

        if x2 - x1 > MIN_BOX_SIZE && y2 - y1 > MIN_BOX_SIZE {
            faces.push(FaceBox { x1, y1, x2, y2, confidence });
        }
    }

    faces
}

/// Non-maximum suppression. Output is sorted by descending confidence.
pub fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| calculate_iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

pub fn calculate_iou(box1: &FaceBox, box2: &FaceBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = box1.area() + box2.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = face(0.0, 0.0, 100.0, 100.0, 0.9);
        assert!((calculate_iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = face(20.0, 20.0, 30.0, 30.0, 0.9);
        assert_eq!(calculate_iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_drops_overlapping_lower_confidence_box() {
        let boxes = vec![
            face(0.0, 0.0, 100.0, 100.0, 0.6),
            face(2.0, 2.0, 102.0, 102.0, 0.9),
            face(300.0, 300.0, 400.0, 400.0, 0.7),
        ];
        let kept = apply_nms(boxes, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn decodes_flat_layout_in_pixels() {
        // Two predictions, [2, 5]
        let data = vec![
            100.0, 100.0, 50.0, 60.0, 0.95,
            10.0, 10.0, 4.0, 4.0, 0.90, // too small
        ];
        let faces = decode_predictions(&data, &[2, 5], 640, 640);
        assert_eq!(faces, vec![face(75.0, 70.0, 125.0, 130.0, 0.95)]);
    }

    #[test]
    fn decodes_transposed_layout_with_normalized_coordinates() {
        // Six predictions, [1, 5, 6]: rows are fields, columns predictions
        let data = vec![
            0.5, 0.1, 0.9, 0.0, 0.0, 0.0, // x_center
            0.5, 0.1, 0.9, 0.0, 0.0, 0.0, // y_center
            0.25, 0.1, 0.1, 0.0, 0.0, 0.0, // width
            0.25, 0.1, 0.1, 0.0, 0.0, 0.0, // height
            0.8, 0.0, 0.7, 0.0, 0.0, 0.0, // confidence
        ];
        let faces = decode_predictions(&data, &[1, 5, 6], 400, 400);
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0], face(150.0, 150.0, 250.0, 250.0, 0.8));
        assert_eq!(faces[1].confidence, 0.7);
    }

    #[test]
    fn unexpected_shape_yields_nothing() {
        assert!(decode_predictions(&[1.0; 10], &[10], 640, 640).is_empty());
        assert!(decode_predictions(&[1.0; 4], &[1, 1, 4], 640, 640).is_empty());
    }
}
