use crate::access::{LinkState, Presenter, Verdict};
use crate::common::{DevMode, Result};
use crate::core::{BoundingBox, Frame};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::time::{Duration, Instant};

const GRANTED_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const DENIED_COLOR: Rgb<u8> = Rgb([200, 0, 0]);
const BORDER: i32 = 4;

/// Draws one box per verdict: green when granted, red when denied.
pub fn annotate_frame(frame: &DynamicImage, verdicts: &[Verdict]) -> RgbImage {
    let mut img = frame.to_rgb8();

    for verdict in verdicts {
        let color = if verdict.decision.is_grant() { GRANTED_COLOR } else { DENIED_COLOR };
        draw_thick_rect(&mut img, &verdict.detection.bounding_box, color);
    }

    img
}

fn draw_thick_rect(img: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let right = bbox.right.min(img.width()) as i32;
    let bottom = bbox.bottom.min(img.height()) as i32;
    let (left, top) = (bbox.left as i32, bbox.top as i32);

    // Concentric rectangles for a thicker border
    for inset in 0..BORDER {
        let width = right - left - 2 * inset;
        let height = bottom - top - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(left + inset, top + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// Saves annotated frames that contain faces, at most one per `interval`.
pub struct SnapshotPresenter {
    dev_mode: DevMode,
    interval: Duration,
    last_saved: Option<Instant>,
}

impl SnapshotPresenter {
    pub fn new(dev_mode: DevMode, interval: Duration) -> Self {
        Self { dev_mode, interval, last_saved: None }
    }
}

impl Presenter for SnapshotPresenter {
    fn present(&mut self, frame: &Frame, verdicts: &[Verdict], _link: LinkState) -> Result<()> {
        if verdicts.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        if self.last_saved.map_or(false, |at| now.duration_since(at) < self.interval) {
            return Ok(());
        }

        let path = self.dev_mode.get_capture_path("decision");
        annotate_frame(frame, verdicts).save(&path)?;
        self.last_saved = Some(now);
        tracing::debug!("Saved annotated frame to {:?}", path);
        Ok(())
    }
}
