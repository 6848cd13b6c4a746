pub mod v4l2;

pub use v4l2::{Camera, CameraInfo, CameraSource};

use crate::common::Result;
use crate::core::Frame;

/// Something that yields frames in capture order.
pub trait FrameSource {
    /// Captures one frame. Failures are transient; the next call may succeed.
    fn capture(&mut self) -> Result<Frame>;

    /// Releases the device. Called once on shutdown.
    fn release(&mut self);
}
