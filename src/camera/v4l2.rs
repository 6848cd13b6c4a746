use crate::camera::FrameSource;
use crate::common::config::CameraConfig;
use crate::common::{GateError, Result};
use crate::core::Frame;
use image::{DynamicImage, GrayImage, ImageFormat};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

const STREAM_BUFFERS: u32 = 4;

/// Where to capture from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSource {
    /// Pick a device with [`Camera::auto_detect`].
    Auto,
    Index(u32),
    Path(PathBuf),
}

impl FromStr for CameraSource {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(CameraSource::Auto);
        }
        if let Ok(index) = s.parse::<u32>() {
            return Ok(CameraSource::Index(index));
        }
        if s.starts_with("/dev/") {
            return Ok(CameraSource::Path(PathBuf::from(s)));
        }
        Err(GateError::Camera(format!(
            "Unsupported camera source '{}': use a device index, a /dev/video* path or 'auto'", s
        )))
    }
}

#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub features: Vec<String>,
    pub video_capture: bool,
    pub grayscale: bool,
}

impl CameraInfo {
    fn priority(&self) -> u32 {
        match (self.video_capture, self.grayscale) {
            (false, _) => 0,
            (true, false) => 100,
            (true, true) => 50,
        }
    }
}

pub struct Camera {
    stream: Option<Stream<'static>>,
    device: Option<Device>,
    format: Format,
    config: CameraConfig,
    label: String,
}

impl Camera {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let source: CameraSource = config.source.parse()?;
        let (device, label) = match source {
            CameraSource::Auto => {
                let index = Self::auto_detect()?;
                (Device::new(index as usize), format!("/dev/video{}", index))
            }
            CameraSource::Index(index) => (Device::new(index as usize), format!("/dev/video{}", index)),
            CameraSource::Path(path) => {
                let label = path.display().to_string();
                (Device::with_path(&path), label)
            }
        };

        tracing::info!("Opening camera {}...", label);
        let device = device
            .map_err(|e| GateError::Camera(format!("Failed to open camera {}: {}", label, e)))?;

        let caps = device.query_caps()
            .map_err(|e| GateError::Camera(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            tracing::warn!("Device {} ({}) may not support standard video capture", label, caps.card);
        }

        let mut fmt = device.format()
            .map_err(|e| GateError::Camera(format!("Failed to get format: {}", e)))?;
        fmt.width = config.width;
        fmt.height = config.height;
        if fmt.fourcc != FourCC::new(b"GREY") {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        // Keep the device defaults if the exact format is refused
        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set format {}x{} {}: {}", fmt.width, fmt.height, fmt.fourcc, e);
        }

        let format = device.format()
            .map_err(|e| GateError::Camera(format!("Failed to get final format: {}", e)))?;
        tracing::info!("Camera format: {}x{} {}", format.width, format.height, format.fourcc);
        if format.width != config.width || format.height != config.height {
            tracing::warn!(
                "Camera resolution {}x{} differs from requested {}x{}",
                format.width, format.height, config.width, config.height
            );
        }

        Ok(Self {
            stream: None,
            device: Some(device),
            format,
            config: config.clone(),
            label,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Lists all V4L2 devices with their capabilities.
    pub fn list_all_cameras() -> Result<Vec<CameraInfo>> {
        let mut cameras = Vec::new();

        for entry in fs::read_dir("/dev")? {
            let path = entry?.path();
            let Some(index) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("video"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            let Ok(device) = Device::new(index as usize) else { continue };
            let Ok(caps) = device.query_caps() else { continue };

            let mut features = Vec::new();
            let video_capture = caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE);
            if video_capture {
                features.push("VIDEO_CAPTURE".to_string());
            }

            let mut grayscale = false;
            for fmt in device.enum_formats().unwrap_or_default() {
                let fourcc = fmt.fourcc.str().unwrap_or("UNKNOWN");
                match fourcc {
                    "GREY" | "Y8  " | "Y16 " => {
                        features.push(format!("Grayscale ({})", fourcc.trim()));
                        grayscale = true;
                    }
                    "MJPG" | "YUYV" => features.push(format!("Color ({})", fourcc)),
                    _ => {}
                }
            }

            cameras.push(CameraInfo { index, name: caps.card.clone(), features, video_capture, grayscale });
        }

        cameras.sort_by_key(|c| c.index);
        Ok(cameras)
    }

    /// Picks the best capture device, preferring color cameras, or device 0.
    pub fn auto_detect() -> Result<u32> {
        let cameras = Self::list_all_cameras()?;
        Ok(pick_camera(&cameras).unwrap_or_else(|| {
            tracing::warn!("No capture device detected, falling back to /dev/video0");
            0
        }))
    }

    fn ensure_stream(&mut self) -> Result<&mut Stream<'static>> {
        if self.stream.is_none() {
            let device = self.device.as_ref()
                .ok_or_else(|| GateError::Camera("Camera already released".into()))?;

            let mut stream = Stream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                .map_err(|e| GateError::Camera(format!("Failed to create stream: {}", e)))?;
            stream.set_timeout(Duration::from_millis(self.config.capture_timeout_ms));

            tracing::debug!("Warming up camera...");
            for i in 0..self.config.warmup_frames {
                stream.next()
                    .map_err(|e| GateError::Camera(format!("Failed to capture warmup frame {}: {}", i, e)))?;
                std::thread::sleep(Duration::from_millis(self.config.warmup_delay_ms));
            }
            self.stream = Some(stream);
        }

        self.stream.as_mut()
            .ok_or_else(|| GateError::Camera("Capture stream unavailable".into()))
    }
}

impl FrameSource for Camera {
    fn capture(&mut self) -> Result<Frame> {
        let format = self.format.clone();
        let stream = match self.ensure_stream() {
            Ok(stream) => stream,
            Err(e) => {
                // Rebuild the stream on the next attempt
                self.stream = None;
                return Err(e);
            }
        };

        let (buf, _meta) = stream.next()
            .map_err(|e| GateError::Camera(format!("Failed to capture: {}", e)))?;

        decode_frame(format.fourcc.repr, buf, format.width, format.height)
    }

    fn release(&mut self) {
        self.stream = None;
        if self.device.take().is_some() {
            tracing::info!("Released camera {}", self.label);
        }
    }
}

fn pick_camera(cameras: &[CameraInfo]) -> Option<u32> {
    cameras
        .iter()
        .filter(|c| c.priority() > 0)
        .max_by_key(|c| (c.priority(), std::cmp::Reverse(c.index)))
        .map(|c| c.index)
}

/// Converts a raw V4L2 buffer into a frame.
pub fn decode_frame(fourcc: [u8; 4], data: &[u8], width: u32, height: u32) -> Result<Frame> {
    let pixels = (width as usize) * (height as usize);

    match &fourcc {
        b"GREY" => {
            let luma = data.get(..pixels)
                .ok_or_else(|| GateError::Camera(format!("Short GREY frame: {} bytes", data.len())))?;
            GrayImage::from_raw(width, height, luma.to_vec())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| GateError::Camera("Failed to create grayscale image buffer".into()))
        }
        b"YUYV" => {
            if data.len() < pixels * 2 {
                return Err(GateError::Camera(format!("Short YUYV frame: {} bytes", data.len())));
            }
            // Luma plane only: Y0 U Y1 V
            let luma: Vec<u8> = data[..pixels * 2].iter().step_by(2).copied().collect();
            GrayImage::from_raw(width, height, luma)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| GateError::Camera("Failed to create YUYV image buffer".into()))
        }
        b"MJPG" => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?),
        other => Err(GateError::Camera(format!(
            "Unsupported pixel format {}", String::from_utf8_lossy(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(index: u32, video_capture: bool, grayscale: bool) -> CameraInfo {
        CameraInfo { index, name: format!("cam{}", index), features: vec![], video_capture, grayscale }
    }

    #[test]
    fn parses_camera_sources() {
        assert_eq!("auto".parse::<CameraSource>().unwrap(), CameraSource::Auto);
        assert_eq!("2".parse::<CameraSource>().unwrap(), CameraSource::Index(2));
        assert_eq!(
            "/dev/video4".parse::<CameraSource>().unwrap(),
            CameraSource::Path(PathBuf::from("/dev/video4"))
        );
        assert!("rtsp://door/stream".parse::<CameraSource>().is_err());
    }

    #[test]
    fn auto_detection_prefers_lowest_color_capture_device() {
        let cameras = vec![info(0, false, false), info(1, true, true), info(2, true, false), info(3, true, false)];
        assert_eq!(pick_camera(&cameras), Some(2));
        assert_eq!(pick_camera(&[info(0, false, false)]), None);
    }

    #[test]
    fn decodes_grey_frames() {
        let frame = decode_frame(*b"GREY", &[1, 2, 3, 4, 5, 6], 3, 2).unwrap();
        assert_eq!((frame.width(), frame.height()), (3, 2));
        assert_eq!(frame.to_luma8().get_pixel(2, 1)[0], 6);
    }

    #[test]
    fn decodes_yuyv_luma_plane() {
        let data = [10, 128, 20, 128, 30, 128, 40, 128];
        let frame = decode_frame(*b"YUYV", &data, 2, 2).unwrap();
        let luma = frame.to_luma8();
        assert_eq!(luma.as_raw(), &vec![10, 20, 30, 40]);
    }

    #[test]
    fn short_buffers_are_capture_errors() {
        assert!(matches!(decode_frame(*b"GREY", &[1, 2], 3, 2), Err(GateError::Camera(_))));
        assert!(matches!(decode_frame(*b"YUYV", &[1, 2], 2, 2), Err(GateError::Camera(_))));
        assert!(decode_frame(*b"H264", &[], 1, 1).is_err());
    }
}
