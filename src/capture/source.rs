use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::multipart::sniff_image_type;

use super::{CaptureError, CapturedFrame};

const SYNTHETIC_WIDTH: u32 = 64;
const SYNTHETIC_HEIGHT: u32 = 48;
const JPEG_QUALITY: u8 = 80;

/// A camera the capture guard can read from.
pub trait FrameSource: Send {
    /// Human-readable identity for logs.
    fn describe(&self) -> String;

    /// Read and encode one still image.
    fn read_frame(&mut self) -> Result<CapturedFrame, CaptureError>;
}

/// Open the camera named by `name`.
///
/// - `stub://<name>`: synthetic gradient camera
/// - `file://<path>`: re-reads a still image on every capture
/// - `0`, `/dev/video0`: V4L2 device (requires the `camera-v4l2` feature)
pub fn open_camera(name: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
    if let Some(name) = name.strip_prefix("stub://") {
        return Ok(Box::new(SyntheticCamera::new(name)));
    }
    if let Some(path) = name.strip_prefix("file://") {
        return Ok(Box::new(StillImageCamera::open(path)?));
    }
    let device = if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        format!("/dev/video{name}")
    } else {
        name.to_string()
    };
    open_device(&device)
}

#[cfg(feature = "camera-v4l2")]
fn open_device(device: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
    Ok(Box::new(super::v4l2::V4l2Camera::open(device)?))
}

#[cfg(not(feature = "camera-v4l2"))]
fn open_device(device: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
    Err(CaptureError::Device(format!(
        "cannot open {device}: built without the camera-v4l2 feature (use stub:// or file://)"
    )))
}

/// Encode packed RGB pixels as a baseline JPEG.
pub(crate) fn encode_jpeg(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode(pixels, width, height, ExtendedColorType::Rgb8)
        .map_err(|err| CaptureError::Encode(err.to_string()))?;
    Ok(out)
}

/// Synthetic camera for tests and demos.
///
/// Produces a moving gradient so consecutive frames differ. Can be told to
/// fail its first reads, and reports its release through a shared flag.
pub struct SyntheticCamera {
    name: String,
    frame_count: u64,
    failures_left: u32,
    released: Option<Arc<AtomicBool>>,
}

impl SyntheticCamera {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            frame_count: 0,
            failures_left: 0,
            released: None,
        }
    }

    /// Fail the next `count` reads with a device error.
    pub fn with_failures(mut self, count: u32) -> Self {
        self.failures_left = count;
        self
    }

    /// Raise `flag` when the camera is dropped.
    pub fn with_release_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.released = Some(flag);
        self
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let shift = (self.frame_count % 256) as u32;
        let mut pixels = Vec::with_capacity((SYNTHETIC_WIDTH * SYNTHETIC_HEIGHT * 3) as usize);
        for y in 0..SYNTHETIC_HEIGHT {
            for x in 0..SYNTHETIC_WIDTH {
                pixels.push(((x * 4 + shift) % 256) as u8);
                pixels.push(((y * 5 + shift) % 256) as u8);
                pixels.push(((x + y + shift) % 256) as u8);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticCamera {
    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }

    fn read_frame(&mut self) -> Result<CapturedFrame, CaptureError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(CaptureError::Device(format!(
                "synthetic camera '{}' read failure",
                self.name
            )));
        }
        self.frame_count += 1;
        let jpeg = encode_jpeg(&self.generate_pixels(), SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT)?;
        Ok(CapturedFrame::new(jpeg, "image/jpeg", self.frame_count))
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        if let Some(flag) = &self.released {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Camera backed by an image file on disk.
pub struct StillImageCamera {
    path: PathBuf,
    frame_count: u64,
}

impl StillImageCamera {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let path = path.into();
        if !path.is_file() {
            return Err(CaptureError::Device(format!(
                "still image {} not found",
                path.display()
            )));
        }
        Ok(Self {
            path,
            frame_count: 0,
        })
    }
}

impl FrameSource for StillImageCamera {
    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }

    fn read_frame(&mut self) -> Result<CapturedFrame, CaptureError> {
        let bytes = std::fs::read(&self.path).map_err(|err| {
            CaptureError::Device(format!("read {}: {}", self.path.display(), err))
        })?;
        self.frame_count += 1;
        let content_type = sniff_image_type(&bytes);
        Ok(CapturedFrame::new(bytes, content_type, self.frame_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_frames_are_jpeg_and_change() {
        let mut camera = SyntheticCamera::new("test");
        let first = camera.read_frame().unwrap();
        let second = camera.read_frame().unwrap();
        assert_eq!(first.content_type(), "image/jpeg");
        assert!(first.bytes().starts_with(&[0xFF, 0xD8, 0xFF]));
        assert_eq!(second.sequence(), 2);
        assert_ne!(first.bytes(), second.bytes());
    }

    #[test]
    fn synthetic_failures_are_device_errors() {
        let mut camera = SyntheticCamera::new("flaky").with_failures(1);
        assert!(matches!(camera.read_frame(), Err(CaptureError::Device(_))));
        assert!(camera.read_frame().is_ok());
    }

    #[test]
    fn release_flag_is_raised_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));
        let camera = SyntheticCamera::new("x").with_release_flag(flag.clone());
        assert!(!flag.load(Ordering::SeqCst));
        drop(camera);
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn still_image_camera_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        std::fs::write(&path, b"\xFF\xD8\xFFone").unwrap();

        let mut camera = open_camera(&format!("file://{}", path.display())).unwrap();
        assert_eq!(camera.read_frame().unwrap().bytes(), b"\xFF\xD8\xFFone");
        std::fs::write(&path, b"\xFF\xD8\xFFtwo").unwrap();
        assert_eq!(camera.read_frame().unwrap().bytes(), b"\xFF\xD8\xFFtwo");

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(camera.read_frame(), Err(CaptureError::Device(_))));
    }

    #[test]
    fn open_camera_dispatches_on_scheme() {
        assert_eq!(open_camera("stub://desk").unwrap().describe(), "stub://desk");
        assert!(open_camera("file:///definitely/not/here.jpg").is_err());
    }

    #[cfg(not(feature = "camera-v4l2"))]
    #[test]
    fn device_cameras_need_the_v4l2_feature() {
        let err = open_camera("0").err().unwrap();
        assert!(err.to_string().contains("/dev/video0"));
    }
}
