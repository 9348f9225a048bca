//! Local V4L2 camera.
//!
//! Asks the driver for MJPEG so frames can be forwarded as-is. Drivers that
//! only offer packed RGB get encoded to JPEG here.

use ouroboros::self_referencing;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::FourCC;

use super::source::{encode_jpeg, FrameSource};
use super::{CaptureError, CapturedFrame};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const BUFFER_COUNT: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PixelFormat {
    Mjpeg,
    Rgb,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct V4l2Camera {
    path: String,
    state: DeviceState,
    format: PixelFormat,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl V4l2Camera {
    pub fn open(path: &str) -> Result<Self, CaptureError> {
        let device_error = |what: &str, err: std::io::Error| {
            CaptureError::Device(format!("{what} {path}: {err}"))
        };

        let mut device = v4l::Device::with_path(path).map_err(|err| device_error("open", err))?;
        let mut format = device
            .format()
            .map_err(|err| device_error("read format of", err))?;
        format.width = WIDTH;
        format.height = HEIGHT;
        format.fourcc = FourCC::new(b"MJPG");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("failed to request MJPEG on {}: {}", path, err);
                device
                    .format()
                    .map_err(|err| device_error("read format of", err))?
            }
        };
        let pixel_format = if format.fourcc == FourCC::new(b"MJPG") {
            PixelFormat::Mjpeg
        } else if format.fourcc == FourCC::new(b"RGB3") {
            PixelFormat::Rgb
        } else {
            return Err(CaptureError::Device(format!(
                "{} offers unsupported pixel format {}",
                path, format.fourcc
            )));
        };

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
            },
        }
        .try_build()
        .map_err(|err| device_error("create buffer stream for", err))?;

        log::info!(
            "camera {} opened ({}x{}, {:?})",
            path,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            path: path.to_string(),
            state,
            format: pixel_format,
            width: format.width,
            height: format.height,
            frame_count: 0,
        })
    }
}

impl FrameSource for V4l2Camera {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn read_frame(&mut self) -> Result<CapturedFrame, CaptureError> {
        let (buf, meta) = self
            .state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| CaptureError::Device(format!("capture from {}: {}", self.path, err)))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let data = &buf[..used];
        if data.is_empty() {
            return Err(CaptureError::EmptyFrame);
        }

        let bytes = match self.format {
            PixelFormat::Mjpeg => data.to_vec(),
            PixelFormat::Rgb => encode_jpeg(data, self.width, self.height)?,
        };
        self.frame_count += 1;
        Ok(CapturedFrame::new(bytes, "image/jpeg", self.frame_count))
    }
}
