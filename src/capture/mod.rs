//! Camera access for the narrator client.

mod frame;
mod guard;
mod source;
#[cfg(feature = "camera-v4l2")]
mod v4l2;

use thiserror::Error;

pub use frame::CapturedFrame;
pub use guard::CaptureGuard;
pub use source::{open_camera, FrameSource, StillImageCamera, SyntheticCamera};
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

/// Capture failures. All of them are recoverable: the cycle is skipped and
/// the next trigger tries again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera error: {0}")]
    Device(String),
    #[error("camera returned an empty frame")]
    EmptyFrame,
    #[error("frame encoding failed: {0}")]
    Encode(String),
    #[error("camera has been released")]
    Released,
}
