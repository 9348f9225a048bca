use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{CaptureError, CapturedFrame, FrameSource};

/// Exclusive owner of the camera.
///
/// Every capture goes through one lock held for the device read and encode
/// only. Callers upload and speak after the lock is released.
pub struct CaptureGuard {
    source: Mutex<Option<Box<dyn FrameSource>>>,
    label: String,
}

impl CaptureGuard {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        let label = source.describe();
        Self {
            source: Mutex::new(Some(source)),
            label,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn acquire_frame(&self) -> Result<CapturedFrame, CaptureError> {
        self.acquire_with(|| ()).map(|(frame, ())| frame)
    }

    /// Capture a frame, then run `select` while still holding the lock.
    ///
    /// `select` only runs after a successful read, so a failed capture
    /// leaves whatever state it would have consumed untouched.
    pub fn acquire_with<T>(
        &self,
        select: impl FnOnce() -> T,
    ) -> Result<(CapturedFrame, T), CaptureError> {
        let mut slot = self.lock();
        let source = slot.as_mut().ok_or(CaptureError::Released)?;
        let frame = source.read_frame()?;
        if frame.is_empty() {
            return Err(CaptureError::EmptyFrame);
        }
        let selected = select();
        Ok((frame, selected))
    }

    /// Close the camera. Later captures fail with [`CaptureError::Released`].
    pub fn release(&self) {
        if self.lock().take().is_some() {
            log::info!("camera {} released", self.label);
        }
    }

    pub fn is_released(&self) -> bool {
        self.lock().is_none()
    }

    // A panic inside a driver read must not wedge every later trigger.
    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn FrameSource>>> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
