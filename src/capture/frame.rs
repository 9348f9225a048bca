/// One encoded still image handed from the camera to the uploader.
///
/// Frames are moved, never cloned; each capture produces a fresh buffer that
/// is dropped once the upload finishes.
#[derive(Debug, PartialEq, Eq)]
pub struct CapturedFrame {
    bytes: Vec<u8>,
    content_type: &'static str,
    sequence: u64,
}

impl CapturedFrame {
    pub fn new(bytes: Vec<u8>, content_type: &'static str, sequence: u64) -> Self {
        Self {
            bytes,
            content_type,
            sequence,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// Per-source capture counter, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name used for the upload part.
    pub fn file_name(&self) -> &'static str {
        match self.content_type {
            "image/png" => "frame.png",
            _ => "frame.jpg",
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
