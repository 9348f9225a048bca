//! Frame Narrator
//!
//! Captures still frames from a camera, sends them to an inference gateway
//! and speaks the returned description or recognized text.
//!
//! # Architecture
//!
//! The crate holds both halves of the system:
//!
//! - **Client** (`capture`, `trigger`, `upload`, `speech`, `session`): a
//!   timer, a keyboard and hardware pins decide when to capture and which
//!   endpoint the frame goes to. One [`capture::CaptureGuard`] serializes
//!   camera access. Upload failures are fatal; everything else is retried
//!   on the next trigger.
//! - **Gateway** (`gateway`, `pipeline`): routes `/caption/{lang}`,
//!   `/ocr/{lang}` and `/traffic` to lazily initialized backends. A backend
//!   that cannot be loaded or fails on a call yields a fixed placeholder, so
//!   responses keep their shape whatever the backends do.
//!
//! # Module Structure
//!
//! - `config`: environment and JSON file configuration for both binaries
//! - `language`: language code aliases and validation
//! - `multipart`: the `multipart/form-data` subset used on the wire

pub mod capture;
pub mod config;
pub mod gateway;
pub mod language;
pub mod multipart;
pub mod pipeline;
pub mod session;
pub mod speech;
pub mod trigger;
pub mod upload;

use sha2::{Digest, Sha256};

pub use capture::{CaptureError, CaptureGuard, CapturedFrame, FrameSource};
pub use gateway::{GatewayHandle, GatewayRouter, GatewayServer, RequestError};
pub use pipeline::{BackendRegistry, InferencePipeline, InferenceResult, Pipeline};
pub use session::{ClientSession, CycleOutcome, SessionError, SessionState};
pub use speech::{SpeechOutcome, SpeechSink};
pub use trigger::{Endpoint, EndpointSelector, TriggerMultiplexer, TriggerSource};
pub use upload::{ServerReply, UploadClient, UploadError, Uploader};

/// Short hex digest of a payload, for correlating log lines without logging
/// image bytes.
pub fn digest_prefix(data: &[u8]) -> String {
    hex::encode(&Sha256::digest(data)[..6])
}
