use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::backend::Pipeline;
use super::registry::{BackendHandle, BackendRegistry};
use super::result::{OutputSource, PipelineOutput};

/// Placeholder caption served when captioning is unavailable.
pub const CAPTION_FALLBACK: &str = "A sample caption describing the scene.";
/// Placeholder text served when OCR is unavailable.
pub const OCR_FALLBACK: &str = "Sample OCR: The quick brown fox jumps over the lazy dog.";

pub const CAPTION_CONFIDENCE: f64 = 0.85;
pub const CAPTION_FALLBACK_CONFIDENCE: f64 = 0.5;
pub const OCR_CONFIDENCE: f64 = 0.9;
pub const OCR_FALLBACK_CONFIDENCE: f64 = 0.8;

/// Runs a pipeline's backend, substituting a fixed placeholder whenever the
/// backend is unavailable or fails on the call.
///
/// The response always has the same shape; only `source` tells live and
/// placeholder results apart.
pub struct DegradationPolicy {
    registry: Arc<BackendRegistry>,
}

impl DegradationPolicy {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    pub fn run(&self, pipeline: Pipeline, image: &[u8]) -> PipelineOutput {
        let backend = match self.registry.vision(pipeline) {
            BackendHandle::Ready(backend) => backend,
            BackendHandle::Unavailable(reason) => {
                log::debug!(
                    "{} backend unavailable ({}); serving placeholder",
                    pipeline.name(),
                    reason
                );
                return fallback(pipeline, OutputSource::Unavailable);
            }
        };

        match panic::catch_unwind(AssertUnwindSafe(|| backend.describe(image))) {
            Ok(Ok(text)) => PipelineOutput {
                text,
                confidence: live_confidence(pipeline),
                source: OutputSource::Live,
            },
            Ok(Err(err)) => {
                log::warn!(
                    "{} backend '{}' failed on request: {:#}",
                    pipeline.name(),
                    backend.name(),
                    err
                );
                fallback(pipeline, OutputSource::CallFailed)
            }
            Err(_) => {
                log::error!(
                    "{} backend '{}' panicked on request",
                    pipeline.name(),
                    backend.name()
                );
                fallback(pipeline, OutputSource::CallFailed)
            }
        }
    }
}

/// Fixed placeholder for `pipeline`.
pub fn fallback(pipeline: Pipeline, source: OutputSource) -> PipelineOutput {
    let (text, confidence) = match pipeline {
        Pipeline::Caption | Pipeline::Traffic => (CAPTION_FALLBACK, CAPTION_FALLBACK_CONFIDENCE),
        Pipeline::Ocr => (OCR_FALLBACK, OCR_FALLBACK_CONFIDENCE),
    };
    PipelineOutput {
        text: text.to_string(),
        confidence,
        source,
    }
}

fn live_confidence(pipeline: Pipeline) -> f64 {
    match pipeline {
        Pipeline::Caption | Pipeline::Traffic => CAPTION_CONFIDENCE,
        Pipeline::Ocr => OCR_CONFIDENCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backend::{BackendKind, VisionBackend};
    use crate::pipeline::backends::StubVisionBackend;
    use crate::pipeline::registry::BackendState;

    #[test]
    fn unavailable_backend_yields_fixed_placeholder_for_any_frame() {
        let policy = DegradationPolicy::new(Arc::new(BackendRegistry::new()));

        let frames: [&[u8]; 3] = [b"\xFF\xD8\xFFjpeg", b"png-ish", b"x"];
        for frame in frames {
            let ocr = policy.run(Pipeline::Ocr, frame);
            assert_eq!(ocr.text, OCR_FALLBACK);
            assert_eq!(ocr.confidence, OCR_FALLBACK_CONFIDENCE);
            assert_eq!(ocr.source, OutputSource::Unavailable);

            let traffic = policy.run(Pipeline::Traffic, frame);
            assert_eq!(traffic.text, CAPTION_FALLBACK);
            assert_eq!(traffic.confidence, CAPTION_FALLBACK_CONFIDENCE);
        }
    }

    #[test]
    fn ready_backend_answers_at_live_confidence() {
        let mut registry = BackendRegistry::new();
        registry.register_vision(Pipeline::Caption, || {
            Ok(Arc::new(StubVisionBackend::new("a dog running")))
        });
        let policy = DegradationPolicy::new(Arc::new(registry));

        let out = policy.run(Pipeline::Caption, b"frame");
        assert_eq!(out.text, "a dog running");
        assert_eq!(out.confidence, CAPTION_CONFIDENCE);
        assert!(!out.is_degraded());
    }

    #[test]
    fn call_failure_degrades_without_changing_backend_state() {
        let mut registry = BackendRegistry::new();
        registry.register_vision(Pipeline::Ocr, || Ok(Arc::new(StubVisionBackend::failing())));
        let registry = Arc::new(registry);
        let policy = DegradationPolicy::new(registry.clone());

        let out = policy.run(Pipeline::Ocr, b"frame");
        assert_eq!(out.text, OCR_FALLBACK);
        assert_eq!(out.source, OutputSource::CallFailed);
        assert_eq!(registry.state(BackendKind::Vision(Pipeline::Ocr)), BackendState::Ready);
    }

    struct PanickingBackend;

    impl VisionBackend for PanickingBackend {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn describe(&self, _image: &[u8]) -> anyhow::Result<String> {
            panic!("tensor shape mismatch")
        }
    }

    #[test]
    fn panicking_call_degrades() {
        let mut registry = BackendRegistry::new();
        registry.register_vision(Pipeline::Caption, || Ok(Arc::new(PanickingBackend)));
        let policy = DegradationPolicy::new(Arc::new(registry));

        let out = policy.run(Pipeline::Caption, b"frame");
        assert_eq!(out.text, CAPTION_FALLBACK);
        assert_eq!(out.source, OutputSource::CallFailed);
    }
}
