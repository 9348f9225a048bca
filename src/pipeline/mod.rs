//! Server-side inference pipelines.
//!
//! A request flows through three stages:
//! 1. `BackendRegistry` resolves (and lazily initializes) the backend
//! 2. `DegradationPolicy` runs it or substitutes a fixed placeholder
//! 3. `Translator` renders the English output in the requested language
//!
//! No stage here returns an error to the caller. Backend and translation
//! failures only change the content of the result.

mod backend;
pub mod backends;
mod degrade;
mod registry;
mod result;
mod translate;

use std::sync::Arc;

pub use backend::{BackendKind, Pipeline, TranslationBackend, VisionBackend};
pub use degrade::{
    fallback, DegradationPolicy, CAPTION_CONFIDENCE, CAPTION_FALLBACK,
    CAPTION_FALLBACK_CONFIDENCE, OCR_CONFIDENCE, OCR_FALLBACK, OCR_FALLBACK_CONFIDENCE,
};
pub use registry::{BackendHandle, BackendRegistry, BackendState};
pub use result::{
    CaptionResponse, InferenceResult, OutputSource, PipelineOutput, PipelineResponse,
    TextResponse,
};
pub use translate::Translator;

use crate::language::DEFAULT_LANGUAGE;

/// Degradation followed by translation, sharing one registry.
pub struct InferencePipeline {
    registry: Arc<BackendRegistry>,
    policy: DegradationPolicy,
    translator: Translator,
}

impl InferencePipeline {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            policy: DegradationPolicy::new(registry.clone()),
            translator: Translator::new(registry.clone()),
            registry,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Run `pipeline` on `image`. `language` must already be canonical.
    pub fn run(&self, pipeline: Pipeline, language: &str, image: &[u8]) -> InferenceResult {
        let output = self.policy.run(pipeline, image);
        let language = if pipeline.translates_output() {
            language
        } else {
            DEFAULT_LANGUAGE
        };
        let primary_text = self.translator.translate(&output.text, language);

        InferenceResult {
            primary_text,
            source_text_en: output.text,
            confidence: output.confidence,
            language: language.to_string(),
            source: output.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backends::{StubTranslator, StubVisionBackend};

    #[test]
    fn traffic_ignores_requested_language() {
        let mut registry = BackendRegistry::new();
        registry.register_vision(Pipeline::Traffic, || {
            Ok(Arc::new(StubVisionBackend::new("heavy traffic at a junction")))
        });
        registry.register_translator(|| Ok(Arc::new(StubTranslator::new())));
        let pipeline = InferencePipeline::new(Arc::new(registry));

        let result = pipeline.run(Pipeline::Traffic, "hi", b"frame");
        assert_eq!(result.language, "en");
        assert_eq!(result.primary_text, "heavy traffic at a junction");
        assert_eq!(result.source_text_en, result.primary_text);
        assert_eq!(pipeline.registry().init_attempts(BackendKind::Translation), 0);
    }

    #[test]
    fn caption_is_translated_and_keeps_english_source() {
        let mut registry = BackendRegistry::new();
        registry.register_vision(Pipeline::Caption, || {
            Ok(Arc::new(StubVisionBackend::new("a dog running")))
        });
        registry.register_translator(|| Ok(Arc::new(StubTranslator::new())));
        let pipeline = InferencePipeline::new(Arc::new(registry));

        let result = pipeline.run(Pipeline::Caption, "hi", b"frame");
        assert_eq!(result.source_text_en, "a dog running");
        assert_eq!(result.primary_text, "[hi] a dog running");
        assert_eq!(result.language, "hi");
        assert_eq!(result.confidence, CAPTION_CONFIDENCE);
    }

    #[test]
    fn failed_translation_keeps_caption_equal_to_source() {
        let mut registry = BackendRegistry::new();
        registry.register_vision(Pipeline::Caption, || {
            Ok(Arc::new(StubVisionBackend::new("a dog running")))
        });
        registry.register_translator(|| Ok(Arc::new(StubTranslator::failing())));
        let pipeline = InferencePipeline::new(Arc::new(registry));

        let result = pipeline.run(Pipeline::Caption, "hi", b"frame");
        assert_eq!(result.primary_text, result.source_text_en);
    }
}
