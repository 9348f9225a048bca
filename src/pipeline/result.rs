use serde::{Deserialize, Serialize};

use super::backend::Pipeline;

/// Where a pipeline's text came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputSource {
    /// A ready backend answered.
    Live,
    /// The backend could not be initialized for this process.
    Unavailable,
    /// The backend was ready but failed on this call.
    CallFailed,
}

/// Untranslated pipeline output.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOutput {
    pub text: String,
    pub confidence: f64,
    pub source: OutputSource,
}

impl PipelineOutput {
    pub fn is_degraded(&self) -> bool {
        self.source != OutputSource::Live
    }
}

/// Result of one request through a pipeline, after translation.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceResult {
    /// Text in the requested language (equals `source_text_en` when untranslated).
    pub primary_text: String,
    pub source_text_en: String,
    /// Coarse quality signal in `[0, 1]`. Not used for control flow.
    pub confidence: f64,
    pub language: String,
    pub source: OutputSource,
}

impl InferenceResult {
    pub fn is_degraded(&self) -> bool {
        self.source != OutputSource::Live
    }

    /// Shape the result into the wire response for `pipeline`.
    pub fn into_response(self, pipeline: Pipeline) -> PipelineResponse {
        match pipeline {
            Pipeline::Caption | Pipeline::Traffic => PipelineResponse::Caption(CaptionResponse {
                caption: self.primary_text,
                caption_en: self.source_text_en,
                confidence: self.confidence,
                language: self.language,
            }),
            Pipeline::Ocr => PipelineResponse::Text(TextResponse {
                text: self.primary_text,
                text_en: self.source_text_en,
                confidence: self.confidence,
                language: self.language,
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptionResponse {
    pub caption: String,
    pub caption_en: String,
    pub confidence: f64,
    pub language: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextResponse {
    pub text: String,
    pub text_en: String,
    pub confidence: f64,
    pub language: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PipelineResponse {
    Caption(CaptionResponse),
    Text(TextResponse),
}
