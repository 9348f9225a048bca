use anyhow::Result;

/// Inference pipelines served by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pipeline {
    /// General scene captioning.
    Caption,
    /// Traffic-scene captioning. Always answers in English.
    Traffic,
    /// Text recognition.
    Ocr,
}

impl Pipeline {
    pub const ALL: [Pipeline; 3] = [Pipeline::Caption, Pipeline::Traffic, Pipeline::Ocr];

    pub fn name(self) -> &'static str {
        match self {
            Pipeline::Caption => "caption",
            Pipeline::Traffic => "traffic",
            Pipeline::Ocr => "ocr",
        }
    }

    /// Whether the requested language is applied to this pipeline's output.
    pub fn translates_output(self) -> bool {
        !matches!(self, Pipeline::Traffic)
    }
}

/// Backend kinds held by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Vision(Pipeline),
    Translation,
}

impl BackendKind {
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Vision(pipeline) => pipeline.name(),
            BackendKind::Translation => "translation",
        }
    }
}

impl From<Pipeline> for BackendKind {
    fn from(pipeline: Pipeline) -> Self {
        BackendKind::Vision(pipeline)
    }
}

/// Vision-to-text capability (captioning or OCR).
///
/// Implementations receive encoded image bytes exactly as uploaded and must
/// not retain them past the call.
pub trait VisionBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Produce text for one image.
    fn describe(&self, image: &[u8]) -> Result<String>;
}

/// Text translation capability. Source text is always English.
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn translate(&self, text: &str, target_language: &str) -> Result<String>;
}
