use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};

use crate::pipeline::backend::{TranslationBackend, VisionBackend};

/// Stub vision backend for testing. Answers every image with a fixed text,
/// or fails every call when built with [`StubVisionBackend::failing`].
pub struct StubVisionBackend {
    text: Option<String>,
    calls: AtomicUsize,
}

impl StubVisionBackend {
    pub fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            text: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VisionBackend for StubVisionBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn describe(&self, image: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if image.is_empty() {
            return Err(anyhow!("empty image"));
        }
        self.text
            .clone()
            .ok_or_else(|| anyhow!("stub backend configured to fail"))
    }
}

/// Stub translator: tags the text with the target language, e.g. `[hi] text`.
pub struct StubTranslator {
    fail: bool,
    calls: AtomicUsize,
}

impl StubTranslator {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StubTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationBackend for StubTranslator {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("translation service unreachable"));
        }
        Ok(format!("[{target_language}] {text}"))
    }
}
