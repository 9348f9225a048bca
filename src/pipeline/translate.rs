use std::sync::Arc;

use crate::language::is_english;

use super::registry::{BackendHandle, BackendRegistry};

/// Best-effort translation of pipeline output.
///
/// Never fails: English targets, an unavailable backend, or a failed call all
/// return the source text unchanged.
pub struct Translator {
    registry: Arc<BackendRegistry>,
}

impl Translator {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    pub fn translate(&self, text: &str, language: &str) -> String {
        if is_english(language) || text.trim().is_empty() {
            return text.to_string();
        }

        let backend = match self.registry.translator() {
            BackendHandle::Ready(backend) => backend,
            BackendHandle::Unavailable(_) => return text.to_string(),
        };

        match backend.translate(text, language) {
            Ok(translated) if !translated.trim().is_empty() => translated,
            Ok(_) => {
                log::warn!("translation to '{}' came back empty; keeping source text", language);
                text.to_string()
            }
            Err(err) => {
                log::warn!(
                    "translation to '{}' via '{}' failed: {:#}",
                    language,
                    backend.name(),
                    err
                );
                text.to_string()
            }
        }
    }
}
