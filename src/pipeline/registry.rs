use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::Result;

use crate::config::BackendSettings;

use super::backend::{BackendKind, Pipeline, TranslationBackend, VisionBackend};
use super::backends::{CommandOcrBackend, HttpTranslator, HttpVisionBackend};

type Loader<T> = Box<dyn Fn() -> Result<Arc<T>> + Send + Sync>;

/// Outcome of resolving a backend.
///
/// Once a kind resolves to either variant it stays that way for the life of
/// the registry.
pub enum BackendHandle<T: ?Sized> {
    Ready(Arc<T>),
    Unavailable(Arc<str>),
}

impl<T: ?Sized> Clone for BackendHandle<T> {
    fn clone(&self) -> Self {
        match self {
            BackendHandle::Ready(backend) => BackendHandle::Ready(backend.clone()),
            BackendHandle::Unavailable(reason) => BackendHandle::Unavailable(reason.clone()),
        }
    }
}

/// Observable lifecycle of a backend slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendState {
    Uninitialized,
    Ready,
    Unavailable,
}

struct BackendSlot<T: ?Sized> {
    kind: BackendKind,
    loader: Option<Loader<T>>,
    handle: OnceLock<BackendHandle<T>>,
    attempts: AtomicUsize,
}

impl<T: ?Sized> BackendSlot<T> {
    fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            loader: None,
            handle: OnceLock::new(),
            attempts: AtomicUsize::new(0),
        }
    }

    fn get(&self) -> BackendHandle<T> {
        // OnceLock admits exactly one initializer; concurrent first callers
        // wait for it and then observe the same handle.
        self.handle.get_or_init(|| self.initialize()).clone()
    }

    fn initialize(&self) -> BackendHandle<T> {
        let label = self.kind.label();
        let Some(loader) = self.loader.as_ref() else {
            log::warn!("{} backend not configured; serving fallback results", label);
            return BackendHandle::Unavailable(Arc::from("not configured"));
        };

        self.attempts.fetch_add(1, Ordering::SeqCst);
        match panic::catch_unwind(AssertUnwindSafe(loader)) {
            Ok(Ok(backend)) => {
                log::info!("{} backend ready", label);
                BackendHandle::Ready(backend)
            }
            Ok(Err(err)) => {
                log::warn!("{} backend unavailable for this process: {:#}", label, err);
                BackendHandle::Unavailable(Arc::from(format!("{err:#}")))
            }
            Err(_) => {
                log::error!("{} backend initializer panicked; marking unavailable", label);
                BackendHandle::Unavailable(Arc::from("initializer panicked"))
            }
        }
    }

    fn state(&self) -> BackendState {
        match self.handle.get() {
            None => BackendState::Uninitialized,
            Some(BackendHandle::Ready(_)) => BackendState::Ready,
            Some(BackendHandle::Unavailable(_)) => BackendState::Unavailable,
        }
    }
}

/// Lazily initialized, process-wide cache of heavy backends.
///
/// Each kind is initialized at most once, on first use. A failed
/// initialization is recorded as `Unavailable` and never retried.
pub struct BackendRegistry {
    caption: BackendSlot<dyn VisionBackend>,
    traffic: BackendSlot<dyn VisionBackend>,
    ocr: BackendSlot<dyn VisionBackend>,
    translation: BackendSlot<dyn TranslationBackend>,
}

impl BackendRegistry {
    /// Registry with no loaders; every kind resolves to `Unavailable`.
    pub fn new() -> Self {
        Self {
            caption: BackendSlot::new(BackendKind::Vision(Pipeline::Caption)),
            traffic: BackendSlot::new(BackendKind::Vision(Pipeline::Traffic)),
            ocr: BackendSlot::new(BackendKind::Vision(Pipeline::Ocr)),
            translation: BackendSlot::new(BackendKind::Translation),
        }
    }

    /// Build loaders for every backend named in `settings`.
    ///
    /// Loaders only run on first use, so a misconfigured backend surfaces as
    /// a degraded response rather than a startup failure.
    pub fn from_settings(settings: &BackendSettings) -> Self {
        let mut registry = Self::new();
        let timeout = settings.timeout;

        if let Some(url) = settings.caption_url.clone() {
            registry.register_vision(Pipeline::Caption, move || {
                Ok(Arc::new(HttpVisionBackend::new("caption-http", &url, timeout)?))
            });
        }
        if let Some(url) = settings.traffic_url.clone() {
            registry.register_vision(Pipeline::Traffic, move || {
                Ok(Arc::new(HttpVisionBackend::new("traffic-http", &url, timeout)?))
            });
        }
        if let Some(command) = settings.ocr_command.clone() {
            registry.register_vision(Pipeline::Ocr, move || {
                Ok(Arc::new(CommandOcrBackend::probe(&command)?))
            });
        }
        if let Some(url) = settings.translate_url.clone() {
            let api_key = settings.translate_api_key.clone();
            registry.register_translator(move || {
                Ok(Arc::new(HttpTranslator::new(&url, api_key.clone(), timeout)?))
            });
        }
        registry
    }

    /// Install the loader for a vision pipeline, replacing any previous one.
    pub fn register_vision<F>(&mut self, pipeline: Pipeline, loader: F)
    where
        F: Fn() -> Result<Arc<dyn VisionBackend>> + Send + Sync + 'static,
    {
        self.vision_slot_mut(pipeline).loader = Some(Box::new(loader));
    }

    pub fn register_translator<F>(&mut self, loader: F)
    where
        F: Fn() -> Result<Arc<dyn TranslationBackend>> + Send + Sync + 'static,
    {
        self.translation.loader = Some(Box::new(loader));
    }

    /// Resolve the vision backend for `pipeline`, initializing it on first use.
    pub fn vision(&self, pipeline: Pipeline) -> BackendHandle<dyn VisionBackend> {
        self.vision_slot(pipeline).get()
    }

    /// Resolve the translation backend, initializing it on first use.
    pub fn translator(&self) -> BackendHandle<dyn TranslationBackend> {
        self.translation.get()
    }

    pub fn state(&self, kind: BackendKind) -> BackendState {
        match kind {
            BackendKind::Vision(pipeline) => self.vision_slot(pipeline).state(),
            BackendKind::Translation => self.translation.state(),
        }
    }

    /// Number of times the loader for `kind` has run. Never exceeds one.
    pub fn init_attempts(&self, kind: BackendKind) -> usize {
        match kind {
            BackendKind::Vision(pipeline) => self.vision_slot(pipeline).attempts.load(Ordering::SeqCst),
            BackendKind::Translation => self.translation.attempts.load(Ordering::SeqCst),
        }
    }

    /// Resolve every backend now instead of on first request.
    pub fn warm_up(&self) {
        for pipeline in Pipeline::ALL {
            let _ = self.vision(pipeline);
        }
        let _ = self.translator();
    }

    fn vision_slot(&self, pipeline: Pipeline) -> &BackendSlot<dyn VisionBackend> {
        match pipeline {
            Pipeline::Caption => &self.caption,
            Pipeline::Traffic => &self.traffic,
            Pipeline::Ocr => &self.ocr,
        }
    }

    fn vision_slot_mut(&mut self, pipeline: Pipeline) -> &mut BackendSlot<dyn VisionBackend> {
        match pipeline {
            Pipeline::Caption => &mut self.caption,
            Pipeline::Traffic => &mut self.traffic,
            Pipeline::Ocr => &mut self.ocr,
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
