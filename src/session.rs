use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::capture::{CaptureError, CaptureGuard};
use crate::language::canonical_language;
use crate::speech::{SpeechOutcome, SpeechSink};
use crate::trigger::{pin_endpoint, Endpoint, EndpointSelector, TriggerSource};
use crate::upload::{UploadError, Uploader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Uploading,
    Speaking,
    /// A fatal error ended the session; the camera has been released.
    Error,
}

/// Result of one capture/upload/speak cycle that did not end the session.
#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    Spoken {
        endpoint: Endpoint,
        text: String,
        speech: SpeechOutcome,
    },
    /// The server answered without anything to say.
    Silent { endpoint: Endpoint },
    /// The camera read failed; the next trigger retries.
    CaptureFailed(CaptureError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("fatal upload failure: {0}")]
    Upload(#[from] UploadError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub cycles: u64,
    pub spoken: u64,
    pub silent: u64,
    pub capture_failures: u64,
}

/// One running narrator client: a camera, an upload target and a voice.
pub struct ClientSession {
    camera: CaptureGuard,
    selector: Arc<EndpointSelector>,
    uploader: Box<dyn Uploader>,
    speech: SpeechSink,
    language: String,
    state: Mutex<SessionState>,
    stats: Mutex<SessionStats>,
}

impl ClientSession {
    pub fn new(
        camera: CaptureGuard,
        uploader: Box<dyn Uploader>,
        speech: SpeechSink,
        language: &str,
    ) -> Self {
        Self {
            camera,
            selector: Arc::new(EndpointSelector::default()),
            uploader,
            speech,
            language: language.to_string(),
            state: Mutex::new(SessionState::Idle),
            stats: Mutex::new(SessionStats::default()),
        }
    }

    pub fn with_selector(mut self, selector: Arc<EndpointSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn selector(&self) -> &Arc<EndpointSelector> {
        &self.selector
    }

    pub fn camera(&self) -> &CaptureGuard {
        &self.camera
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> SessionStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capture a frame, upload it and speak the reply.
    ///
    /// Interrupts from a mapped pin go to that pin's endpoint. Timer and
    /// keyboard cycles (and unmapped pins) consume the selector.
    ///
    /// Capture failures are reported as [`CycleOutcome::CaptureFailed`].
    /// Upload failures release the camera and are returned as errors; the
    /// caller is expected to end the process.
    pub fn run_cycle(&self, trigger: TriggerSource) -> Result<CycleOutcome, SessionError> {
        match trigger {
            TriggerSource::Interrupt(pin) => match pin_endpoint(pin) {
                Some(endpoint) => self.run_cycle_for(endpoint, trigger),
                None => self.cycle(trigger, || self.selector.take_next()),
            },
            TriggerSource::Timer | TriggerSource::Keyboard => {
                self.cycle(trigger, || self.selector.take_next())
            }
        }
    }

    /// Run one cycle against `endpoint`, leaving the selector untouched.
    pub fn run_cycle_for(
        &self,
        endpoint: Endpoint,
        trigger: TriggerSource,
    ) -> Result<CycleOutcome, SessionError> {
        self.cycle(trigger, || endpoint)
    }

    fn cycle(
        &self,
        trigger: TriggerSource,
        select: impl FnOnce() -> Endpoint,
    ) -> Result<CycleOutcome, SessionError> {
        self.update_stats(|stats| stats.cycles += 1);
        self.set_state(SessionState::Capturing);

        let (frame, endpoint) = match self.camera.acquire_with(select) {
            Ok(captured) => captured,
            Err(err) => {
                log::warn!("capture failed ({:?} trigger): {}", trigger, err);
                self.update_stats(|stats| stats.capture_failures += 1);
                self.set_state(SessionState::Idle);
                return Ok(CycleOutcome::CaptureFailed(err));
            }
        };
        log::debug!(
            "frame #{} captured for {} ({:?} trigger)",
            frame.sequence(),
            endpoint.name(),
            trigger
        );

        self.set_state(SessionState::Uploading);
        let reply = match self.uploader.upload(&frame, endpoint, &self.language) {
            Ok(reply) => reply,
            Err(err) => {
                log::error!("{}; releasing camera", err);
                self.set_state(SessionState::Error);
                self.camera.release();
                return Err(err.into());
            }
        };
        drop(frame);

        let Some(text) = reply.spoken_text() else {
            log::warn!("server reply for {} carried no text", endpoint.name());
            self.update_stats(|stats| stats.silent += 1);
            self.set_state(SessionState::Idle);
            return Ok(CycleOutcome::Silent { endpoint });
        };

        self.set_state(SessionState::Speaking);
        log::info!("{}: {}", endpoint.name(), text);
        // The reply names the language it is in; /traffic is always English.
        let voice = reply
            .language()
            .and_then(canonical_language)
            .unwrap_or_else(|| self.language.clone());
        let speech = self.speech.speak_in(text, &voice);
        self.update_stats(|stats| stats.spoken += 1);
        self.set_state(SessionState::Idle);
        Ok(CycleOutcome::Spoken {
            endpoint,
            text: text.to_string(),
            speech,
        })
    }

    /// Release the camera. Idempotent.
    pub fn shutdown(&self) {
        self.camera.release();
        if self.state() != SessionState::Error {
            self.set_state(SessionState::Idle);
        }
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Error is terminal.
        if *current != SessionState::Error {
            *current = state;
        }
    }

    fn update_stats(&self, update: impl FnOnce(&mut SessionStats)) {
        update(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}
