//! Capture triggers.
//!
//! Three sources decide when to capture and where to send the frame:
//! a fixed-interval timer, a keyboard that picks the endpoint for the next
//! capture, and hardware pin interrupts. The timer and keyboard share one
//! [`EndpointSelector`]; each pin is bound to its own endpoint.

mod interrupt;
mod keyboard;
mod multiplexer;

use std::sync::{Mutex, PoisonError};

pub use interrupt::{
    parse_pin_line, pin_endpoint, spawn_pin_reader, Debouncer, InterruptDispatcher, PinOutcome,
    WorkerPool, DEBOUNCE_WINDOW, PIN_TABLE,
};
pub use keyboard::{key_command, ChannelInput, InputPoller, KeyCommand};
#[cfg(unix)]
pub use keyboard::RawTerminal;
pub use multiplexer::{MultiplexerExit, TriggerMultiplexer};

/// Server route a frame is uploaded to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Caption,
    Ocr,
    Traffic,
    Search,
}

impl Endpoint {
    /// Request path, with `language` applied where the route takes one.
    pub fn path(self, language: &str) -> String {
        match self {
            Endpoint::Caption => format!("/caption/{language}"),
            Endpoint::Ocr => format!("/ocr/{language}"),
            Endpoint::Traffic => "/traffic".to_string(),
            Endpoint::Search => "/search".to_string(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Caption => "caption",
            Endpoint::Ocr => "ocr",
            Endpoint::Traffic => "traffic",
            Endpoint::Search => "search",
        }
    }
}

/// What started a capture cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerSource {
    Timer,
    Keyboard,
    Interrupt(u8),
}

#[derive(Debug)]
struct Selection {
    default: Endpoint,
    pending: Option<Endpoint>,
}

/// Shared "next endpoint" state.
///
/// Writers set a one-shot override; the capture that next wins the camera
/// consumes it. Later writes replace earlier ones.
#[derive(Debug)]
pub struct EndpointSelector {
    state: Mutex<Selection>,
}

impl EndpointSelector {
    pub fn new(default: Endpoint) -> Self {
        Self {
            state: Mutex::new(Selection {
                default,
                pending: None,
            }),
        }
    }

    /// Route the next capture (only) to `endpoint`.
    pub fn select_next(&self, endpoint: Endpoint) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = state.pending.replace(endpoint) {
            if previous != endpoint {
                log::debug!(
                    "endpoint override {} replaced by {}",
                    previous.name(),
                    endpoint.name()
                );
            }
        }
    }

    /// Consume the pending override, or fall back to the default.
    pub fn take_next(&self) -> Endpoint {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending.take().unwrap_or(state.default)
    }

    pub fn pending(&self) -> Option<Endpoint> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
    }

    pub fn default_endpoint(&self) -> Endpoint {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .default
    }
}

impl Default for EndpointSelector {
    fn default() -> Self {
        Self::new(Endpoint::Caption)
    }
}
