//! Spoken output on the client.
//!
//! `SpeechSink::speak` never fails: each strategy is tried in order and the
//! text is printed when none of them works.

use std::panic::{self, AssertUnwindSafe};
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};

pub trait SpeechStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn speak(&self, text: &str, language: &str) -> Result<()>;
}

/// Text-to-speech through an external program that takes the text as its
/// last argument.
pub struct CommandSpeech {
    program: String,
    language_flag: Option<&'static str>,
    extra_args: Vec<&'static str>,
}

impl CommandSpeech {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            language_flag: None,
            extra_args: Vec::new(),
        }
    }

    /// eSpeak, voice chosen by language code.
    pub fn espeak() -> Self {
        Self {
            language_flag: Some("-v"),
            ..Self::new("espeak")
        }
    }

    /// Speech Dispatcher; `-w` waits until the utterance is done.
    pub fn spd_say() -> Self {
        Self {
            language_flag: Some("-l"),
            extra_args: vec!["-w"],
            ..Self::new("spd-say")
        }
    }

    /// macOS `say`.
    pub fn say() -> Self {
        Self::new("say")
    }
}

impl SpeechStrategy for CommandSpeech {
    fn name(&self) -> &str {
        &self.program
    }

    fn speak(&self, text: &str, language: &str) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.args(&self.extra_args);
        if let Some(flag) = self.language_flag {
            command.args([flag, language]);
        }
        let status = command
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("run {}", self.program))?;
        if !status.success() {
            return Err(anyhow!("{} exited with {}", self.program, status));
        }
        Ok(())
    }
}

/// Strategy that remembers what it was asked to say.
#[derive(Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// `(text, language)` pairs in call order.
    pub fn spoken(&self) -> Vec<(String, String)> {
        self.spoken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SpeechStrategy for RecordingSpeech {
    fn name(&self) -> &str {
        "recording"
    }

    fn speak(&self, text: &str, language: &str) -> Result<()> {
        if self.fail {
            return Err(anyhow!("audio device unavailable"));
        }
        self.spoken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((text.to_string(), language.to_string()));
        Ok(())
    }
}

impl<T: SpeechStrategy + ?Sized> SpeechStrategy for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn speak(&self, text: &str, language: &str) -> Result<()> {
        (**self).speak(text, language)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// A strategy spoke the text.
    Spoken(String),
    /// Every strategy failed; the text went to stdout.
    Printed,
    /// Nothing to say.
    Skipped,
}

pub struct SpeechSink {
    strategies: Vec<Box<dyn SpeechStrategy>>,
    language: String,
}

impl SpeechSink {
    pub fn new(strategies: Vec<Box<dyn SpeechStrategy>>, language: &str) -> Self {
        Self {
            strategies,
            language: language.to_string(),
        }
    }

    /// espeak, then spd-say, then say.
    pub fn system(language: &str) -> Self {
        Self::new(
            vec![
                Box::new(CommandSpeech::espeak()),
                Box::new(CommandSpeech::spd_say()),
                Box::new(CommandSpeech::say()),
            ],
            language,
        )
    }

    /// Prints only.
    pub fn silent(language: &str) -> Self {
        Self::new(Vec::new(), language)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn speak(&self, text: &str) -> SpeechOutcome {
        self.speak_in(text, &self.language)
    }

    /// Speak `text` with the voice for `language` instead of the sink's own.
    pub fn speak_in(&self, text: &str, language: &str) -> SpeechOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SpeechOutcome::Skipped;
        }

        for strategy in &self.strategies {
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
                strategy.speak(text, language)
            }));
            match attempt {
                Ok(Ok(())) => return SpeechOutcome::Spoken(strategy.name().to_string()),
                Ok(Err(err)) => {
                    log::debug!("speech via {} failed: {:#}", strategy.name(), err)
                }
                Err(_) => log::warn!("speech via {} panicked", strategy.name()),
            }
        }

        println!("{text}");
        SpeechOutcome::Printed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Panicky;

    impl SpeechStrategy for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }

        fn speak(&self, _text: &str, _language: &str) -> Result<()> {
            panic!("audio driver crashed")
        }
    }

    #[test]
    fn falls_through_to_first_working_strategy() {
        let recorder = Arc::new(RecordingSpeech::new());
        let sink = SpeechSink::new(
            vec![
                Box::new(RecordingSpeech::failing()),
                Box::new(Panicky),
                Box::new(recorder.clone()),
            ],
            "hi",
        );
        assert_eq!(sink.speak("नमस्ते"), SpeechOutcome::Spoken("recording".into()));
        assert_eq!(recorder.spoken(), vec![("नमस्ते".to_string(), "hi".to_string())]);
    }

    #[test]
    fn prints_when_every_strategy_fails() {
        let sink = SpeechSink::new(
            vec![
                Box::new(CommandSpeech::new("narrator-no-such-tts")),
                Box::new(RecordingSpeech::failing()),
            ],
            "en",
        );
        assert_eq!(sink.speak("a dog on a sofa"), SpeechOutcome::Printed);
        assert_eq!(SpeechSink::silent("en").speak("x"), SpeechOutcome::Printed);
    }

    #[test]
    fn speak_in_overrides_sink_language() {
        let recorder = Arc::new(RecordingSpeech::new());
        let sink = SpeechSink::new(vec![Box::new(recorder.clone())], "hi");
        sink.speak_in("the light is red", "en");
        sink.speak("लाल बत्ती");
        assert_eq!(
            recorder.spoken(),
            vec![
                ("the light is red".to_string(), "en".to_string()),
                ("लाल बत्ती".to_string(), "hi".to_string()),
            ]
        );
    }

    #[test]
    fn blank_text_is_skipped() {
        let recorder = Arc::new(RecordingSpeech::new());
        let sink = SpeechSink::new(vec![Box::new(recorder.clone())], "en");
        assert_eq!(sink.speak("  \n"), SpeechOutcome::Skipped);
        assert!(recorder.spoken().is_empty());
    }
}
