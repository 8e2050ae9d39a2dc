//! Seams between the session controller and the host's speech engines.
//!
//! The session never talks to an audio stack directly. Hosts implement
//! [`SpeechRecognizer`] and [`SpeechSynthesizer`] over whatever engine they
//! ship (a browser's speech API behind a webview bridge, a native STT/TTS
//! pair) and deliver progress as events on channels handed to the session at
//! spawn time. Both `speak` and `start` initiate work and return; completion
//! arrives as `Ended` events.

use crate::error::Result;
use async_trait::async_trait;
use thiserror::Error;

/// How recognition should be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSettings {
    /// BCP-47 tag, e.g. "fr-FR".
    pub lang: String,
    /// Keep recognizing across pauses instead of stopping at the first one.
    pub continuous: bool,
    /// Deliver partial hypotheses as non-final results.
    pub interim_results: bool,
}

/// Progress reported by a recognizer implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// The engine is capturing audio.
    Started,
    /// A hypothesis. Non-final text may still change.
    Result { text: String, is_final: bool },
    /// The engine stopped on its own (silence, end of input, after `stop`).
    Ended,
    Error(RecognizerError),
}

/// Recognizer failures, mirroring the usual speech-engine error codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognizerError {
    /// Nothing intelligible was heard. Routine; the session just restarts.
    #[error("no-speech")]
    NoSpeech,
    /// The engine was interrupted mid-capture.
    #[error("aborted")]
    Aborted,
    /// Microphone permission denied. Fatal for the session.
    #[error("not-allowed")]
    NotAllowed,
    #[error("{0}")]
    Other(String),
}

/// Progress reported by a synthesizer implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesizerEvent {
    Started,
    /// The utterance finished playing (or was cancelled).
    Ended,
    Error(String),
}

/// Speech-to-text control surface implemented by the host.
#[async_trait]
pub trait SpeechRecognizer: Send {
    /// Begin capturing. Events flow on the channel given at session spawn.
    async fn start(&mut self, settings: &RecognitionSettings) -> Result<()>;

    /// Stop capturing. The engine still emits `Ended` afterwards.
    async fn stop(&mut self) -> Result<()>;
}

/// Text-to-speech control surface implemented by the host.
#[async_trait]
pub trait SpeechSynthesizer: Send {
    /// Queue `text` for playback and return immediately.
    async fn speak(&mut self, text: &str, lang: &str, rate: f32) -> Result<()>;

    /// Drop any queued or playing utterance.
    async fn cancel(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn recognizer_errors_render_engine_codes() {
        assert_eq!(RecognizerError::NoSpeech.to_string(), "no-speech");
        assert_eq!(RecognizerError::NotAllowed.to_string(), "not-allowed");
        assert_eq!(
            RecognizerError::Other("network".to_owned()).to_string(),
            "network"
        );
    }
}
