//! Voice session controller: wake-word gating, utterance segmentation and
//! speaking/listening exclusion.
//!
//! A single tokio task owns the recognizer, the synthesizer and all timers,
//! so starts and stops never race. Hosts drive it through a [`SessionHandle`]
//! and receive captured utterances on a channel; everything else (state
//! changes, interim text, errors) is observable on a broadcast channel.
//!
//! The controller never listens to itself: recognition is stopped before any
//! synthesis starts and only resumes once the synthesizer reports the end of
//! playback.

use crate::config::{CopilotConfig, SessionConfig, SpeechConfig};
use crate::speech::{
    RecognitionSettings, RecognizerError, RecognizerEvent, SpeechRecognizer, SpeechSynthesizer,
    SynthesizerEvent,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Not capturing anything.
    Idle,
    /// Capturing, but only looking for a wake phrase.
    WakeWordListening,
    /// Capturing conversation; finals accumulate into utterances.
    Active,
    /// Synthesizing; recognition is off.
    Speaking,
}

/// How listening was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningMode {
    /// Wake-word gated, with silence segmentation and inactivity standby.
    Automatic,
    /// Push-to-talk: capture until the engine ends, then flush once.
    Manual,
}

/// Observable session activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(VoiceState),
    WakeWordDetected,
    /// Non-final hypothesis while actively listening.
    InterimTranscript(String),
    /// A final result was appended to the transcript buffer.
    TranscriptCommitted(String),
    /// A full utterance was flushed to the pipeline.
    UtteranceCaptured(String),
    Error(String),
}

/// Commands a host can send the session task.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    StartListening(ListeningMode),
    StopListening,
    Speak(String),
}

/// Cheap handle to a running session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    cancel: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn start_listening(&self, mode: ListeningMode) {
        let _ = self.cmd_tx.send(SessionCommand::StartListening(mode));
    }

    pub fn stop_listening(&self) {
        let _ = self.cmd_tx.send(SessionCommand::StopListening);
    }

    /// Speak `text`, cancelling any utterance already playing.
    pub fn speak(&self, text: impl Into<String>) {
        let _ = self.cmd_tx.send(SessionCommand::Speak(text.into()));
    }

    /// New subscription to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Tear the session down. Safe to call more than once.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Spawn the session task.
///
/// `recognizer_events` and `synthesizer_events` are the channels the host's
/// engine adapters deliver progress on. Returns the command handle, the
/// captured-utterance stream and an event subscription.
pub fn spawn<R, S>(
    config: &CopilotConfig,
    recognizer: R,
    recognizer_events: mpsc::Receiver<RecognizerEvent>,
    synthesizer: S,
    synthesizer_events: mpsc::Receiver<SynthesizerEvent>,
) -> (
    SessionHandle,
    mpsc::Receiver<String>,
    broadcast::Receiver<SessionEvent>,
)
where
    R: SpeechRecognizer + 'static,
    S: SpeechSynthesizer + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (utterance_tx, utterance_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = broadcast::channel(64);
    let cancel = CancellationToken::new();

    // Longest phrases first so "hey agent" wins over the bare "agent".
    let mut wake_phrases: Vec<String> = config
        .session
        .wake_phrases
        .iter()
        .map(|p| p.to_lowercase())
        .collect();
    wake_phrases.sort_by_key(|p| std::cmp::Reverse(p.chars().count()));

    let controller = Controller {
        config: config.session.clone(),
        speech: config.speech.clone(),
        wake_phrases,
        recognizer,
        synthesizer,
        state: VoiceState::Idle,
        mode: ListeningMode::Automatic,
        resume_to: None,
        wake_tail: String::new(),
        transcript: String::new(),
        recognition_active: false,
        pending_restart: false,
        utterances_in_flight: 0,
        silence_deadline: None,
        inactivity_deadline: None,
        restart_at: None,
        utterance_tx,
        events: event_tx.clone(),
    };

    tokio::spawn(controller.run(cmd_rx, recognizer_events, synthesizer_events, cancel.clone()));

    (
        SessionHandle {
            cmd_tx,
            cancel,
            events: event_tx,
        },
        utterance_rx,
        event_rx,
    )
}

struct Controller<R, S> {
    config: SessionConfig,
    speech: SpeechConfig,
    /// Lowercased, longest first.
    wake_phrases: Vec<String>,
    recognizer: R,
    synthesizer: S,
    state: VoiceState,
    mode: ListeningMode,
    /// State to return to when synthesis finishes.
    resume_to: Option<VoiceState>,
    /// Trailing recognized text kept for wake-phrase matching.
    wake_tail: String,
    /// Final results accumulated since the last flush.
    transcript: String,
    recognition_active: bool,
    /// A backoff restart is scheduled; suppresses the restart-on-end path.
    pending_restart: bool,
    /// Utterances handed to the synthesizer that have not ended yet.
    utterances_in_flight: u32,
    silence_deadline: Option<Instant>,
    inactivity_deadline: Option<Instant>,
    restart_at: Option<Instant>,
    utterance_tx: mpsc::Sender<String>,
    events: broadcast::Sender<SessionEvent>,
}

// Resolves when the deadline passes; never, when there is none.
async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl<R, S> Controller<R, S>
where
    R: SpeechRecognizer,
    S: SpeechSynthesizer,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut recognizer_events: mpsc::Receiver<RecognizerEvent>,
        mut synthesizer_events: mpsc::Receiver<SynthesizerEvent>,
        cancel: CancellationToken,
    ) {
        info!(lang = %self.speech.lang, "voice session ready");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.teardown().await;
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
                Some(event) = recognizer_events.recv() => self.on_recognizer(event).await,
                Some(event) = synthesizer_events.recv() => self.on_synthesizer(event).await,
                () = deadline(self.silence_deadline) => self.flush_utterance().await,
                () = deadline(self.inactivity_deadline) => self.enter_standby().await,
                () = deadline(self.restart_at) => self.restart_recognition().await,
            }
        }

        info!("voice session stopped");
    }

    // ── commands ─────────────────────────────────────────────────────────

    async fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartListening(mode) => self.start_listening(mode).await,
            SessionCommand::StopListening => {
                info!("stop requested");
                self.teardown().await;
            }
            SessionCommand::Speak(text) => self.speak(text).await,
        }
    }

    async fn start_listening(&mut self, mode: ListeningMode) {
        if self.state != VoiceState::Idle {
            debug!(state = ?self.state, "start ignored, session already running");
            return;
        }
        self.mode = mode;
        match mode {
            ListeningMode::Automatic => {
                info!("listening for wake phrase");
                self.wake_tail.clear();
                self.set_state(VoiceState::WakeWordListening);
            }
            ListeningMode::Manual => {
                info!("push-to-talk capture");
                self.transcript.clear();
                self.set_state(VoiceState::Active);
            }
        }
        self.start_recognition().await;
    }

    /// Speak `text`, resuming the current state afterwards. An utterance
    /// already playing is cancelled first.
    async fn speak(&mut self, text: String) {
        let resume = match self.state {
            VoiceState::Speaking => self.resume_to.unwrap_or(VoiceState::Idle),
            other => other,
        };
        if self.state == VoiceState::Speaking {
            if let Err(err) = self.synthesizer.cancel().await {
                warn!(error = %err, "synthesizer cancel failed");
            }
        }
        self.speak_resuming(text, resume).await;
    }

    async fn speak_resuming(&mut self, text: String, resume: VoiceState) {
        if self.recognition_active {
            self.stop_recognition().await;
        }
        self.silence_deadline = None;
        self.inactivity_deadline = None;
        self.resume_to = Some(resume);
        self.set_state(VoiceState::Speaking);
        self.utterances_in_flight += 1;
        if let Err(err) = self
            .synthesizer
            .speak(&text, &self.speech.lang, self.speech.rate)
            .await
        {
            warn!(error = %err, "synthesis failed");
            self.emit(SessionEvent::Error(err.to_string()));
            self.utterances_in_flight = self.utterances_in_flight.saturating_sub(1);
            if self.utterances_in_flight == 0 {
                self.resume_after_speech().await;
            }
        }
    }

    // ── recognizer events ────────────────────────────────────────────────

    async fn on_recognizer(&mut self, event: RecognizerEvent) {
        match event {
            RecognizerEvent::Started => {}
            RecognizerEvent::Result { text, is_final } => self.on_result(text, is_final).await,
            RecognizerEvent::Ended => {
                self.recognition_active = false;
                match (self.state, self.mode) {
                    // Push-to-talk: engine end is the end of the capture.
                    (VoiceState::Active, ListeningMode::Manual) => {
                        self.flush_utterance().await;
                        self.teardown().await;
                    }
                    // Engines stop on their own after pauses; keep listening.
                    (VoiceState::Active | VoiceState::WakeWordListening, _)
                        if !self.pending_restart =>
                    {
                        self.start_recognition().await;
                    }
                    _ => {}
                }
            }
            RecognizerEvent::Error(err) => {
                self.recognition_active = false;
                self.on_recognizer_error(err).await;
            }
        }
    }

    async fn on_recognizer_error(&mut self, err: RecognizerError) {
        match err {
            RecognizerError::NotAllowed => {
                error!("microphone permission denied");
                self.emit(SessionEvent::Error(self.config.mic_denied_notice.clone()));
                self.teardown().await;
            }
            RecognizerError::NoSpeech | RecognizerError::Aborted | RecognizerError::Other(_) => {
                debug!(error = %err, "recognizer error, scheduling restart");
                if matches!(
                    self.state,
                    VoiceState::Active | VoiceState::WakeWordListening
                ) {
                    self.schedule_restart();
                }
            }
        }
    }

    async fn on_result(&mut self, text: String, is_final: bool) {
        match self.state {
            VoiceState::WakeWordListening => self.scan_for_wake_phrase(&text, is_final).await,
            VoiceState::Active => {
                // Any sign of speech keeps the conversation alive.
                self.arm_inactivity();
                if is_final {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        if !self.transcript.is_empty() {
                            self.transcript.push(' ');
                        }
                        self.transcript.push_str(trimmed);
                        self.emit(SessionEvent::TranscriptCommitted(trimmed.to_owned()));
                    }
                    self.arm_silence();
                } else {
                    // Interim hypotheses are display-only and never delay the
                    // silence flush.
                    self.emit(SessionEvent::InterimTranscript(text));
                }
            }
            // Anything heard while speaking or idle is an echo of ourselves
            // or a stale result; drop it.
            VoiceState::Speaking | VoiceState::Idle => {
                debug!("dropping recognizer result outside a listening state");
            }
        }
    }

    async fn scan_for_wake_phrase(&mut self, text: &str, is_final: bool) {
        let probe = if is_final {
            if !self.wake_tail.is_empty() {
                self.wake_tail.push(' ');
            }
            self.wake_tail.push_str(text.trim());
            trim_tail(&mut self.wake_tail, self.config.wake_buffer_chars);
            self.wake_tail.to_lowercase()
        } else {
            // Interims are probed together with the committed tail but never
            // stored: they repeat themselves on the way to a final.
            format!("{} {}", self.wake_tail, text).to_lowercase()
        };

        if self
            .wake_phrases
            .iter()
            .any(|phrase| find_word(&probe, phrase).is_some())
        {
            info!("wake phrase detected");
            self.wake_tail.clear();
            self.stop_recognition().await;
            self.emit(SessionEvent::WakeWordDetected);
            let ack = self.config.acknowledgement.clone();
            self.speak_resuming(ack, VoiceState::Active).await;
        }
    }

    // ── synthesizer events ───────────────────────────────────────────────

    async fn on_synthesizer(&mut self, event: SynthesizerEvent) {
        match event {
            SynthesizerEvent::Started => {}
            SynthesizerEvent::Ended => self.on_utterance_finished().await,
            SynthesizerEvent::Error(message) => {
                warn!(error = %message, "synthesizer reported an error");
                self.emit(SessionEvent::Error(message));
                self.on_utterance_finished().await;
            }
        }
    }

    async fn on_utterance_finished(&mut self) {
        self.utterances_in_flight = self.utterances_in_flight.saturating_sub(1);
        if self.utterances_in_flight == 0 && self.state == VoiceState::Speaking {
            self.resume_after_speech().await;
        }
    }

    async fn resume_after_speech(&mut self) {
        match self.resume_to.take().unwrap_or(VoiceState::Idle) {
            VoiceState::Active => {
                self.transcript.clear();
                self.set_state(VoiceState::Active);
                self.arm_inactivity();
                self.start_recognition().await;
            }
            VoiceState::WakeWordListening => {
                self.wake_tail.clear();
                self.set_state(VoiceState::WakeWordListening);
                self.start_recognition().await;
            }
            VoiceState::Idle | VoiceState::Speaking => self.set_state(VoiceState::Idle),
        }
    }

    // ── deadlines ────────────────────────────────────────────────────────

    /// Flush the accumulated transcript as one utterance.
    async fn flush_utterance(&mut self) {
        self.silence_deadline = None;
        let utterance = self.transcript.trim().to_owned();
        self.transcript.clear();
        if utterance.is_empty() {
            return;
        }
        info!(chars = utterance.chars().count(), "utterance captured");
        self.emit(SessionEvent::UtteranceCaptured(utterance.clone()));
        if self.utterance_tx.send(utterance).await.is_err() {
            warn!("utterance receiver dropped");
        }
    }

    /// Prolonged inactivity: announce standby and fall back to the wake word.
    async fn enter_standby(&mut self) {
        self.inactivity_deadline = None;
        if self.state != VoiceState::Active || self.mode == ListeningMode::Manual {
            return;
        }
        info!("inactivity timeout, returning to wake-word listening");
        self.flush_utterance().await;
        self.stop_recognition().await;
        let notice = self.config.standby_notice.clone();
        self.speak_resuming(notice, VoiceState::WakeWordListening).await;
    }

    async fn restart_recognition(&mut self) {
        self.restart_at = None;
        self.pending_restart = false;
        if matches!(
            self.state,
            VoiceState::Active | VoiceState::WakeWordListening
        ) {
            self.start_recognition().await;
        }
    }

    fn schedule_restart(&mut self) {
        if self.pending_restart {
            return;
        }
        self.pending_restart = true;
        self.restart_at = Some(Instant::now() + Duration::from_millis(self.config.restart_backoff_ms));
    }

    fn arm_silence(&mut self) {
        if self.mode == ListeningMode::Automatic {
            self.silence_deadline =
                Some(Instant::now() + Duration::from_millis(self.config.silence_flush_ms));
        }
    }

    fn arm_inactivity(&mut self) {
        if self.mode == ListeningMode::Automatic && self.config.inactivity_timeout_s > 0 {
            self.inactivity_deadline = Some(
                Instant::now() + Duration::from_secs(u64::from(self.config.inactivity_timeout_s)),
            );
        }
    }

    // ── engine control ───────────────────────────────────────────────────

    async fn start_recognition(&mut self) {
        if self.recognition_active {
            return;
        }
        let settings = RecognitionSettings {
            lang: self.speech.lang.clone(),
            continuous: true,
            interim_results: true,
        };
        match self.recognizer.start(&settings).await {
            Ok(()) => self.recognition_active = true,
            Err(err) => {
                warn!(error = %err, "recognizer start failed");
                self.emit(SessionEvent::Error(err.to_string()));
                self.schedule_restart();
            }
        }
    }

    async fn stop_recognition(&mut self) {
        if let Err(err) = self.recognizer.stop().await {
            warn!(error = %err, "recognizer stop failed");
        }
        self.recognition_active = false;
    }

    /// Full teardown to Idle. Safe to run from any state, any number of times.
    async fn teardown(&mut self) {
        self.silence_deadline = None;
        self.inactivity_deadline = None;
        self.restart_at = None;
        self.pending_restart = false;
        self.transcript.clear();
        self.wake_tail.clear();
        self.resume_to = None;
        if self.recognition_active {
            self.stop_recognition().await;
        }
        if self.state == VoiceState::Speaking {
            if let Err(err) = self.synthesizer.cancel().await {
                warn!(error = %err, "synthesizer cancel failed");
            }
            self.utterances_in_flight = 0;
        }
        self.set_state(VoiceState::Idle);
    }

    // ── plumbing ─────────────────────────────────────────────────────────

    fn set_state(&mut self, next: VoiceState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "session state");
            self.state = next;
            self.emit(SessionEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Keep only the last `max_chars` characters of `tail`.
fn trim_tail(tail: &mut String, max_chars: usize) {
    let excess = tail.chars().count().saturating_sub(max_chars);
    if excess > 0 {
        *tail = tail.chars().skip(excess).collect();
    }
}

/// Position of `needle` in `haystack` at word boundaries, so "agent" never
/// fires inside "argente".
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let mut from = 0;
    while from < haystack.len() {
        let rel = haystack[from..].find(needle)?;
        let pos = from + rel;
        let end = pos + needle.len();
        let start_ok = pos == 0 || !haystack.as_bytes()[pos - 1].is_ascii_alphanumeric();
        let end_ok = end >= haystack.len() || !haystack.as_bytes()[end].is_ascii_alphanumeric();
        if start_ok && end_ok {
            return Some(pos);
        }
        // Advance a full character; pos + 1 could split a multibyte one.
        from = pos + haystack[pos..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    // ── wake phrase matching ─────────────────────────────────────────────

    #[test]
    fn wake_word_needs_boundaries() {
        assert!(find_word("hey agent réveille-toi", "agent").is_some());
        assert!(find_word("agent", "agent").is_some());
        assert!(find_word("il argente le cadre", "agent").is_none());
        assert!(find_word("les agents", "agent").is_none());
    }

    #[test]
    fn wake_word_found_after_punctuation() {
        assert!(find_word("bon. agent, on y va", "agent").is_some());
        assert!(find_word("ok agent!", "ok agent").is_some());
    }

    // ── tail buffer ──────────────────────────────────────────────────────

    #[test]
    fn tail_keeps_only_the_last_chars() {
        let mut tail = "a".repeat(50);
        tail.push_str(" hey agent");
        trim_tail(&mut tail, 20);
        assert_eq!(tail.chars().count(), 20);
        assert!(tail.ends_with("hey agent"));
    }

    #[test]
    fn tail_trim_respects_utf8() {
        let mut tail = "é".repeat(30);
        trim_tail(&mut tail, 10);
        assert_eq!(tail.chars().count(), 10);
    }
}
