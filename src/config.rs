//! Configuration types for the voice command pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the copilot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CopilotConfig {
    /// Fuzzy item matching settings.
    pub matcher: MatcherConfig,
    /// Voice session settings (wake phrases, timers, spoken notices).
    pub session: SessionConfig,
    /// Platform speech settings (language, synthesis rate).
    pub speech: SpeechConfig,
}

/// Fuzzy matching configuration for deal/action lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum similarity score for a candidate to be considered at all.
    pub threshold: f64,
    /// Minimum lead the best candidate must have over the runner-up.
    ///
    /// When the top two scores are closer than this, the match is treated
    /// as ambiguous and rejected so the orchestrator can ask back.
    pub ambiguity_gap: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            ambiguity_gap: 0.1,
        }
    }
}

/// Voice session configuration (wake phrases, timers, spoken notices).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wake phrases that activate the assistant (case-insensitive,
    /// matched at word boundaries). Longer phrases are tried first.
    pub wake_phrases: Vec<String>,
    /// Spoken acknowledgement after a wake phrase is detected.
    pub acknowledgement: String,
    /// Spoken notice before dropping back to wake-word listening after
    /// prolonged inactivity.
    pub standby_notice: String,
    /// Spoken/displayed notice when microphone access is denied.
    pub mic_denied_notice: String,
    /// Silence (ms with no new final result) after which the transcript
    /// buffer is flushed as one utterance.
    pub silence_flush_ms: u64,
    /// Seconds without any recognition result in active listening before
    /// the session announces standby and returns to wake-word mode.
    ///
    /// Set to 0 to disable the inactivity timeout.
    pub inactivity_timeout_s: u32,
    /// Backoff (ms) before restarting recognition after a transient
    /// recognizer error.
    pub restart_backoff_ms: u64,
    /// How many trailing characters of recognized text are kept for
    /// wake-phrase matching.
    pub wake_buffer_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wake_phrases: vec![
                "hey agent".to_owned(),
                "ok agent".to_owned(),
                "agent".to_owned(),
            ],
            acknowledgement: "Oui, je vous écoute !".to_owned(),
            standby_notice: "Je me mets en veille. Dites « agent » pour me réveiller.".to_owned(),
            mic_denied_notice:
                "L'accès au microphone est refusé. Vérifiez les autorisations pour utiliser la voix."
                    .to_owned(),
            silence_flush_ms: 2_000,
            inactivity_timeout_s: 30,
            restart_backoff_ms: 500,
            wake_buffer_chars: 120,
        }
    }
}

/// Platform speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// BCP-47 language tag passed to the recognizer and synthesizer.
    pub lang: String,
    /// Synthesis rate multiplier (1.0 = platform default).
    pub rate: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            lang: "fr-FR".to_owned(),
            rate: 1.0,
        }
    }
}

impl CopilotConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::VoiceError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::VoiceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/voxpipe/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("voxpipe").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("voxpipe")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/voxpipe-config/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CopilotConfig::default();
        assert!(config.matcher.threshold > 0.0 && config.matcher.threshold <= 1.0);
        assert!(config.matcher.ambiguity_gap > 0.0);
        assert!(!config.session.wake_phrases.is_empty());
        assert!(!config.session.acknowledgement.is_empty());
        assert!(config.session.silence_flush_ms > 0);
        assert!(config.session.restart_backoff_ms > 0);
        assert!(config.session.wake_buffer_chars >= 20);
        assert_eq!(config.speech.lang, "fr-FR");
        assert!(config.speech.rate > 0.0);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("config.toml");

        let mut config = CopilotConfig::default();
        config.matcher.threshold = 0.75;
        config.session.wake_phrases = vec!["salut agent".to_owned()];
        config.speech.rate = 1.2;

        assert!(config.save_to_file(&path).is_ok());
        assert!(path.exists());

        let loaded = CopilotConfig::from_file(&path);
        assert!(loaded.is_ok());
        let loaded = match loaded {
            Ok(c) => c,
            Err(_) => unreachable!("load should succeed"),
        };
        assert!((loaded.matcher.threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(loaded.session.wake_phrases, vec!["salut agent".to_owned()]);
        assert!((loaded.speech.rate - 1.2).abs() < f32::EPSILON);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = CopilotConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").expect("write bad toml");

        let result = CopilotConfig::from_file(&path);
        assert!(result.is_err());
    }

    #[test]
    fn from_file_partial_toml_uses_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[matcher]\nthreshold = 0.8\n").expect("write partial toml");

        let loaded = CopilotConfig::from_file(&path).expect("load partial config");
        assert!((loaded.matcher.threshold - 0.8).abs() < f64::EPSILON);
        // Everything else falls back to defaults.
        assert!((loaded.matcher.ambiguity_gap - 0.1).abs() < f64::EPSILON);
        assert_eq!(loaded.session.silence_flush_ms, 2_000);
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = CopilotConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("voxpipe"));
    }

    #[test]
    fn config_serializes_to_toml() {
        let config = CopilotConfig::default();
        let result = toml::to_string_pretty(&config);
        assert!(result.is_ok());
    }
}
