//! Error types for the voxpipe copilot.

/// Top-level error type for the voice command pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Speech recognition (platform recognizer) error.
    #[error("recognizer error: {0}")]
    Recognizer(String),

    /// Speech synthesis (platform synthesizer) error.
    #[error("synthesizer error: {0}")]
    Synthesizer(String),

    /// CRM store read/write error.
    #[error("store error: {0}")]
    Store(String),

    /// Voice session coordination error.
    #[error("session error: {0}")]
    Session(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
