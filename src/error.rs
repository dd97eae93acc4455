use thiserror::Error;

/// Library errors using thiserror for structured error handling.
///
/// Playback calls never fail loudly: a skipped request is reported through
/// `PlaybackSkipped` so callers can tell "played" from "skipped", while
/// runtime behavior stays a silent no-op.

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSkipped {
    #[error("Playback disabled by preview settings")]
    PreviewDisabled,

    #[error("No audio name given")]
    MissingName,

    #[error("Sound effects are disabled")]
    SoundDisabled,

    #[error("Audio name resolved to an empty path")]
    EmptyPath,

    #[error("Audio resource not found: {path}")]
    MissingResource { path: String },

    #[error("Invalid music layer: {0}")]
    InvalidLayer(usize),
}

impl PlaybackSkipped {
    /// Skipped on purpose (settings or empty input) rather than a missing asset
    pub fn is_intentional(&self) -> bool {
        !matches!(
            self,
            PlaybackSkipped::MissingResource { .. } | PlaybackSkipped::InvalidLayer(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to decode audio format")]
    DecodeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to initialize audio output stream")]
    StreamInitFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Audio playback failed")]
    PlaybackFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine the platform config directory")]
    NoConfigDir,
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;
