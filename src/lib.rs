/// Scene audio for visual novels
///
/// Layered background music, ambient loops, pooled sound effects and voices,
/// with a volume cascade from user settings.
pub mod audio_system;
pub mod config;
pub mod error;
pub mod settings;

pub use audio_system::{AudioManager, AudioScope, HeadlessProvider, RodioProvider};
pub use config::AudioConfig;
pub use error::{AppResult, AudioError, ConfigError, PlaybackSkipped};
pub use settings::{AudioSettings, PreviewOverride, SettingsStore};
