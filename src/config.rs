use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Number of music layers
    pub layer_count: usize,

    /// Fade-in used when ducked music resumes after its effect ends
    pub ducking_resume_fade_frames: u32,

    /// Folder of music tracks, relative to `asset_root`
    pub music_folder: String,

    /// Folder of sound effects and voices, relative to `asset_root`
    pub sound_folder: String,

    /// Root directory the folders are resolved against
    pub asset_root: PathBuf,

    /// Tick rate of the player binary's update loop
    pub frames_per_second: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            layer_count: 4,
            ducking_resume_fade_frames: 40,
            music_folder: "Audio/Music".to_string(),
            sound_folder: "Audio/Sounds".to_string(),
            asset_root: PathBuf::from("."),
            frames_per_second: 60,
        }
    }
}

impl AudioConfig {
    /// Load configuration from the platform-specific config directory.
    /// Creates default config if file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let config = Self::load_from(&config_path)?;
            tracing::info!("Loaded audio config from: {}", config_path.display());
            Ok(config)
        } else {
            let config = AudioConfig::default();
            config.save_to(&config_path)?;
            tracing::info!("Created default audio config at: {}", config_path.display());
            Ok(config)
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        let config: AudioConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        fs::write(path, json).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layer_count == 0 {
            return Err(ConfigError::Invalid("layer_count must be at least 1".into()));
        }
        if self.frames_per_second == 0 {
            return Err(ConfigError::Invalid(
                "frames_per_second must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Get the config file path (in the user's config directory)
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("NovelAudio").join("audio.json"))
    }

    /// Get the config file path for display purposes
    pub fn config_path_display() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn music_dir(&self) -> PathBuf {
        self.asset_root.join(&self.music_folder)
    }

    pub fn sound_dir(&self) -> PathBuf {
        self.asset_root.join(&self.sound_folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AudioConfig::default();
        assert_eq!(config.layer_count, 4);
        assert_eq!(config.ducking_resume_fade_frames, 40);
        assert_eq!(config.frames_per_second, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AudioConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AudioConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AudioConfig = serde_json::from_str(r#"{"layer_count": 8}"#).unwrap();
        assert_eq!(config.layer_count, 8);
        assert_eq!(config.music_folder, "Audio/Music");
    }

    #[test]
    fn test_zero_layers_rejected() {
        let config = AudioConfig {
            layer_count: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = std::env::temp_dir()
            .join("novel-audio-tests")
            .join(format!("config-{}.json", std::process::id()));
        let config = AudioConfig {
            layer_count: 6,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        let loaded = AudioConfig::load_from(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_asset_dirs() {
        let config = AudioConfig {
            asset_root: PathBuf::from("/game"),
            ..Default::default()
        };
        assert_eq!(config.music_dir(), PathBuf::from("/game/Audio/Music"));
        assert_eq!(config.sound_dir(), PathBuf::from("/game/Audio/Sounds"));
    }
}
