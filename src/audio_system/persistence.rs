/// Save-game format for music layers
///
/// One entry per layer index; `customData` is present only for ambient loops.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::ambient::AmbientLoopParams;

/// Persisted state of one layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedLayer {
    pub name: String,
    pub volume: f32,
    pub rate: f32,
    pub fade_in_time: u32,
    pub playing: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<AmbientLoopParams>,
}

/// Ordered layer list as written into a save game
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SavedLayers(pub Vec<Option<SavedLayer>>);

impl SavedLayers {
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Write the layers to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        tracing::debug!("Saved {} audio layers to: {}", self.0.len(), path.display());
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        let layers = Self::from_json(&json)?;
        tracing::debug!("Loaded {} audio layers from: {}", layers.0.len(), path.display());
        Ok(layers)
    }

    pub fn layers(&self) -> &[Option<SavedLayer>] {
        &self.0
    }
}

impl From<Vec<Option<SavedLayer>>> for SavedLayers {
    fn from(layers: Vec<Option<SavedLayer>>) -> Self {
        Self(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::ambient::{FrameRange, FrameWindow};

    fn ambient_layer() -> SavedLayer {
        SavedLayer {
            name: "wind".to_string(),
            volume: 60.0,
            rate: 100.0,
            fade_in_time: 90,
            playing: true,
            custom_data: Some(AmbientLoopParams {
                fade_frames: 90,
                play_time_range: FrameRange::new(300, 900),
                play_range_window: FrameWindow::new(0, 120),
                countdown: 42,
            }),
        }
    }

    #[test]
    fn test_wire_format_field_names() {
        let layers = SavedLayers(vec![Some(ambient_layer()), None]);
        let value = serde_json::to_value(&layers).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["fadeInTime"], 90);
        assert_eq!(value[0]["customData"]["fadeFrames"], 90);
        assert!(value[1].is_null());
    }

    #[test]
    fn test_plain_layer_omits_custom_data() {
        let layer = SavedLayer {
            custom_data: None,
            ..ambient_layer()
        };
        let json = serde_json::to_string(&layer).unwrap();
        assert!(!json.contains("customData"));
        let back: SavedLayer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, layer);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir()
            .join("novel-audio-tests")
            .join(format!("layers-{}.json", std::process::id()));
        let layers = SavedLayers(vec![Some(ambient_layer())]);
        layers.save_to(&path).unwrap();
        let loaded = SavedLayers::load_from(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, layers);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = SavedLayers::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
