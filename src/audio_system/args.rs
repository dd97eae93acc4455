//! Call arguments for the play operations
//!
//! Scripts may name a track directly or hand over a descriptor taken from
//! scene data. Both forms are resolved once, at the manager boundary, into a
//! canonical request.

use serde::{Deserialize, Serialize};

use super::ambient::{FrameRange, FrameWindow};

fn default_percent() -> f32 {
    100.0
}

/// Audio descriptor as stored in scene and save data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDescriptor {
    pub name: String,

    #[serde(default = "default_percent")]
    pub volume: f32,

    #[serde(default = "default_percent")]
    pub playback_rate: f32,
}

impl AudioDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            volume: 100.0,
            playback_rate: 100.0,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.playback_rate = rate;
        self
    }
}

/// Either a bare name or a full descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum AudioArg {
    Name(String),
    Descriptor(AudioDescriptor),
}

impl AudioArg {
    /// Resolve into (name, volume, rate); descriptor fields win over options
    fn resolve(self, volume: Option<f32>, rate: Option<f32>) -> (String, f32, f32) {
        match self {
            AudioArg::Name(name) => (
                name,
                volume.unwrap_or(100.0),
                rate.unwrap_or(100.0),
            ),
            AudioArg::Descriptor(d) => (d.name, d.volume, d.playback_rate),
        }
    }
}

impl From<&str> for AudioArg {
    fn from(name: &str) -> Self {
        AudioArg::Name(name.to_string())
    }
}

impl From<String> for AudioArg {
    fn from(name: String) -> Self {
        AudioArg::Name(name)
    }
}

impl From<AudioDescriptor> for AudioArg {
    fn from(descriptor: AudioDescriptor) -> Self {
        AudioArg::Descriptor(descriptor)
    }
}

impl From<&AudioDescriptor> for AudioArg {
    fn from(descriptor: &AudioDescriptor) -> Self {
        AudioArg::Descriptor(descriptor.clone())
    }
}

/// Positional options for `play_music`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicOptions {
    pub volume: Option<f32>,
    pub rate: Option<f32>,
    pub fade_in_frames: u32,
    pub layer: usize,
    pub looping: bool,
}

impl Default for MusicOptions {
    fn default() -> Self {
        Self {
            volume: None,
            rate: None,
            fade_in_frames: 0,
            layer: 0,
            looping: true,
        }
    }
}

impl MusicOptions {
    pub fn on_layer(layer: usize) -> Self {
        Self {
            layer,
            ..Default::default()
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_fade_in(mut self, frames: u32) -> Self {
        self.fade_in_frames = frames;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

/// Positional options for `play_sound` and `play_voice`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SoundOptions {
    pub volume: Option<f32>,
    pub rate: Option<f32>,
    pub music_ducking: bool,
    pub voice: bool,
    pub looping: bool,
}

impl SoundOptions {
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn ducking(mut self) -> Self {
        self.music_ducking = true;
        self
    }

    pub fn voice(mut self) -> Self {
        self.voice = true;
        self
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }
}

/// Options for `play_music_random`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientOptions {
    pub fade_frames: u32,
    pub layer: usize,
    pub play_time_range: FrameRange,
    pub play_range_window: FrameWindow,
}

/// Canonical music request
#[derive(Debug, Clone, PartialEq)]
pub struct MusicRequest {
    pub name: String,
    pub volume: f32,
    pub rate: f32,
    pub fade_in_frames: u32,
    pub layer: usize,
    pub looping: bool,
}

impl MusicRequest {
    pub fn resolve(arg: AudioArg, options: MusicOptions) -> Self {
        let (name, volume, rate) = arg.resolve(options.volume, options.rate);
        Self {
            name,
            volume,
            rate,
            fade_in_frames: options.fade_in_frames,
            layer: options.layer,
            looping: options.looping,
        }
    }
}

/// Canonical sound request
#[derive(Debug, Clone, PartialEq)]
pub struct SoundRequest {
    pub name: String,
    pub volume: f32,
    pub rate: f32,
    pub music_ducking: bool,
    pub voice: bool,
    pub looping: bool,
}

impl SoundRequest {
    pub fn resolve(arg: AudioArg, options: SoundOptions) -> Self {
        let (name, volume, rate) = arg.resolve(options.volume, options.rate);
        Self {
            name,
            volume,
            rate,
            music_ducking: options.music_ducking,
            voice: options.voice,
            looping: options.looping,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_form_uses_options() {
        let request = MusicRequest::resolve(
            "theme".into(),
            MusicOptions::on_layer(2).with_volume(80.0).with_fade_in(30),
        );
        assert_eq!(request.name, "theme");
        assert_eq!(request.volume, 80.0);
        assert_eq!(request.rate, 100.0);
        assert_eq!(request.fade_in_frames, 30);
        assert_eq!(request.layer, 2);
        assert!(request.looping);
    }

    #[test]
    fn test_descriptor_form_overrides_volume_and_rate() {
        let descriptor = AudioDescriptor::new("rain").with_volume(40.0).with_rate(90.0);
        let request = SoundRequest::resolve(
            descriptor.into(),
            SoundOptions::default().with_volume(100.0).looping(),
        );
        assert_eq!(request.name, "rain");
        assert_eq!(request.volume, 40.0);
        assert_eq!(request.rate, 90.0);
        assert!(request.looping);
    }

    #[test]
    fn test_descriptor_defaults_from_json() {
        let descriptor: AudioDescriptor = serde_json::from_str(r#"{"name":"door"}"#).unwrap();
        assert_eq!(descriptor.volume, 100.0);
        assert_eq!(descriptor.playback_rate, 100.0);
    }
}
