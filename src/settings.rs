//! Player-facing audio settings
//!
//! The host owns the sliders and toggles; the audio manager only reads them.
//! Every write bumps a revision counter so the manager can skip the per-tick
//! comparison when nothing changed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::audio_system::AudioScope;

/// Preview-mode override that force-disables scopes regardless of the sliders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewOverride {
    pub music_disabled: bool,
    pub sound_disabled: bool,
    pub voice_disabled: bool,
}

/// Live audio settings (volumes are 0-100)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    pub bgm_volume: f32,
    pub se_volume: f32,
    pub voice_volume: f32,
    pub bgm_enabled: bool,
    pub se_enabled: bool,
    pub voice_enabled: bool,

    /// Present only while the host runs a scene preview
    #[serde(default)]
    pub preview: Option<PreviewOverride>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            bgm_volume: 100.0,
            se_volume: 100.0,
            voice_volume: 100.0,
            bgm_enabled: true,
            se_enabled: true,
            voice_enabled: true,
            preview: None,
        }
    }
}

impl AudioSettings {
    /// Slider value for a scope, or 0 when the scope is switched off
    pub fn scope_volume(&self, scope: AudioScope) -> f32 {
        if !self.scope_enabled(scope) {
            return 0.0;
        }
        match scope {
            AudioScope::Music => self.bgm_volume,
            AudioScope::Sound => self.se_volume,
            AudioScope::Voice => self.voice_volume,
        }
    }

    /// Whether a scope is enabled and not force-disabled by the preview
    pub fn scope_enabled(&self, scope: AudioScope) -> bool {
        let preview = self.preview.unwrap_or_default();
        match scope {
            AudioScope::Music => self.bgm_enabled && !preview.music_disabled,
            AudioScope::Sound => self.se_enabled && !preview.sound_disabled,
            AudioScope::Voice => self.voice_enabled && !preview.voice_disabled,
        }
    }

    /// Whether the preview override blocks sound effects entirely
    pub fn preview_sound_disabled(&self) -> bool {
        self.preview.map(|p| p.sound_disabled).unwrap_or(false)
    }
}

/// Shared, versioned settings handle
///
/// Cloning shares the same underlying settings.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    inner: Arc<RwLock<AudioSettings>>,
    revision: Arc<AtomicU64>,
}

impl SettingsStore {
    pub fn new(settings: AudioSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> AudioSettings {
        self.inner.read().clone()
    }

    /// Current revision; changes after every `update`
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Mutate the settings in place
    pub fn update(&self, f: impl FnOnce(&mut AudioSettings)) {
        let mut settings = self.inner.write();
        f(&mut settings);
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_volume(&self, scope: AudioScope, volume: f32) {
        self.update(|s| match scope {
            AudioScope::Music => s.bgm_volume = volume,
            AudioScope::Sound => s.se_volume = volume,
            AudioScope::Voice => s.voice_volume = volume,
        });
    }

    pub fn set_enabled(&self, scope: AudioScope, enabled: bool) {
        self.update(|s| match scope {
            AudioScope::Music => s.bgm_enabled = enabled,
            AudioScope::Sound => s.se_enabled = enabled,
            AudioScope::Voice => s.voice_enabled = enabled,
        });
    }

    pub fn set_preview(&self, preview: Option<PreviewOverride>) {
        self.update(|s| s.preview = preview);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_scope_reads_as_silent() {
        let mut settings = AudioSettings::default();
        settings.bgm_volume = 70.0;
        assert_eq!(settings.scope_volume(AudioScope::Music), 70.0);

        settings.bgm_enabled = false;
        assert_eq!(settings.scope_volume(AudioScope::Music), 0.0);
    }

    #[test]
    fn test_preview_override_disables_scope() {
        let settings = AudioSettings {
            preview: Some(PreviewOverride {
                voice_disabled: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!settings.scope_enabled(AudioScope::Voice));
        assert!(settings.scope_enabled(AudioScope::Sound));
        assert!(!settings.preview_sound_disabled());
    }

    #[test]
    fn test_store_revision_bumps_on_write() {
        let store = SettingsStore::default();
        let before = store.revision();
        store.set_volume(AudioScope::Sound, 20.0);
        assert!(store.revision() > before);
        assert_eq!(store.snapshot().se_volume, 20.0);
    }

    #[test]
    fn test_store_clone_shares_state() {
        let store = SettingsStore::default();
        let other = store.clone();
        other.set_enabled(AudioScope::Music, false);
        assert!(!store.snapshot().bgm_enabled);
        assert_eq!(store.revision(), other.revision());
    }

    #[test]
    fn test_settings_serialization() {
        let json = serde_json::to_string(&AudioSettings::default()).unwrap();
        assert!(json.contains("bgmVolume"));
        let back: AudioSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AudioSettings::default());
    }
}
