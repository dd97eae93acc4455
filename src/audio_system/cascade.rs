/// Volume cascade
///
/// Combines a caller-chosen base volume with the live scope slider. Only the
/// inputs are cached, never the product, so a slider change is picked up on
/// the next tick without replaying anything.
use crate::settings::SettingsStore;

use super::scope::AudioScope;

/// Clamp a percentage to 0-100 (NaN counts as silent)
pub fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Unit-scale volume for a base volume and scope slider, both 0-100
pub fn effective_volume(base: f32, scope_percent: f32) -> f32 {
    clamp_percent(base) / 100.0 * (clamp_percent(scope_percent) / 100.0)
}

/// Scopes whose slider drifted since the last refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeChanges {
    pub music: bool,
    pub sound: bool,
    pub voice: bool,
}

impl ScopeChanges {
    pub fn any(&self) -> bool {
        self.music || self.sound || self.voice
    }

    pub fn contains(&self, scope: AudioScope) -> bool {
        match scope {
            AudioScope::Music => self.music,
            AudioScope::Sound => self.sound,
            AudioScope::Voice => self.voice,
        }
    }

    fn mark(&mut self, scope: AudioScope) {
        match scope {
            AudioScope::Music => self.music = true,
            AudioScope::Sound => self.sound = true,
            AudioScope::Voice => self.voice = true,
        }
    }
}

/// Cached scope snapshots plus the last base volume applied per scope
#[derive(Debug, Clone)]
pub struct VolumeCascade {
    general: [f32; 3],
    last_base: [f32; 3],
    revision: u64,
}

impl VolumeCascade {
    pub fn new(settings: &SettingsStore) -> Self {
        let snapshot = settings.snapshot();
        let mut general = [0.0; 3];
        for scope in AudioScope::ALL {
            general[scope.index()] = snapshot.scope_volume(scope);
        }
        Self {
            general,
            last_base: [100.0; 3],
            revision: settings.revision(),
        }
    }

    /// Cached slider value for a scope
    pub fn general(&self, scope: AudioScope) -> f32 {
        self.general[scope.index()]
    }

    /// Base volume most recently passed to `apply` for a scope
    pub fn last_base(&self, scope: AudioScope) -> f32 {
        self.last_base[scope.index()]
    }

    /// Cascaded volume for `base`, recording it as the scope's last base
    pub fn apply(&mut self, scope: AudioScope, base: f32) -> f32 {
        let base = clamp_percent(base);
        self.last_base[scope.index()] = base;
        self.volume_for(scope, base)
    }

    /// Cascaded volume without touching the recorded base
    pub fn volume_for(&self, scope: AudioScope, base: f32) -> f32 {
        effective_volume(base, self.general(scope))
    }

    /// Pull the live settings and report which scopes drifted
    pub fn refresh(&mut self, settings: &SettingsStore) -> ScopeChanges {
        let mut changes = ScopeChanges::default();
        let revision = settings.revision();
        if revision == self.revision {
            return changes;
        }
        self.revision = revision;

        let snapshot = settings.snapshot();
        for scope in AudioScope::ALL {
            let live = snapshot.scope_volume(scope);
            let cached = &mut self.general[scope.index()];
            if *cached != live {
                tracing::debug!("{} volume changed: {} -> {}", scope, cached, live);
                *cached = live;
                changes.mark(scope);
            }
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_volume_grid() {
        for base in (0..=100).step_by(10) {
            for scope in (0..=100).step_by(10) {
                let expected = (base as f32 / 100.0) * (scope as f32 / 100.0);
                let actual = effective_volume(base as f32, scope as f32);
                assert!((actual - expected).abs() < 1e-6, "{} {}", base, scope);
            }
        }
    }

    #[test]
    fn test_clamping() {
        assert_eq!(effective_volume(150.0, 100.0), 1.0);
        assert_eq!(effective_volume(-5.0, 100.0), 0.0);
        assert_eq!(effective_volume(f32::NAN, 100.0), 0.0);
    }

    #[test]
    fn test_apply_records_base() {
        let store = SettingsStore::default();
        let mut cascade = VolumeCascade::new(&store);
        let volume = cascade.apply(AudioScope::Music, 80.0);
        assert!((volume - 0.8).abs() < 1e-6);
        assert_eq!(cascade.last_base(AudioScope::Music), 80.0);
        assert_eq!(cascade.last_base(AudioScope::Sound), 100.0);
    }

    #[test]
    fn test_refresh_reports_only_drifted_scopes() {
        let store = SettingsStore::default();
        let mut cascade = VolumeCascade::new(&store);
        assert!(!cascade.refresh(&store).any());

        store.set_volume(AudioScope::Voice, 40.0);
        let changes = cascade.refresh(&store);
        assert!(changes.voice);
        assert!(!changes.music && !changes.sound);
        assert_eq!(cascade.general(AudioScope::Voice), 40.0);

        // Writing the same value bumps the revision but changes nothing
        store.set_volume(AudioScope::Voice, 40.0);
        assert!(!cascade.refresh(&store).any());
    }

    #[test]
    fn test_disabling_scope_counts_as_drift() {
        let store = SettingsStore::default();
        let mut cascade = VolumeCascade::new(&store);
        store.set_enabled(AudioScope::Music, false);
        assert!(cascade.refresh(&store).contains(AudioScope::Music));
        assert_eq!(cascade.volume_for(AudioScope::Music, 100.0), 0.0);
    }
}
