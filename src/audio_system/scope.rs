/// Audio scopes
///
/// Each scope has its own player-configurable volume slider and enabled flag.
use std::fmt;

/// Volume scope a buffer or reference belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioScope {
    /// Background music layers
    Music,

    /// Sound effects
    Sound,

    /// Voice lines
    Voice,
}

impl fmt::Display for AudioScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioScope::Music => write!(f, "Music"),
            AudioScope::Sound => write!(f, "Sound"),
            AudioScope::Voice => write!(f, "Voice"),
        }
    }
}

impl AudioScope {
    /// All scopes in refresh order
    pub const ALL: [AudioScope; 3] = [AudioScope::Music, AudioScope::Sound, AudioScope::Voice];

    /// Scope used by a pooled reference
    pub fn for_reference(voice: bool) -> Self {
        if voice {
            AudioScope::Voice
        } else {
            AudioScope::Sound
        }
    }

    /// Index into per-scope arrays
    pub(crate) fn index(&self) -> usize {
        match self {
            AudioScope::Music => 0,
            AudioScope::Sound => 1,
            AudioScope::Voice => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_display() {
        assert_eq!(AudioScope::Music.to_string(), "Music");
        assert_eq!(AudioScope::Voice.to_string(), "Voice");
    }

    #[test]
    fn test_reference_scope() {
        assert_eq!(AudioScope::for_reference(true), AudioScope::Voice);
        assert_eq!(AudioScope::for_reference(false), AudioScope::Sound);
    }

    #[test]
    fn test_scope_indices_are_distinct() {
        let indices: Vec<usize> = AudioScope::ALL.iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
