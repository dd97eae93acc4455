//! Sound pool
//!
//! Per-name lists of reusable playback references. A reference is reused as
//! soon as it stops playing; the pool never evicts.

use std::collections::HashMap;
use std::fmt;

use super::buffer::{BufferId, Playback};
use super::scope::AudioScope;

/// Address of a pooled reference
///
/// References are never removed, so the index stays valid for the pool's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoundKey {
    pub name: String,
    pub index: usize,
}

impl fmt::Display for SoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.index)
    }
}

/// Action to run once a reference finishes playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndAction {
    /// Resume ducked music
    ResumeMusic { layer: usize, fade_in_frames: u32 },
}

/// Playback settings applied when a reference is (re)started
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceConfig {
    pub base_volume: f32,
    pub base_rate: f32,
    pub voice: bool,
    pub looping: bool,
    pub on_end: Option<EndAction>,
}

/// One concurrent use of a named sound
pub struct SoundReference {
    buffer_id: BufferId,
    playback: Box<dyn Playback>,
    config: ReferenceConfig,
    was_playing: bool,
}

impl SoundReference {
    pub fn new(buffer_id: BufferId, playback: Box<dyn Playback>, config: ReferenceConfig) -> Self {
        Self {
            buffer_id,
            playback,
            config,
            was_playing: false,
        }
    }

    pub fn buffer_id(&self) -> BufferId {
        self.buffer_id
    }

    pub fn is_voice(&self) -> bool {
        self.config.voice
    }

    pub fn scope(&self) -> AudioScope {
        AudioScope::for_reference(self.config.voice)
    }

    pub fn base_volume(&self) -> f32 {
        self.config.base_volume
    }

    pub fn on_end(&self) -> Option<EndAction> {
        self.config.on_end
    }

    pub fn volume(&self) -> f32 {
        self.playback.volume()
    }

    pub fn playback_rate(&self) -> f32 {
        self.playback.playback_rate()
    }

    pub fn is_looping(&self) -> bool {
        self.playback.is_looping()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    /// Reconfigure and start from the beginning
    pub fn start(&mut self, config: ReferenceConfig, volume: f32) {
        self.config = config;
        self.playback.set_volume(volume);
        self.playback.set_playback_rate(config.base_rate / 100.0);
        self.playback.set_looping(config.looping);
        self.playback.play(0);
        self.was_playing = true;
    }

    pub fn stop(&mut self) {
        self.playback.stop(0);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.playback.set_volume(volume);
    }

    pub(crate) fn update(&mut self) {
        self.playback.update();
    }

    /// Detect the playing -> stopped edge, handing out the end action once
    pub(crate) fn take_finished(&mut self) -> Option<EndAction> {
        if !self.was_playing || self.playback.is_playing() {
            return None;
        }
        self.was_playing = false;
        self.config.on_end.take()
    }
}

impl fmt::Debug for SoundReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundReference")
            .field("buffer_id", &self.buffer_id)
            .field("config", &self.config)
            .field("playing", &self.is_playing())
            .finish()
    }
}

/// Name-keyed lists of references
#[derive(Debug, Default)]
pub struct SoundPool {
    buckets: HashMap<String, Vec<SoundReference>>,
}

impl SoundPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a bucket exists for `name`
    pub fn ensure(&mut self, name: &str) {
        if !self.buckets.contains_key(name) {
            self.buckets.insert(name.to_string(), Vec::new());
        }
    }

    /// References for `name`, empty if the name was never played
    pub fn references(&self, name: &str) -> &[SoundReference] {
        self.buckets.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, key: &SoundKey) -> Option<&SoundReference> {
        self.buckets.get(&key.name)?.get(key.index)
    }

    pub fn get_mut(&mut self, key: &SoundKey) -> Option<&mut SoundReference> {
        self.buckets.get_mut(&key.name)?.get_mut(key.index)
    }

    /// First reference of `name` that is not playing
    pub fn find_idle(&self, name: &str) -> Option<SoundKey> {
        self.references(name)
            .iter()
            .position(|r| !r.is_playing())
            .map(|index| SoundKey {
                name: name.to_string(),
                index,
            })
    }

    /// Append a reference, returning its key
    pub fn push(&mut self, name: &str, reference: SoundReference) -> SoundKey {
        let bucket = self.buckets.entry(name.to_string()).or_default();
        bucket.push(reference);
        SoundKey {
            name: name.to_string(),
            index: bucket.len() - 1,
        }
    }

    pub fn stop(&mut self, name: &str) {
        if let Some(bucket) = self.buckets.get_mut(name) {
            for reference in bucket.iter_mut() {
                reference.stop();
            }
        }
    }

    pub fn stop_all(&mut self) {
        for reference in self.iter_mut() {
            reference.stop();
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SoundReference> {
        self.buckets.values_mut().flat_map(|bucket| bucket.iter_mut())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.buckets.contains_key(name)
    }

    /// Total number of references across all names
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Minimal playback that reports whatever the shared flag says
    struct FlagPlayback {
        playing: Rc<Cell<bool>>,
        volume: f32,
        rate: f32,
        looping: bool,
    }

    impl Playback for FlagPlayback {
        fn volume(&self) -> f32 {
            self.volume
        }
        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
        }
        fn playback_rate(&self) -> f32 {
            self.rate
        }
        fn set_playback_rate(&mut self, rate: f32) {
            self.rate = rate;
        }
        fn is_looping(&self) -> bool {
            self.looping
        }
        fn set_looping(&mut self, looping: bool) {
            self.looping = looping;
        }
        fn play(&mut self, _fade_in_frames: u32) {
            self.playing.set(true);
        }
        fn stop(&mut self, _fade_out_frames: u32) {
            self.playing.set(false);
        }
        fn resume(&mut self, _fade_in_frames: u32) {
            self.playing.set(true);
        }
        fn is_playing(&self) -> bool {
            self.playing.get()
        }
        fn update(&mut self) {}
    }

    fn config(on_end: Option<EndAction>) -> ReferenceConfig {
        ReferenceConfig {
            base_volume: 100.0,
            base_rate: 50.0,
            voice: false,
            looping: false,
            on_end,
        }
    }

    fn reference(flag: &Rc<Cell<bool>>) -> SoundReference {
        let playback = FlagPlayback {
            playing: Rc::clone(flag),
            volume: 1.0,
            rate: 1.0,
            looping: false,
        };
        SoundReference::new(BufferId::next(), Box::new(playback), config(None))
    }

    #[test]
    fn test_find_idle_is_first_fit() {
        let mut pool = SoundPool::new();
        let busy = Rc::new(Cell::new(true));
        let idle_a = Rc::new(Cell::new(false));
        let idle_b = Rc::new(Cell::new(false));
        pool.push("click", reference(&busy));
        pool.push("click", reference(&idle_a));
        pool.push("click", reference(&idle_b));

        let key = pool.find_idle("click").unwrap();
        assert_eq!(key.index, 1);
        assert!(pool.find_idle("missing").is_none());
    }

    #[test]
    fn test_start_applies_config() {
        let flag = Rc::new(Cell::new(false));
        let mut r = reference(&flag);
        r.start(config(None), 0.25);
        assert!(r.is_playing());
        assert_eq!(r.volume(), 0.25);
        assert_eq!(r.playback_rate(), 0.5);
        assert!(!r.is_looping());
    }

    #[test]
    fn test_end_action_fires_once_on_stop_edge() {
        let flag = Rc::new(Cell::new(false));
        let mut r = reference(&flag);
        let action = EndAction::ResumeMusic {
            layer: 0,
            fade_in_frames: 40,
        };
        r.start(config(Some(action)), 1.0);
        assert_eq!(r.take_finished(), None);

        flag.set(false);
        assert_eq!(r.take_finished(), Some(action));
        assert_eq!(r.take_finished(), None);
    }

    #[test]
    fn test_ensure_creates_empty_bucket() {
        let mut pool = SoundPool::new();
        assert!(!pool.contains("door"));
        pool.ensure("door");
        assert!(pool.contains("door"));
        assert!(pool.references("door").is_empty());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_stop_all_stops_every_bucket() {
        let mut pool = SoundPool::new();
        let a = Rc::new(Cell::new(true));
        let b = Rc::new(Cell::new(true));
        pool.push("a", reference(&a));
        pool.push("b", reference(&b));
        pool.stop_all();
        assert!(!a.get() && !b.get());
        assert_eq!(pool.len(), 2);
    }
}
