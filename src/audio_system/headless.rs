//! Headless backend
//!
//! Buffers that simulate transport, fades and decoding without an audio
//! device. Time advances by one scheduler frame per `update`. Used for tests,
//! CI and servers that run scenes without sound output.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::ambient::FRAME_MS;
use super::buffer::{
    AudioBuffer, AudioKind, BufferHandle, DecodeNotifier, FadeCycle, Playback, ResourceProvider,
};
use super::envelope::Envelope;

/// Decodes waiting for `HeadlessProvider::finish_decodes`
type DecodeQueue = Rc<RefCell<Vec<(Rc<Cell<bool>>, DecodeNotifier)>>>;

/// Simulated transport shared by buffers and references
#[derive(Debug, Clone)]
struct Transport {
    duration: f64,
    position: f64,
    volume: f32,
    rate: f32,
    looping: bool,
    playing: bool,
    envelope: Envelope,
}

impl Transport {
    fn new(duration: f64) -> Self {
        Self {
            duration,
            position: 0.0,
            volume: 1.0,
            rate: 1.0,
            looping: false,
            playing: false,
            envelope: Envelope::default(),
        }
    }

    fn play(&mut self, fade_in_frames: u32) {
        self.position = 0.0;
        self.playing = true;
        self.envelope.fade_in(fade_in_frames);
    }

    fn stop(&mut self, fade_out_frames: u32) {
        self.playing = false;
        self.envelope.ramp_to(0.0, fade_out_frames);
    }

    fn resume(&mut self, fade_in_frames: u32) {
        self.playing = true;
        self.envelope.fade_in(fade_in_frames);
    }

    fn update(&mut self) {
        self.envelope.step();
        if !self.playing {
            return;
        }
        self.position += FRAME_MS / 1000.0 * f64::from(self.rate);
        if self.position >= self.duration {
            if self.looping && self.duration > 0.0 {
                self.position %= self.duration;
            } else {
                self.position = self.duration;
                self.playing = false;
            }
        }
    }

    fn gain(&self) -> f32 {
        self.volume * self.envelope.level()
    }
}

macro_rules! impl_playback {
    ($ty:ty) => {
        impl Playback for $ty {
            fn volume(&self) -> f32 {
                self.transport.volume
            }
            fn set_volume(&mut self, volume: f32) {
                self.transport.volume = volume.clamp(0.0, 1.0);
            }
            fn playback_rate(&self) -> f32 {
                self.transport.rate
            }
            fn set_playback_rate(&mut self, rate: f32) {
                self.transport.rate = rate.max(0.0);
            }
            fn is_looping(&self) -> bool {
                self.transport.looping
            }
            fn set_looping(&mut self, looping: bool) {
                self.transport.looping = looping;
            }
            fn play(&mut self, fade_in_frames: u32) {
                self.transport.play(fade_in_frames);
            }
            fn stop(&mut self, fade_out_frames: u32) {
                self.transport.stop(fade_out_frames);
            }
            fn resume(&mut self, fade_in_frames: u32) {
                self.transport.resume(fade_in_frames);
            }
            fn is_playing(&self) -> bool {
                self.transport.playing
            }
            fn update(&mut self) {
                self.transport.update();
            }
        }
    };
}

/// Simulated buffer
#[derive(Debug)]
pub struct HeadlessBuffer {
    transport: Transport,
    decoded: Rc<Cell<bool>>,
    decode_queue: Option<DecodeQueue>,
    last_cycle: Option<FadeCycle>,
}

impl HeadlessBuffer {
    /// Buffer that decodes as soon as `decode` is called
    pub fn new(duration: f64) -> Self {
        Self {
            transport: Transport::new(duration),
            decoded: Rc::new(Cell::new(false)),
            decode_queue: None,
            last_cycle: None,
        }
    }

    /// Buffer that is already decoded
    pub fn decoded(duration: f64) -> Self {
        let buffer = Self::new(duration);
        buffer.decoded.set(true);
        buffer
    }

    fn deferred(duration: f64, queue: DecodeQueue) -> Self {
        Self {
            decode_queue: Some(queue),
            ..Self::new(duration)
        }
    }

    /// Audible gain: volume times the fade envelope
    pub fn gain(&self) -> f32 {
        self.transport.gain()
    }

    pub fn last_cycle(&self) -> Option<FadeCycle> {
        self.last_cycle
    }
}

impl_playback!(HeadlessBuffer);

impl AudioBuffer for HeadlessBuffer {
    fn is_decoded(&self) -> bool {
        self.decoded.get()
    }

    fn decode(&mut self, notifier: DecodeNotifier) {
        match &self.decode_queue {
            Some(queue) => queue
                .borrow_mut()
                .push((Rc::clone(&self.decoded), notifier)),
            None => {
                self.decoded.set(true);
                notifier.finish();
            }
        }
    }

    fn duration(&self) -> f64 {
        self.transport.duration
    }

    fn current_time(&self) -> f64 {
        self.transport.position
    }

    fn begin_fade_cycle(&mut self, cycle: FadeCycle) {
        if self.transport.volume <= 0.0 {
            self.transport.envelope.set(0.0);
        }
        self.transport.volume = cycle.target_volume.clamp(0.0, 1.0);
        self.transport.envelope.cycle(&cycle);
        self.last_cycle = Some(cycle);
    }

    fn create_reference(&self) -> Box<dyn Playback> {
        Box::new(HeadlessReference {
            transport: Transport::new(self.transport.duration),
        })
    }
}

/// Simulated pooled reference
#[derive(Debug)]
pub struct HeadlessReference {
    transport: Transport,
}

impl_playback!(HeadlessReference);

/// Provider handing out headless buffers from a table of durations
///
/// Handles are cached per path, so the same name yields the same buffer.
#[derive(Debug, Default)]
pub struct HeadlessProvider {
    durations: HashMap<String, f64>,
    streams: HashMap<String, BufferHandle>,
    buffers: HashMap<String, BufferHandle>,
    deferred: bool,
    decode_queue: DecodeQueue,
    default_duration: Option<f64>,
}

impl HeadlessProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a track or sound by name
    pub fn with_track(mut self, name: &str, duration: f64) -> Self {
        self.durations.insert(name.to_string(), duration);
        self
    }

    /// Serve unknown names with this duration instead of failing
    pub fn with_default_duration(mut self, duration: f64) -> Self {
        self.default_duration = Some(duration);
        self
    }

    /// Hand out undecoded sound buffers whose decode waits for `finish_decodes`
    pub fn with_deferred_decoding(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Complete every queued decode, returning how many finished
    pub fn finish_decodes(&self) -> usize {
        let pending: Vec<_> = self.decode_queue.borrow_mut().drain(..).collect();
        let count = pending.len();
        for (decoded, notifier) in pending {
            decoded.set(true);
            notifier.finish();
        }
        count
    }

    /// Drop queued decodes without completing them
    pub fn fail_decodes(&self) -> usize {
        let mut queue = self.decode_queue.borrow_mut();
        let count = queue.len();
        queue.clear();
        count
    }

    /// Cached music handle for a name
    pub fn stream(&self, name: &str) -> Option<&BufferHandle> {
        self.streams.get(name)
    }

    /// Cached sound handle for a name
    pub fn buffer(&self, name: &str) -> Option<&BufferHandle> {
        self.buffers.get(name)
    }

    fn duration_of(&self, name: &str) -> Option<f64> {
        self.durations.get(name).copied().or(self.default_duration)
    }
}

impl ResourceProvider for HeadlessProvider {
    fn resolve_path(&self, _kind: AudioKind, name: &str) -> String {
        name.trim().to_string()
    }

    fn audio_stream(&mut self, path: &str) -> Option<BufferHandle> {
        if let Some(handle) = self.streams.get(path) {
            return Some(handle.clone());
        }
        let duration = self.duration_of(path)?;
        let handle = BufferHandle::new(HeadlessBuffer::decoded(duration));
        self.streams.insert(path.to_string(), handle.clone());
        Some(handle)
    }

    fn audio_buffer(&mut self, path: &str) -> Option<BufferHandle> {
        if let Some(handle) = self.buffers.get(path) {
            return Some(handle.clone());
        }
        let duration = self.duration_of(path)?;
        let buffer = if self.deferred {
            HeadlessBuffer::deferred(duration, Rc::clone(&self.decode_queue))
        } else {
            HeadlessBuffer::decoded(duration)
        };
        let handle = BufferHandle::new(buffer);
        self.buffers.insert(path.to_string(), handle.clone());
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::buffer::DecodeOutcome;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_reference_finishes_after_duration() {
        let buffer = HeadlessBuffer::decoded(0.05);
        let mut reference = buffer.create_reference();
        reference.play(0);
        assert!(reference.is_playing());
        for _ in 0..4 {
            reference.update();
        }
        assert!(!reference.is_playing());
    }

    #[test]
    fn test_looping_reference_keeps_playing() {
        let buffer = HeadlessBuffer::decoded(0.02);
        let mut reference = buffer.create_reference();
        reference.set_looping(true);
        reference.play(0);
        for _ in 0..10 {
            reference.update();
        }
        assert!(reference.is_playing());
    }

    #[test]
    fn test_volume_is_independent_of_fade() {
        let mut buffer = HeadlessBuffer::decoded(10.0);
        buffer.set_volume(0.8);
        buffer.play(4);
        buffer.update();
        assert_eq!(buffer.volume(), 0.8);
        assert!((buffer.gain() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_first_cycle_on_silent_buffer_fades_in() {
        let mut buffer = HeadlessBuffer::decoded(10.0);
        buffer.set_volume(0.0);
        buffer.play(0);
        buffer.begin_fade_cycle(FadeCycle {
            fade_frames: 4,
            fade_in_volume_step: 0.25,
            play_frames: 100,
            target_volume: 0.8,
        });
        assert_eq!(buffer.gain(), 0.0);
        buffer.update();
        assert!((buffer.gain() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_cycle_on_audible_buffer_does_not_cut_out() {
        let mut buffer = HeadlessBuffer::decoded(10.0);
        buffer.set_volume(0.8);
        buffer.play(0);
        buffer.begin_fade_cycle(FadeCycle {
            fade_frames: 4,
            fade_in_volume_step: 0.25,
            play_frames: 100,
            target_volume: 0.8,
        });
        assert!((buffer.gain() - 0.8).abs() < 1e-6);
        buffer.update();
        assert!((buffer.gain() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_stop_then_resume() {
        let mut buffer = HeadlessBuffer::decoded(10.0);
        buffer.play(0);
        buffer.update();
        let position = buffer.current_time();
        buffer.stop(10);
        assert!(!buffer.is_playing());
        buffer.update();
        assert_eq!(buffer.current_time(), position);
        buffer.resume(0);
        assert!(buffer.is_playing());
    }

    #[test]
    fn test_immediate_decode_notifies() {
        let (tx, rx) = unbounded();
        let handle = BufferHandle::new(HeadlessBuffer::new(1.0));
        assert!(!handle.borrow().is_decoded());
        handle
            .borrow_mut()
            .decode(DecodeNotifier::new(handle.id(), tx));
        assert!(handle.borrow().is_decoded());
        assert_eq!(rx.try_recv().unwrap(), DecodeOutcome::Finished(handle.id()));
    }

    #[test]
    fn test_deferred_decode_waits_for_provider() {
        let (tx, rx) = unbounded();
        let mut provider = HeadlessProvider::new()
            .with_track("click", 0.5)
            .with_deferred_decoding();
        let handle = provider.audio_buffer("click").unwrap();
        handle
            .borrow_mut()
            .decode(DecodeNotifier::new(handle.id(), tx));
        assert!(rx.try_recv().is_err());
        assert!(!handle.borrow().is_decoded());

        assert_eq!(provider.finish_decodes(), 1);
        assert!(handle.borrow().is_decoded());
        assert_eq!(rx.try_recv().unwrap(), DecodeOutcome::Finished(handle.id()));
    }

    #[test]
    fn test_provider_caches_and_rejects_unknown() {
        let mut provider = HeadlessProvider::new().with_track("theme", 60.0);
        let a = provider.audio_stream("theme").unwrap();
        let b = provider.audio_stream("theme").unwrap();
        assert_eq!(a.id(), b.id());
        assert!(provider.audio_stream("missing").is_none());
        assert_eq!(provider.resolve_path(AudioKind::Music, " theme "), "theme");
    }
}
