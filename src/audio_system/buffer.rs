//! Buffer primitive contract
//!
//! The manager never decodes or mixes audio itself. It drives opaque buffers
//! through the traits below and obtains them from a `ResourceProvider`.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a buffer for as long as its handle lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    pub(crate) fn next() -> Self {
        BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transport controls shared by buffers and pooled references
///
/// Volumes and playback rates are on a 0.0-1.0 scale. Fade lengths are in frames.
pub trait Playback {
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);

    fn playback_rate(&self) -> f32;
    fn set_playback_rate(&mut self, rate: f32);

    fn is_looping(&self) -> bool;
    fn set_looping(&mut self, looping: bool);

    /// Start from the beginning
    fn play(&mut self, fade_in_frames: u32);

    /// Stop, keeping the position so `resume` can continue
    fn stop(&mut self, fade_out_frames: u32);

    fn resume(&mut self, fade_in_frames: u32);

    fn is_playing(&self) -> bool;

    /// Advance one frame of fades and bookkeeping
    fn update(&mut self);
}

/// One randomized crossfade cycle of an ambient loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeCycle {
    /// Fade-in length; the fade-out uses the same length
    pub fade_frames: u32,

    /// Per-frame volume increment while fading in (`1 / fade_frames`)
    pub fade_in_volume_step: f32,

    /// Frames the cycle stays audible, fades included
    pub play_frames: i64,

    /// Cascaded volume to ramp towards
    pub target_volume: f32,
}

impl FadeCycle {
    pub fn fade_out_frames(&self) -> u32 {
        self.fade_frames
    }
}

/// An opaque decoded (or decoding) sound or stream
pub trait AudioBuffer: Playback {
    fn is_decoded(&self) -> bool;

    /// Begin decoding; `notifier` must be finished exactly once on success
    fn decode(&mut self, notifier: DecodeNotifier);

    /// Length in seconds
    fn duration(&self) -> f64;

    /// Playback position in seconds
    fn current_time(&self) -> f64;

    /// Run one ambient crossfade cycle, replacing any cycle in progress
    fn begin_fade_cycle(&mut self, cycle: FadeCycle);

    /// Create an independent playback instance over the same decoded data
    fn create_reference(&self) -> Box<dyn Playback>;
}

/// Shared single-threaded handle to a buffer
#[derive(Clone)]
pub struct BufferHandle {
    id: BufferId,
    inner: Rc<RefCell<dyn AudioBuffer>>,
}

impl BufferHandle {
    pub fn new<B: AudioBuffer + 'static>(buffer: B) -> Self {
        let inner: Rc<RefCell<dyn AudioBuffer>> = Rc::new(RefCell::new(buffer));
        Self {
            id: BufferId::next(),
            inner,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn borrow(&self) -> Ref<'_, dyn AudioBuffer> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, dyn AudioBuffer> {
        self.inner.borrow_mut()
    }
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferHandle").field("id", &self.id).finish()
    }
}

/// Result of a decode, as seen by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Finished(BufferId),
    Failed(BufferId),
}

/// One-shot decode completion signal
///
/// Consumed by `finish`, so a buffer cannot report completion twice.
/// Dropping it unfinished reports the decode as failed.
#[derive(Debug)]
pub struct DecodeNotifier {
    id: BufferId,
    sender: Option<Sender<DecodeOutcome>>,
}

impl DecodeNotifier {
    pub(crate) fn new(id: BufferId, sender: Sender<DecodeOutcome>) -> Self {
        Self {
            id,
            sender: Some(sender),
        }
    }

    pub fn buffer_id(&self) -> BufferId {
        self.id
    }

    pub fn finish(mut self) {
        if let Some(sender) = self.sender.take() {
            // Receiver gone means the manager was dropped
            let _ = sender.send(DecodeOutcome::Finished(self.id));
        }
    }
}

impl Drop for DecodeNotifier {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(DecodeOutcome::Failed(self.id));
        }
    }
}

/// What a resource is loaded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioKind {
    Music,
    Sound,
}

/// Resolves names to resource paths and hands out buffers
pub trait ResourceProvider {
    /// Resource path for a name; an empty string means "nothing to play"
    fn resolve_path(&self, kind: AudioKind, name: &str) -> String;

    /// Streamed buffer for music
    fn audio_stream(&mut self, path: &str) -> Option<BufferHandle>;

    /// Buffered data for sound effects and voices
    fn audio_buffer(&mut self, path: &str) -> Option<BufferHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_buffer_ids_are_unique() {
        let a = BufferId::next();
        let b = BufferId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn test_notifier_sends_its_id_once() {
        let (tx, rx) = unbounded();
        let id = BufferId::next();
        let notifier = DecodeNotifier::new(id, tx);
        assert_eq!(notifier.buffer_id(), id);
        notifier.finish();

        assert_eq!(rx.try_recv().unwrap(), DecodeOutcome::Finished(id));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_notifier_reports_failure() {
        let (tx, rx) = unbounded();
        let id = BufferId::next();
        drop(DecodeNotifier::new(id, tx));

        assert_eq!(rx.try_recv().unwrap(), DecodeOutcome::Failed(id));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fade_cycle_is_symmetric() {
        let cycle = FadeCycle {
            fade_frames: 30,
            fade_in_volume_step: 1.0 / 30.0,
            play_frames: 300,
            target_volume: 0.5,
        };
        assert_eq!(cycle.fade_out_frames(), cycle.fade_frames);
    }
}
