/// Ambient-loop scheduler
///
/// Turns a short track into a non-repeating ambience by re-fading it at
/// randomized intervals. Frame units are derived from a 16.6 ms frame.
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::buffer::FadeCycle;

/// Frame length used to convert seconds into scheduler frames
pub const FRAME_MS: f64 = 16.6;

/// Convert seconds to scheduler frames
pub fn seconds_to_frames(seconds: f64) -> f64 {
    seconds * 1000.0 / FRAME_MS
}

/// Candidate loop-body lengths, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub min: i64,
    /// 0 means "up to the whole track"
    pub max: i64,
}

impl FrameRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }
}

/// Offsets inside which the next re-fade may trigger, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameWindow {
    pub start: i64,
    /// 0 means "up to the whole track"
    pub end: i64,
}

impl FrameWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

/// Inclusive uniform draw that tolerates reversed bounds
fn uniform<R: Rng + ?Sized>(rng: &mut R, a: i64, b: i64) -> i64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    rng.gen_range(lo..=hi)
}

/// Scheduler state for one ambient buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbientLoopParams {
    pub fade_frames: u32,
    pub play_time_range: FrameRange,
    pub play_range_window: FrameWindow,

    /// Frames left until the next re-fade
    pub countdown: i64,
}

impl AmbientLoopParams {
    /// Build params for a track of `duration_frames`, seeding the first countdown
    pub fn new<R: Rng + ?Sized>(
        fade_frames: u32,
        play_time_range: FrameRange,
        play_range_window: FrameWindow,
        duration_frames: i64,
        rng: &mut R,
    ) -> Self {
        let mut play_time_range = play_time_range;
        if play_time_range.max == 0 {
            play_time_range.max = duration_frames;
        }
        let mut play_range_window = play_range_window;
        if play_range_window.end == 0 {
            play_range_window.end = duration_frames;
        }

        let countdown = uniform(rng, play_range_window.start, play_range_window.end);

        Self {
            fade_frames,
            play_time_range,
            play_range_window,
            countdown,
        }
    }

    /// Advance one frame
    ///
    /// Returns a fade cycle when the countdown crosses zero. `remaining_frames`
    /// is the buffer's unplayed length in scheduler frames.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        remaining_frames: f64,
        target_volume: f32,
        rng: &mut R,
    ) -> Option<FadeCycle> {
        self.countdown -= 1;
        if self.countdown > 0 {
            return None;
        }

        let drawn = uniform(rng, self.play_time_range.min, self.play_time_range.max);
        let remaining = if remaining_frames.is_finite() {
            remaining_frames.max(0.0).floor() as i64
        } else {
            0
        };
        let play_time = drawn.min(remaining);

        let fade_frames = self.fade_frames.max(1);
        self.countdown = play_time
            + uniform(
                rng,
                self.play_range_window.start,
                self.play_range_window.end,
            );

        tracing::trace!(
            "Ambient re-fade: play_time={} fade={} next in {}",
            play_time,
            fade_frames,
            self.countdown
        );

        Some(FadeCycle {
            fade_frames,
            fade_in_volume_step: 1.0 / fade_frames as f32,
            play_frames: play_time,
            target_volume,
        })
    }
}
