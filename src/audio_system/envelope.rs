/// Frame-based gain envelope
///
/// Backends multiply their configured volume by the envelope level, so fades
/// never overwrite the cascaded volume.
use std::collections::VecDeque;

use super::buffer::FadeCycle;

/// Linear move towards `target` over `frames` frames
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    target: f32,
    frames: u32,
}

/// Queue of linear gain segments, advanced one frame at a time
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    level: f32,
    segments: VecDeque<Segment>,
}

impl Envelope {
    /// Envelope resting at `level`
    pub fn at(level: f32) -> Self {
        Self {
            level: level.clamp(0.0, 1.0),
            segments: VecDeque::new(),
        }
    }

    /// Current level (0.0-1.0)
    pub fn level(&self) -> f32 {
        self.level
    }

    /// True once every queued segment has been played out
    pub fn is_settled(&self) -> bool {
        self.segments.is_empty()
    }

    /// Jump to `level`, dropping queued segments
    pub fn set(&mut self, level: f32) {
        self.segments.clear();
        self.level = level.clamp(0.0, 1.0);
    }

    /// Replace queued segments with a single ramp
    pub fn ramp_to(&mut self, target: f32, frames: u32) {
        self.segments.clear();
        self.then(target, frames);
    }

    /// Append a ramp after the queued segments
    pub fn then(&mut self, target: f32, frames: u32) {
        self.segments.push_back(Segment {
            target: target.clamp(0.0, 1.0),
            frames,
        });
    }

    /// Fade in from silence over `frames` (instant when 0)
    pub fn fade_in(&mut self, frames: u32) {
        if frames == 0 {
            self.set(1.0);
        } else {
            self.set(0.0);
            self.then(1.0, frames);
        }
    }

    /// Queue an ambient crossfade: fade in, hold, fade out
    ///
    /// The fade in starts from the current level, so a cycle that interrupts
    /// a running fade out picks up where it left off.
    pub fn cycle(&mut self, cycle: &FadeCycle) {
        let fade = cycle.fade_frames;
        let hold = (cycle.play_frames - 2 * i64::from(fade)).max(0);
        let hold = u32::try_from(hold).unwrap_or(u32::MAX);

        self.ramp_to(1.0, fade);
        self.then(1.0, hold);
        self.then(0.0, cycle.fade_out_frames());
    }

    /// Advance one frame, returning the new level
    pub fn step(&mut self) -> f32 {
        if let Some(segment) = self.segments.front_mut() {
            if segment.frames <= 1 {
                self.level = segment.target;
                self.segments.pop_front();
            } else {
                self.level += (segment.target - self.level) / segment.frames as f32;
                segment.frames -= 1;
            }
        }
        self.level
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::at(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_in_reaches_full_level() {
        let mut env = Envelope::at(0.0);
        env.fade_in(4);
        let levels: Vec<f32> = (0..4).map(|_| env.step()).collect();
        assert!((levels[0] - 0.25).abs() < 1e-6);
        assert!((levels[1] - 0.5).abs() < 1e-6);
        assert_eq!(levels[3], 1.0);
        assert!(env.is_settled());
    }

    #[test]
    fn test_instant_fade_in() {
        let mut env = Envelope::at(0.0);
        env.fade_in(0);
        assert_eq!(env.level(), 1.0);
        assert!(env.is_settled());
    }

    #[test]
    fn test_cycle_shape() {
        let mut env = Envelope::at(0.0);
        env.cycle(&FadeCycle {
            fade_frames: 2,
            fade_in_volume_step: 0.5,
            play_frames: 6,
            target_volume: 1.0,
        });
        let levels: Vec<f32> = (0..6).map(|_| env.step()).collect();
        assert_eq!(levels, vec![0.5, 1.0, 1.0, 1.0, 0.5, 0.0]);
        assert!(env.is_settled());
    }

    #[test]
    fn test_cycle_continues_from_current_level() {
        let mut env = Envelope::at(1.0);
        env.ramp_to(0.0, 4);
        env.step();
        env.step();
        assert!((env.level() - 0.5).abs() < 1e-6);

        env.cycle(&FadeCycle {
            fade_frames: 4,
            fade_in_volume_step: 0.25,
            play_frames: 8,
            target_volume: 1.0,
        });
        assert!((env.level() - 0.5).abs() < 1e-6);
        assert!((env.step() - 0.625).abs() < 1e-6);
    }

    #[test]
    fn test_short_cycle_skips_hold() {
        let mut env = Envelope::at(0.0);
        env.cycle(&FadeCycle {
            fade_frames: 3,
            fade_in_volume_step: 1.0 / 3.0,
            play_frames: 1,
            target_volume: 1.0,
        });
        for _ in 0..10 {
            env.step();
        }
        assert_eq!(env.level(), 0.0);
        assert!(env.is_settled());
    }

    #[test]
    fn test_step_without_segments_is_stable() {
        let mut env = Envelope::default();
        assert_eq!(env.step(), 1.0);
        env.set(0.3);
        assert_eq!(env.step(), 0.3);
    }
}
