/// Rodio backend
///
/// Buffers keep the encoded file in memory and build a fresh decoder for each
/// `play`, the same way the preloaded players always did. Fades are applied by
/// the per-frame envelope, pushed to the sink on every `update`.
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use crate::config::AudioConfig;
use crate::error::AudioError;

use super::buffer::{
    AudioBuffer, AudioKind, BufferHandle, DecodeNotifier, FadeCycle, Playback, ResourceProvider,
};
use super::envelope::Envelope;

/// Extensions tried, in order, for names given without one
const EXTENSIONS: [&str; 5] = ["ogg", "mp3", "wav", "flac", "m4a"];

/// Decode the whole file once to learn its length in seconds
fn measure(data: &Arc<Vec<u8>>) -> Result<f64, AudioError> {
    // Decoder needs owned 'static data
    let decoder = Decoder::new(Cursor::new((**data).clone()))
        .map_err(|e| AudioError::DecodeFailed(Box::new(e)))?;

    if let Some(total) = decoder.total_duration() {
        return Ok(total.as_secs_f64());
    }

    let channels = f64::from(decoder.channels().max(1));
    let sample_rate = f64::from(decoder.sample_rate().max(1));
    let samples = decoder.count() as f64;
    Ok(samples / channels / sample_rate)
}

/// One sink playing the shared file data
pub struct RodioVoice {
    handle: OutputStreamHandle,
    data: Arc<Vec<u8>>,
    sink: Option<Sink>,
    duration: f64,
    volume: f32,
    rate: f32,
    looping: bool,
    playing: bool,
    pause_when_silent: bool,
    envelope: Envelope,
    position: f64,
    last_tick: Option<Instant>,
}

impl RodioVoice {
    fn new(handle: OutputStreamHandle, data: Arc<Vec<u8>>, duration: f64) -> Self {
        Self {
            handle,
            data,
            sink: None,
            duration,
            volume: 1.0,
            rate: 1.0,
            looping: false,
            playing: false,
            pause_when_silent: false,
            envelope: Envelope::default(),
            position: 0.0,
            last_tick: None,
        }
    }

    fn start_sink(&self) -> Result<Sink, AudioError> {
        let sink =
            Sink::try_new(&self.handle).map_err(|e| AudioError::PlaybackFailed(Box::new(e)))?;
        let cursor = Cursor::new((*self.data).clone());
        if self.looping {
            let source =
                Decoder::new_looped(cursor).map_err(|e| AudioError::DecodeFailed(Box::new(e)))?;
            sink.append(source);
        } else {
            let source = Decoder::new(cursor).map_err(|e| AudioError::DecodeFailed(Box::new(e)))?;
            sink.append(source);
        }
        sink.set_speed(self.rate);
        sink.set_volume(self.gain());
        sink.play();
        Ok(sink)
    }

    fn gain(&self) -> f32 {
        self.volume * self.envelope.level()
    }

    fn current_time(&self) -> f64 {
        self.position
    }

    fn advance_clock(&mut self) {
        let now = Instant::now();
        let elapsed = self
            .last_tick
            .map(|t| now.duration_since(t))
            .unwrap_or(Duration::ZERO);
        self.last_tick = Some(now);

        if !self.playing {
            return;
        }
        self.position += elapsed.as_secs_f64() * f64::from(self.rate);
        if self.duration > 0.0 && self.position >= self.duration {
            if self.looping {
                self.position %= self.duration;
            } else {
                self.position = self.duration;
            }
        }
    }

    fn begin_fade_cycle(&mut self, cycle: &FadeCycle) {
        // A silent voice fades in from nothing
        if self.volume <= 0.0 {
            self.envelope.set(0.0);
        }
        self.volume = cycle.target_volume.clamp(0.0, 1.0);
        self.envelope.cycle(cycle);
        self.pause_when_silent = false;
    }
}

impl Playback for RodioVoice {
    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.gain());
        }
    }

    fn playback_rate(&self) -> f32 {
        self.rate
    }

    fn set_playback_rate(&mut self, rate: f32) {
        self.rate = rate.max(0.0);
        if let Some(sink) = &self.sink {
            sink.set_speed(self.rate);
        }
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn play(&mut self, fade_in_frames: u32) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.envelope.fade_in(fade_in_frames);
        self.pause_when_silent = false;
        self.position = 0.0;
        self.last_tick = Some(Instant::now());

        match self.start_sink() {
            Ok(sink) => {
                self.sink = Some(sink);
                self.playing = true;
            }
            Err(e) => {
                tracing::warn!("Audio playback failed: {}", e);
                self.playing = false;
            }
        }
    }

    fn stop(&mut self, fade_out_frames: u32) {
        self.playing = false;
        if fade_out_frames == 0 {
            self.envelope.set(0.0);
            if let Some(sink) = &self.sink {
                sink.pause();
            }
        } else {
            self.envelope.ramp_to(0.0, fade_out_frames);
            self.pause_when_silent = true;
        }
    }

    fn resume(&mut self, fade_in_frames: u32) {
        let Some(sink) = &self.sink else {
            self.play(fade_in_frames);
            return;
        };
        self.envelope.fade_in(fade_in_frames);
        self.pause_when_silent = false;
        sink.set_volume(self.gain());
        sink.play();
        self.playing = true;
        self.last_tick = Some(Instant::now());
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn update(&mut self) {
        self.envelope.step();
        self.advance_clock();

        let Some(sink) = &self.sink else {
            return;
        };
        sink.set_volume(self.gain());

        if self.pause_when_silent && self.envelope.is_settled() {
            sink.pause();
            self.pause_when_silent = false;
        }
        if self.playing && sink.empty() {
            self.playing = false;
        }
    }
}

/// File-backed buffer
pub struct RodioBuffer {
    voice: RodioVoice,
    path: String,
    decoded: bool,
}

impl RodioBuffer {
    /// Buffer whose length has already been measured
    fn decoded(
        handle: OutputStreamHandle,
        data: Arc<Vec<u8>>,
        path: String,
    ) -> Result<Self, AudioError> {
        let duration = measure(&data)?;
        Ok(Self {
            voice: RodioVoice::new(handle, data, duration),
            path,
            decoded: true,
        })
    }

    /// Buffer that is measured on `decode`
    fn pending(handle: OutputStreamHandle, data: Arc<Vec<u8>>, path: String) -> Self {
        Self {
            voice: RodioVoice::new(handle, data, 0.0),
            path,
            decoded: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Playback for RodioBuffer {
    fn volume(&self) -> f32 {
        self.voice.volume()
    }
    fn set_volume(&mut self, volume: f32) {
        self.voice.set_volume(volume);
    }
    fn playback_rate(&self) -> f32 {
        self.voice.playback_rate()
    }
    fn set_playback_rate(&mut self, rate: f32) {
        self.voice.set_playback_rate(rate);
    }
    fn is_looping(&self) -> bool {
        self.voice.is_looping()
    }
    fn set_looping(&mut self, looping: bool) {
        self.voice.set_looping(looping);
    }
    fn play(&mut self, fade_in_frames: u32) {
        self.voice.play(fade_in_frames);
    }
    fn stop(&mut self, fade_out_frames: u32) {
        self.voice.stop(fade_out_frames);
    }
    fn resume(&mut self, fade_in_frames: u32) {
        self.voice.resume(fade_in_frames);
    }
    fn is_playing(&self) -> bool {
        self.voice.is_playing()
    }
    fn update(&mut self) {
        self.voice.update();
    }
}

impl AudioBuffer for RodioBuffer {
    fn is_decoded(&self) -> bool {
        self.decoded
    }

    fn decode(&mut self, notifier: DecodeNotifier) {
        if self.decoded {
            notifier.finish();
            return;
        }
        match measure(&self.voice.data) {
            Ok(duration) => {
                self.voice.duration = duration;
                self.decoded = true;
                tracing::debug!("Decoded {} ({:.2}s)", self.path, duration);
                notifier.finish();
            }
            // Dropping the notifier reports the failure
            Err(e) => tracing::warn!("Could not decode {}: {}", self.path, e),
        }
    }

    fn duration(&self) -> f64 {
        self.voice.duration
    }

    fn current_time(&self) -> f64 {
        self.voice.current_time()
    }

    fn begin_fade_cycle(&mut self, cycle: FadeCycle) {
        self.voice.begin_fade_cycle(&cycle);
    }

    fn create_reference(&self) -> Box<dyn Playback> {
        Box::new(RodioVoice::new(
            self.voice.handle.clone(),
            Arc::clone(&self.voice.data),
            self.voice.duration,
        ))
    }
}

/// Provider reading audio files below the configured asset folders
pub struct RodioProvider {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    music_dir: PathBuf,
    sound_dir: PathBuf,
    streams: HashMap<String, BufferHandle>,
    buffers: HashMap<String, BufferHandle>,
}

impl RodioProvider {
    /// Create a new provider on the default output device
    pub fn new(config: &AudioConfig) -> Result<Self, AudioError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| AudioError::StreamInitFailed(Box::new(e)))?;

        tracing::info!(
            "Audio output ready (music: {}, sounds: {})",
            config.music_dir().display(),
            config.sound_dir().display()
        );

        Ok(Self {
            _stream: stream,
            handle,
            music_dir: config.music_dir(),
            sound_dir: config.sound_dir(),
            streams: HashMap::new(),
            buffers: HashMap::new(),
        })
    }

    fn read(path: &str) -> Result<Arc<Vec<u8>>, AudioError> {
        let data = std::fs::read(path).map_err(|e| AudioError::LoadFailed {
            path: path.to_string(),
            source: Box::new(e),
        })?;
        tracing::debug!("Preloaded audio file: {} ({} bytes)", path, data.len());
        Ok(Arc::new(data))
    }
}

/// `dir/name`, completing a missing extension from the files on disk
fn locate(dir: &Path, name: &str) -> PathBuf {
    let direct = dir.join(name);
    if direct.extension().is_some() || direct.exists() {
        return direct;
    }
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .find(|candidate| candidate.exists())
        .unwrap_or(direct)
}

impl ResourceProvider for RodioProvider {
    fn resolve_path(&self, kind: AudioKind, name: &str) -> String {
        let name = name.trim();
        if name.is_empty() {
            return String::new();
        }
        let dir = match kind {
            AudioKind::Music => &self.music_dir,
            AudioKind::Sound => &self.sound_dir,
        };
        locate(dir, name).display().to_string()
    }

    fn audio_stream(&mut self, path: &str) -> Option<BufferHandle> {
        if let Some(handle) = self.streams.get(path) {
            return Some(handle.clone());
        }
        let buffer = Self::read(path)
            .and_then(|data| RodioBuffer::decoded(self.handle.clone(), data, path.to_string()));
        match buffer {
            Ok(buffer) => {
                let handle = BufferHandle::new(buffer);
                self.streams.insert(path.to_string(), handle.clone());
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("Could not open music stream: {}", e);
                None
            }
        }
    }

    fn audio_buffer(&mut self, path: &str) -> Option<BufferHandle> {
        if let Some(handle) = self.buffers.get(path) {
            return Some(handle.clone());
        }
        match Self::read(path) {
            Ok(data) => {
                let buffer = RodioBuffer::pending(self.handle.clone(), data, path.to_string());
                let handle = BufferHandle::new(buffer);
                self.buffers.insert(path.to_string(), handle.clone());
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("Could not load sound: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Playback needs an output device; only path handling is covered here

    #[test]
    fn test_locate_keeps_explicit_extension() {
        let dir = Path::new("/nonexistent/music");
        assert_eq!(locate(dir, "theme.mp3"), dir.join("theme.mp3"));
    }

    #[test]
    fn test_locate_finds_extension_on_disk() {
        let dir = std::env::temp_dir()
            .join("novel-audio-tests")
            .join(format!("locate-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("rain.wav"), b"").unwrap();

        let found = locate(&dir, "rain");
        let _ = std::fs::remove_dir_all(&dir);
        assert_eq!(found, dir.join("rain.wav"));
    }

    #[test]
    fn test_locate_falls_back_to_bare_name() {
        let dir = Path::new("/nonexistent/sounds");
        assert_eq!(locate(dir, "door"), dir.join("door"));
    }

    #[test]
    fn test_read_missing_file_is_load_error() {
        let err = RodioProvider::read("/nonexistent/audio.ogg").unwrap_err();
        assert!(matches!(err, AudioError::LoadFailed { .. }));
    }
}
