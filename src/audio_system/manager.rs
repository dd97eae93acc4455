//! Audio manager
//!
//! Owns the music layers and the sound pool, and is ticked once per frame by
//! the host. Everything runs on the tick thread; decode completions are queued
//! and drained at the start of `update`.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::AudioConfig;
use crate::error::PlaybackSkipped;
use crate::settings::SettingsStore;

use super::ambient::{seconds_to_frames, AmbientLoopParams};
use super::args::{
    AmbientOptions, AudioArg, AudioDescriptor, MusicOptions, MusicRequest, SoundOptions,
    SoundRequest,
};
use super::buffer::{
    AudioKind, BufferHandle, BufferId, DecodeNotifier, DecodeOutcome, ResourceProvider,
};
use super::cascade::{effective_volume, VolumeCascade};
use super::layers::{ActiveEntry, AudioLayer, LayerStack};
use super::persistence::SavedLayers;
use super::pool::{EndAction, ReferenceConfig, SoundKey, SoundPool, SoundReference};
use super::scope::AudioScope;

/// How a successful `play_sound` was served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundStart {
    /// An idle pooled reference was restarted
    Reused(SoundKey),

    /// A new reference was created and started
    Allocated(SoundKey),

    /// The buffer is still decoding; the reference starts once it finishes
    Deferred(BufferId),
}

impl SoundStart {
    pub fn key(&self) -> Option<&SoundKey> {
        match self {
            SoundStart::Reused(key) | SoundStart::Allocated(key) => Some(key),
            SoundStart::Deferred(_) => None,
        }
    }
}

/// Sound requests waiting on one buffer's decode
struct PendingDecode {
    handle: BufferHandle,
    requests: Vec<SoundRequest>,
}

/// Music layers, pooled sounds and the per-frame scheduler
pub struct AudioManager<P: ResourceProvider> {
    provider: P,
    settings: SettingsStore,
    config: AudioConfig,
    cascade: VolumeCascade,
    layers: LayerStack,
    pool: SoundPool,
    music: Option<AudioDescriptor>,
    current_voice: Option<SoundKey>,
    decode_tx: Sender<DecodeOutcome>,
    decode_rx: Receiver<DecodeOutcome>,
    pending: HashMap<BufferId, PendingDecode>,
    rng: StdRng,
}

impl<P: ResourceProvider> AudioManager<P> {
    /// Create a new audio manager
    pub fn new(provider: P, settings: SettingsStore, config: AudioConfig) -> Self {
        let (decode_tx, decode_rx) = unbounded();
        let cascade = VolumeCascade::new(&settings);
        let layers = LayerStack::new(config.layer_count);

        tracing::debug!("Audio manager ready with {} music layers", config.layer_count);

        Self {
            provider,
            settings,
            config,
            cascade,
            layers,
            pool: SoundPool::new(),
            music: None,
            current_voice: None,
            decode_tx,
            decode_rx,
            pending: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a fixed seed for the ambient scheduler
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn cascade(&self) -> &VolumeCascade {
        &self.cascade
    }

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    pub fn layer(&self, layer: usize) -> Option<&AudioLayer> {
        self.layers.layer(layer)
    }

    pub fn pool(&self) -> &SoundPool {
        &self.pool
    }

    /// Track last set through `change_music`
    pub fn music(&self) -> Option<&AudioDescriptor> {
        self.music.as_ref()
    }

    /// Reference most recently started as a voice line
    pub fn current_voice(&self) -> Option<&SoundReference> {
        self.pool.get(self.current_voice.as_ref()?)
    }

    pub fn current_voice_key(&self) -> Option<&SoundKey> {
        self.current_voice.as_ref()
    }

    /// Number of buffers with sound requests waiting on their decode
    pub fn pending_decodes(&self) -> usize {
        self.pending.len()
    }

    // ---------------------------------------------------------------------
    // Music
    // ---------------------------------------------------------------------

    /// Play a track on a layer, replacing whatever the layer held
    ///
    /// An empty name silences the layer but is still recorded, so the silence
    /// survives a save and restore.
    pub fn play_music(
        &mut self,
        music: impl Into<AudioArg>,
        options: MusicOptions,
    ) -> Result<(), PlaybackSkipped> {
        let request = MusicRequest::resolve(music.into(), options);
        let layer = request.layer;
        if !self.layers.contains_layer(layer) {
            tracing::debug!("Music skipped: layer {} out of range", layer);
            return Err(PlaybackSkipped::InvalidLayer(layer));
        }

        self.layers.dispose(layer);
        self.layers.record(
            layer,
            AudioLayer {
                track_name: Some(request.name.clone()).filter(|n| !n.is_empty()),
                base_volume: request.volume,
                base_rate: request.rate,
                fade_in_frames: request.fade_in_frames,
                playing: true,
                loop_params: None,
            },
        );

        let volume = self.cascade.apply(AudioScope::Music, request.volume);
        if request.name.is_empty() {
            tracing::info!("Music layer {} silenced", layer);
            return Ok(());
        }

        let handle = self.acquire_stream(&request.name)?;
        {
            let mut buffer = handle.borrow_mut();
            buffer.set_volume(volume);
            buffer.set_playback_rate(request.rate / 100.0);
            buffer.set_looping(request.looping);
            buffer.play(request.fade_in_frames);
        }
        self.layers.attach(
            layer,
            ActiveEntry {
                handle,
                layer,
                base_volume: request.volume,
                ambient: None,
            },
        );

        tracing::info!(
            "Playing music '{}' on layer {} (volume {:.2}, fade in {} frames)",
            request.name,
            layer,
            volume,
            request.fade_in_frames
        );
        Ok(())
    }

    /// Play a track as an ambient loop with randomized re-fades
    ///
    /// Playback starts silent; the scheduler owns every fade from then on.
    pub fn play_music_random(
        &mut self,
        music: impl Into<AudioArg>,
        options: AmbientOptions,
    ) -> Result<(), PlaybackSkipped> {
        let request = MusicRequest::resolve(
            music.into(),
            MusicOptions::on_layer(options.layer).with_fade_in(options.fade_frames),
        );
        let layer = request.layer;
        if !self.layers.contains_layer(layer) {
            tracing::debug!("Ambient music skipped: layer {} out of range", layer);
            return Err(PlaybackSkipped::InvalidLayer(layer));
        }

        self.layers.dispose(layer);
        self.cascade.apply(AudioScope::Music, request.volume);
        if request.name.is_empty() {
            return Ok(());
        }

        let handle = self.acquire_stream(&request.name)?;
        let duration_frames = {
            let mut buffer = handle.borrow_mut();
            buffer.set_volume(0.0);
            buffer.set_playback_rate(request.rate / 100.0);
            buffer.set_looping(true);
            buffer.play(0);
            seconds_to_frames(buffer.duration()).floor() as i64
        };

        let params = AmbientLoopParams::new(
            options.fade_frames,
            options.play_time_range,
            options.play_range_window,
            duration_frames,
            &mut self.rng,
        );

        self.layers.record(
            layer,
            AudioLayer {
                track_name: Some(request.name.clone()),
                base_volume: request.volume,
                base_rate: request.rate,
                fade_in_frames: options.fade_frames,
                playing: true,
                loop_params: Some(params.clone()),
            },
        );
        self.layers.attach(
            layer,
            ActiveEntry {
                handle,
                layer,
                base_volume: request.volume,
                ambient: Some(params),
            },
        );

        tracing::info!(
            "Playing ambient loop '{}' on layer {} ({} frames long)",
            request.name,
            layer,
            duration_frames
        );
        Ok(())
    }

    /// Fade out a layer, keeping its buffer so it can be resumed
    pub fn stop_music(&mut self, fade_out_frames: u32, layer: usize) {
        if let Some(handle) = self.layers.buffer(layer) {
            handle.borrow_mut().stop(fade_out_frames);
        }
        if let Some(entry) = self.layers.entry_mut(layer) {
            entry.ambient = None;
        }
        if let Some(meta) = self.layers.layer_mut(layer) {
            // A resumed layer plays straight through, so it saves as plain music
            meta.loop_params = None;
            if meta.playing {
                tracing::info!("Stopping music layer {} ({} frames)", layer, fade_out_frames);
            }
            meta.playing = false;
        }
    }

    pub fn stop_all_music(&mut self, fade_out_frames: u32) {
        for layer in 0..self.layers.len() {
            self.stop_music(fade_out_frames, layer);
        }
    }

    /// Resume a stopped layer; no-op if it is empty or already playing
    pub fn resume_music(&mut self, fade_in_frames: u32, layer: usize) {
        let Some(handle) = self.layers.buffer(layer) else {
            return;
        };
        if handle.borrow().is_playing() {
            return;
        }
        handle.borrow_mut().resume(fade_in_frames);
        let music = self.cascade.general(AudioScope::Music);
        if let Some(entry) = self.layers.entry_mut(layer) {
            // A stopped ambient loop comes back as plain music
            if entry.ambient.is_none() {
                let volume = effective_volume(entry.base_volume, music);
                entry.handle.borrow_mut().set_volume(volume);
            }
        }
        if let Some(meta) = self.layers.layer_mut(layer) {
            meta.playing = true;
        }
        tracing::debug!("Resumed music layer {} ({} frames)", layer, fade_in_frames);
    }

    /// Stop and forget whatever a layer holds
    pub fn dispose_music(&mut self, layer: usize) {
        self.layers.dispose(layer);
    }

    /// Tear down the music buffers belonging to resources being unloaded
    pub fn dispose(&mut self, owned: &HashSet<BufferId>) -> usize {
        let count = self.layers.dispose_matching(owned);
        if count > 0 {
            tracing::debug!("Disposed {} music buffers", count);
        }
        count
    }

    /// Tear down every music layer
    pub fn dispose_all(&mut self) {
        self.layers.dispose_all();
        self.music = None;
    }

    /// Switch the main music track, or stop it with `None` or an empty name
    ///
    /// Requesting the track that is already playing does nothing.
    pub fn change_music(&mut self, music: Option<AudioDescriptor>) -> Result<(), PlaybackSkipped> {
        match music.filter(|m| !m.name.is_empty()) {
            Some(music) => {
                let unchanged = self
                    .music
                    .as_ref()
                    .map(|current| current.name == music.name)
                    .unwrap_or(false);
                if unchanged {
                    return Ok(());
                }
                self.play_music(&music, MusicOptions::default())?;
                self.music = Some(music);
                Ok(())
            }
            None => {
                self.stop_music(0, 0);
                self.music = None;
                Ok(())
            }
        }
    }

    fn acquire_stream(&mut self, name: &str) -> Result<BufferHandle, PlaybackSkipped> {
        let path = self.provider.resolve_path(AudioKind::Music, name);
        if path.is_empty() {
            return Err(PlaybackSkipped::EmptyPath);
        }
        self.provider.audio_stream(&path).ok_or_else(|| {
            tracing::warn!("Music resource not found: {}", path);
            PlaybackSkipped::MissingResource { path }
        })
    }

    // ---------------------------------------------------------------------
    // Sounds
    // ---------------------------------------------------------------------

    /// Play a sound effect, reusing an idle pooled reference when one exists
    pub fn play_sound(
        &mut self,
        sound: impl Into<AudioArg>,
        options: SoundOptions,
    ) -> Result<SoundStart, PlaybackSkipped> {
        let settings = self.settings.snapshot();
        if settings.preview_sound_disabled() {
            return Err(skip(PlaybackSkipped::PreviewDisabled));
        }

        let request = SoundRequest::resolve(sound.into(), options);
        if request.name.is_empty() {
            return Err(skip(PlaybackSkipped::MissingName));
        }
        if request.voice {
            if settings.preview.map(|p| p.voice_disabled).unwrap_or(false) {
                return Err(skip(PlaybackSkipped::PreviewDisabled));
            }
        } else if !settings.se_enabled {
            return Err(skip(PlaybackSkipped::SoundDisabled));
        }

        let path = self.provider.resolve_path(AudioKind::Sound, &request.name);
        if path.is_empty() {
            return Err(skip(PlaybackSkipped::EmptyPath));
        }

        if request.music_ducking {
            self.stop_music(0, 0);
        }

        self.pool.ensure(&request.name);
        let scope = AudioScope::for_reference(request.voice);
        let volume = self.cascade.apply(scope, request.volume);

        if let Some(key) = self.pool.find_idle(&request.name) {
            let config = self.reference_config(&request);
            let mut finished = None;
            if let Some(reference) = self.pool.get_mut(&key) {
                // Stopped since the last tick; its end action has not run yet
                finished = reference.take_finished();
                reference.start(config, volume);
            }
            tracing::debug!("Reusing sound reference {}", key);
            self.note_voice(&request, &key);
            // A ducking restart carries the same action forward
            if let Some(action) = finished.filter(|_| !request.music_ducking) {
                self.run_end_action(action);
            }
            return Ok(SoundStart::Reused(key));
        }

        let Some(handle) = self.provider.audio_buffer(&path) else {
            tracing::warn!("Sound resource not found: {}", path);
            return Err(PlaybackSkipped::MissingResource { path });
        };

        if handle.borrow().is_decoded() {
            let key = self.allocate_reference(&handle, &request);
            return Ok(SoundStart::Allocated(key));
        }

        let id = handle.id();
        match self.pending.entry(id) {
            Entry::Occupied(mut pending) => pending.get_mut().requests.push(request),
            Entry::Vacant(slot) => {
                slot.insert(PendingDecode {
                    handle: handle.clone(),
                    requests: vec![request],
                });
                tracing::debug!("Decoding {} for deferred playback", path);
                handle
                    .borrow_mut()
                    .decode(DecodeNotifier::new(id, self.decode_tx.clone()));
            }
        }
        Ok(SoundStart::Deferred(id))
    }

    /// Play a voice line
    pub fn play_voice(
        &mut self,
        voice: impl Into<AudioArg>,
        options: SoundOptions,
    ) -> Result<SoundStart, PlaybackSkipped> {
        self.play_sound(voice, options.voice())
    }

    /// Stop every reference of a sound
    pub fn stop_sound(&mut self, name: &str) {
        self.pool.stop(name);
    }

    pub fn stop_all_sounds(&mut self) {
        self.pool.stop_all();
    }

    fn reference_config(&self, request: &SoundRequest) -> ReferenceConfig {
        let on_end = request.music_ducking.then_some(EndAction::ResumeMusic {
            layer: 0,
            fade_in_frames: self.config.ducking_resume_fade_frames,
        });
        ReferenceConfig {
            base_volume: request.volume,
            base_rate: request.rate,
            voice: request.voice,
            looping: request.looping,
            on_end,
        }
    }

    fn allocate_reference(&mut self, handle: &BufferHandle, request: &SoundRequest) -> SoundKey {
        let scope = AudioScope::for_reference(request.voice);
        let volume = self.cascade.apply(scope, request.volume);
        let config = self.reference_config(request);

        let playback = handle.borrow().create_reference();
        let mut reference = SoundReference::new(handle.id(), playback, config);
        reference.start(config, volume);

        let key = self.pool.push(&request.name, reference);
        tracing::debug!("Allocated sound reference {}", key);
        self.note_voice(request, &key);
        key
    }

    fn note_voice(&mut self, request: &SoundRequest, key: &SoundKey) {
        if request.voice {
            self.current_voice = Some(key.clone());
        }
    }

    /// Run the continuations of every decode that has completed
    ///
    /// A failed decode drops its queued sounds; the next request for the
    /// buffer decodes it again. Returns the number of references started.
    pub fn pump_decodes(&mut self) -> usize {
        let mut started = 0;
        while let Ok(outcome) = self.decode_rx.try_recv() {
            let id = match outcome {
                DecodeOutcome::Finished(id) => id,
                DecodeOutcome::Failed(id) => {
                    if let Some(pending) = self.pending.remove(&id) {
                        tracing::warn!(
                            "Decode of buffer {} failed, dropping {} queued sounds",
                            id,
                            pending.requests.len()
                        );
                    }
                    continue;
                }
            };
            let Some(pending) = self.pending.remove(&id) else {
                continue;
            };
            tracing::debug!(
                "Buffer {} decoded, starting {} queued sounds",
                id,
                pending.requests.len()
            );
            for request in &pending.requests {
                self.allocate_reference(&pending.handle, request);
                started += 1;
            }
        }
        started
    }

    // ---------------------------------------------------------------------
    // Tick
    // ---------------------------------------------------------------------

    /// Advance one frame
    pub fn update(&mut self) {
        self.pump_decodes();

        let changes = self.cascade.refresh(&self.settings);
        let cascade = &self.cascade;
        let music_scope = cascade.general(AudioScope::Music);

        for entry in self.layers.active_mut().iter_mut() {
            let mut buffer = entry.handle.borrow_mut();
            let target = effective_volume(entry.base_volume, music_scope);

            if let Some(params) = entry.ambient.as_mut() {
                let remaining = seconds_to_frames(buffer.duration() - buffer.current_time());
                if let Some(cycle) = params.tick(remaining, target, &mut self.rng) {
                    buffer.begin_fade_cycle(cycle);
                }
            }

            // An ambient loop stays silent until its first cycle
            let silent_ambient = entry.ambient.is_some() && buffer.volume() <= 0.0;
            if changes.music && !silent_ambient {
                buffer.set_volume(target);
            }

            buffer.update();
        }

        let mut finished = Vec::new();
        for reference in self.pool.iter_mut() {
            let scope = reference.scope();
            if changes.contains(scope) {
                reference.set_volume(effective_volume(
                    reference.base_volume(),
                    cascade.general(scope),
                ));
            }
            reference.update();
            if let Some(action) = reference.take_finished() {
                finished.push(action);
            }
        }

        for action in finished {
            self.run_end_action(action);
        }
    }

    fn run_end_action(&mut self, action: EndAction) {
        match action {
            EndAction::ResumeMusic {
                layer,
                fade_in_frames,
            } => self.resume_music(fade_in_frames, layer),
        }
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Layers in save-game form
    pub fn dump_layers(&self) -> SavedLayers {
        SavedLayers(self.layers.dump())
    }

    /// Rebuild playing layers from a save game
    pub fn restore(&mut self, saved: &SavedLayers) {
        for (layer, saved) in saved.layers().iter().enumerate() {
            let Some(saved) = saved else {
                continue;
            };
            if !saved.playing {
                continue;
            }

            let descriptor = AudioDescriptor::new(saved.name.clone())
                .with_volume(saved.volume)
                .with_rate(saved.rate);
            let result = match &saved.custom_data {
                Some(params) => self.play_music_random(
                    descriptor,
                    AmbientOptions {
                        fade_frames: params.fade_frames,
                        layer,
                        play_time_range: params.play_time_range,
                        play_range_window: params.play_range_window,
                    },
                ),
                None => self.play_music(
                    descriptor,
                    MusicOptions::on_layer(layer).with_fade_in(saved.fade_in_time),
                ),
            };

            if let Err(reason) = result {
                tracing::warn!("Could not restore music layer {}: {}", layer, reason);
            }
        }
    }
}

fn skip(reason: PlaybackSkipped) -> PlaybackSkipped {
    tracing::debug!("Sound skipped: {}", reason);
    reason
}
