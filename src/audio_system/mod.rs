/// Audio system module
///
/// Layered music, pooled sound effects and voices, all driven by one
/// per-frame tick:
/// - Indexed music layers, each holding at most one track
/// - Ambient loops that re-fade themselves at random intervals
/// - Sound references reused as soon as they fall idle
/// - Volume cascade from user settings into every live buffer
///
/// ## Architecture
///
/// ```text
/// AudioManager<P: ResourceProvider>
///   ├── LayerStack      music slots + active buffer set
///   │     └── AmbientLoopParams (per ambient entry)
///   ├── SoundPool       name -> [SoundReference]
///   ├── VolumeCascade   cached scope volumes from SettingsStore
///   └── decode channel  deferred sound starts
///
/// Backends implement AudioBuffer / Playback:
///   ├── RodioProvider    output device
///   └── HeadlessProvider simulated transport
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// use novel_audio::audio_system::{AudioManager, HeadlessProvider, MusicOptions, SoundOptions};
///
/// let provider = HeadlessProvider::new().with_track("theme", 120.0);
/// let mut manager = AudioManager::new(provider, SettingsStore::default(), AudioConfig::default());
///
/// manager.play_music("theme", MusicOptions::on_layer(0).with_fade_in(30))?;
/// manager.play_sound("click", SoundOptions::default())?;
///
/// // Once per frame
/// manager.update();
/// ```
pub mod ambient;
pub mod args;
pub mod buffer;
pub mod cascade;
pub mod envelope;
pub mod headless;
pub mod layers;
pub mod manager;
pub mod persistence;
pub mod pool;
pub mod rodio_backend;
pub mod scope;

// Re-export commonly used types
pub use ambient::{AmbientLoopParams, FrameRange, FrameWindow, FRAME_MS};
pub use args::{AmbientOptions, AudioArg, AudioDescriptor, MusicOptions, SoundOptions};
pub use buffer::{
    AudioBuffer, AudioKind, BufferHandle, BufferId, DecodeNotifier, DecodeOutcome, FadeCycle,
    Playback, ResourceProvider,
};
pub use headless::{HeadlessBuffer, HeadlessProvider};
pub use layers::AudioLayer;
pub use manager::{AudioManager, SoundStart};
pub use persistence::{SavedLayer, SavedLayers};
pub use pool::{EndAction, SoundKey, SoundReference};
pub use rodio_backend::RodioProvider;
pub use scope::AudioScope;
