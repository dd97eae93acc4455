use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;

use novel_audio::audio_system::{
    AmbientOptions, AudioManager, FrameRange, FrameWindow, MusicOptions, RodioProvider,
    SoundOptions,
};
use novel_audio::{AppResult, AudioConfig, SettingsStore};

/// Initialize tracing with file rotation
///
/// Logs are written to `<config dir>/NovelAudio/logs/`, one file per day
/// (novel-audio.YYYY-MM-DD.log). Debug builds also log to the console.
fn initialize_tracing() {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = dirs::config_dir()
        .map(|dir| dir.join("NovelAudio").join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "novel-audio.log");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
}

/// Command-line arguments for novel-audio-player
#[derive(Parser, Debug)]
#[command(name = "novel-audio-player")]
#[command(about = "Play a track through the scene audio manager")]
#[command(version)]
struct Args {
    /// Track name or path, resolved against the configured music directory
    track: String,

    /// Loop the track as an ambient layer with random re-fades
    #[arg(long)]
    ambient: bool,

    /// Sound effect to play over the music, ducking it
    #[arg(long)]
    sound: Option<String>,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,
}

fn main() -> AppResult<()> {
    initialize_tracing();
    tracing::info!("Starting novel-audio-player v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = AudioConfig::load().context("failed to load audio config")?;
    tracing::info!("Config: {}", AudioConfig::config_path_display());

    let provider = RodioProvider::new(&config).context("failed to open audio output")?;
    let frame = Duration::from_secs_f64(1.0 / f64::from(config.frames_per_second));
    let mut manager = AudioManager::new(provider, SettingsStore::default(), config);

    let started = if args.ambient {
        manager.play_music_random(
            args.track.as_str(),
            AmbientOptions {
                fade_frames: 90,
                layer: 0,
                play_time_range: FrameRange::new(300, 0),
                play_range_window: FrameWindow::new(60, 240),
            },
        )
    } else {
        manager.play_music(args.track.as_str(), MusicOptions::default().with_fade_in(60))
    };
    if let Err(reason) = started {
        anyhow::bail!("could not play '{}': {}", args.track, reason);
    }

    if let Some(sound) = &args.sound {
        let options = SoundOptions::default().ducking();
        if let Err(reason) = manager.play_sound(sound.as_str(), options) {
            tracing::warn!("Sound '{}' skipped: {}", sound, reason);
        }
    }

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    loop {
        let tick = Instant::now();
        manager.update();

        if deadline.map(|d| tick >= d).unwrap_or(false) {
            break;
        }
        let music_playing = manager
            .layers()
            .buffer(0)
            .map(|h| h.borrow().is_playing())
            .unwrap_or(false);
        let sound_playing = args
            .sound
            .as_deref()
            .map(|name| manager.pool().references(name).iter().any(|r| r.is_playing()))
            .unwrap_or(false);
        if !music_playing && !sound_playing {
            break;
        }

        if let Some(rest) = frame.checked_sub(tick.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    manager.dispose_all();
    tracing::info!("Playback finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_only() {
        let args = Args::try_parse_from(["novel-audio-player", "theme"]).unwrap();
        assert_eq!(args.track, "theme");
        assert!(!args.ambient);
        assert_eq!(args.sound, None);
        assert_eq!(args.seconds, None);
    }

    #[test]
    fn test_all_flags() {
        let args = Args::try_parse_from([
            "novel-audio-player",
            "wind",
            "--ambient",
            "--sound",
            "sting",
            "--seconds",
            "30",
        ])
        .unwrap();
        assert_eq!(args.track, "wind");
        assert!(args.ambient);
        assert_eq!(args.sound.as_deref(), Some("sting"));
        assert_eq!(args.seconds, Some(30));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Args::try_parse_from(["novel-audio-player"]).is_err());
        assert!(Args::try_parse_from(["novel-audio-player", "theme", "--seconds", "soon"]).is_err());
        assert!(Args::try_parse_from(["novel-audio-player", "theme", "extra"]).is_err());
    }
}
