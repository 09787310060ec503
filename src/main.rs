//! Application entry point — karaoke recording session.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Build the track from CLI arguments (audio file + optional lyrics
//!    JSON).
//! 4. Open the audio output ([`RodioClock`]) and microphone backend
//!    ([`CpalBackend`]).
//! 5. Spawn the stdin reader thread that turns typed commands into
//!    [`SessionCommand`]s.
//! 6. Spawn the status printer thread.
//! 7. `block_on` the session controller — it owns platform audio handles
//!    and must stay on this thread.
//!
//! # Commands
//!
//! ```text
//! start        begin the countdown and record a take
//! cancel       abort the countdown
//! pause        pause / resume the take
//! finish       stop and save the take
//! reset        stop and discard the take
//! retry        re-submit a failed save
//! seek <secs>  preview position (idle only)
//! quit         release hardware and exit
//! ```

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use karaoke_session::{
    capture::{CaptureBackend, CaptureSession, CpalBackend},
    config::AppConfig,
    playback::RodioClock,
    session::{SessionCommand, SessionController, SessionPhase, SharedSnapshot},
    track::{Track, TrackSource},
    upload::{HttpUploader, RecordingUploader},
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load().context("failed to load settings")?;
    let track = track_from_args().context("failed to build track")?;
    log::info!("loaded track: {} ({} lyric lines)", track.title, track.lyrics.len());

    let playback = RodioClock::new().context("failed to open audio output")?;
    let capture = CaptureSession::with_level_decay(
        Arc::new(CpalBackend::with_device(config.capture.device.clone()))
            as Arc<dyn CaptureBackend>,
        config.capture.level_decay,
    );
    let uploader: Arc<dyn RecordingUploader> =
        Arc::new(HttpUploader::from_config(&config.upload));

    let controller = SessionController::new(track, Box::new(playback), capture, uploader, config);
    let handle = controller.handle();
    let snapshot = controller.snapshot();

    // ── stdin → commands ─────────────────────────────────────────────────
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let Some(command) = parse_command(line.trim()) else {
                eprintln!("unknown command: {line}");
                continue;
            };
            let quitting = command == SessionCommand::Shutdown;
            if !handle.blocking_send(command) || quitting {
                break;
            }
        }
        // stdin closed — tear the session down.
        let _ = handle.blocking_send(SessionCommand::Shutdown);
    });

    // ── status printer ───────────────────────────────────────────────────
    std::thread::spawn(move || print_status_loop(snapshot));

    // The rodio output stream is not Send, so the controller runs on this
    // thread rather than inside a spawned task.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(controller.run());

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// `karaoke-session <audio-file> [lyrics.json] [title]`
fn track_from_args() -> anyhow::Result<Track> {
    let mut args = std::env::args().skip(1);
    let Some(audio) = args.next() else {
        anyhow::bail!("usage: karaoke-session <audio-file> [lyrics.json] [title]");
    };

    let lyrics_json = args
        .next()
        .map(|path| std::fs::read_to_string(&path).context(format!("reading lyrics {path}")))
        .transpose()?;

    let title = args.next().unwrap_or_else(|| {
        std::path::Path::new(&audio)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".into())
    });

    Ok(Track::new(
        1,
        title,
        TrackSource::Path(audio.into()),
        lyrics_json.as_deref(),
    ))
}

fn parse_command(line: &str) -> Option<SessionCommand> {
    let mut words = line.split_whitespace();
    match words.next()? {
        "start" | "s" => Some(SessionCommand::Start),
        "cancel" | "c" => Some(SessionCommand::Cancel),
        "pause" | "p" => Some(SessionCommand::TogglePause),
        "finish" | "f" => Some(SessionCommand::Finish),
        "reset" | "r" => Some(SessionCommand::Reset),
        "retry" => Some(SessionCommand::RetrySave),
        "seek" => {
            let secs: u64 = words.next()?.parse().ok()?;
            Some(SessionCommand::Seek(Duration::from_secs(secs)))
        }
        "quit" | "q" => Some(SessionCommand::Shutdown),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Status line
// ---------------------------------------------------------------------------

/// Prints a one-line status twice a second until the controller drops the
/// snapshot's other owners… which it never does, so this thread lives until
/// process exit.
fn print_status_loop(snapshot: SharedSnapshot) {
    loop {
        std::thread::sleep(Duration::from_millis(500));
        let snap = snapshot.lock().unwrap().clone();

        let position = format_time(snap.position);
        let duration = snap
            .duration
            .map(format_time)
            .unwrap_or_else(|| "--:--".into());

        let mut line = format!("[{}] {position}/{duration}", snap.phase.label());
        if let Some(remaining) = snap.countdown {
            line.push_str(&format!("  countdown: {remaining}"));
        }
        if snap.phase == SessionPhase::Live {
            line.push_str(&format!("  mic: {:>3.0}%", snap.mic_level * 100.0));
        }
        if let Some(id) = &snap.artifact_id {
            line.push_str(&format!("  saved: {id}"));
        }
        if let Some(error) = &snap.error_message {
            line.push_str(&format!("  error: {error}"));
        }
        println!("{line}");
    }
}

fn format_time(d: Duration) -> String {
    let total = d.as_secs();
    format!("{}:{:02}", total / 60, total % 60)
}
