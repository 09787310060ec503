//! Session controller — drives one karaoke take from countdown to saved
//! recording.
//!
//! [`SessionController`] owns the playback clock, the capture session, the
//! countdown timer and the uploader, and serializes every transition on a
//! single event loop fed by one `tokio::sync::mpsc` channel.
//!
//! # Event flow
//!
//! ```text
//! SessionCommand::Start
//!   └─▶ acquire mic, load + prime playback, begin countdown   [Arming]
//!
//! CountdownEvent::Armed
//!   └─▶ playback.play(); capture.start()  (no await between) [Live]
//!         ⇄ TogglePause                                      [Paused]
//!
//! SessionCommand::Finish  /  end-of-track
//!   └─▶ intent = save, stop capture, freeze WAV,
//!       release mic, spawn upload                             [Finishing]
//!         ├─ Ok(id)  → notice Saved                           [Saved]
//!         └─ Err(e)  → take retained, RetrySave accepted      [Finishing]
//!
//! SessionCommand::Reset
//!   └─▶ intent = discard, stop both, discard buffer,
//!       release mic                                           [Idle]
//! ```
//!
//! Everything that happens asynchronously — countdown ticks, display ticks,
//! upload outcomes — re-enters through the same channel, so no two
//! transitions ever interleave.  The controller is **not** `Send` (the
//! playback clock owns platform audio handles), so it is driven with
//! `Runtime::block_on`, never `tokio::spawn`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::capture::{CaptureError, CaptureSession};
use crate::config::AppConfig;
use crate::countdown::{CountdownEvent, CountdownTimer};
use crate::lyrics::LyricsCursor;
use crate::playback::PlaybackClock;
use crate::track::Track;
use crate::upload::{ArtifactId, RecordingUploader, Take, UploadError};

use super::state::{new_shared_snapshot, SessionPhase, SharedSnapshot};

// ---------------------------------------------------------------------------
// SessionCommand
// ---------------------------------------------------------------------------

/// User-triggered commands.  A command that is not valid in the current
/// phase is rejected with a warning and no state change.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Begin a new take: acquire the microphone, warm up playback, count down.
    Start,
    /// Abort the countdown and return to `Idle` (valid in `Arming`).
    Cancel,
    /// Pause a `Live` take or resume a `Paused` one.
    TogglePause,
    /// Finish-and-save: stop both subsystems and submit the take.
    Finish,
    /// Finish-and-discard: stop both subsystems, throw the buffer away.
    Reset,
    /// Re-submit the retained take after a failed upload (valid in
    /// `Finishing`).
    RetrySave,
    /// Move the playback position (valid in `Idle` only — mid-take seeking
    /// would desynchronize the captured audio from the track).
    Seek(Duration),
    /// Tear down whatever is in flight, release hardware, and end the loop.
    /// Pending uploads are dropped, not awaited.
    Shutdown,
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// Everything the controller's event loop consumes.  Commands, countdown
/// progress, display ticks, and upload outcomes all arrive on the one
/// channel so transitions are fully serialized.
#[derive(Debug)]
pub enum SessionEvent {
    Command(SessionCommand),
    Countdown(CountdownEvent),
    /// Periodic display refresh from the ticker task.
    Tick,
    /// Outcome of a spawned upload, tagged with the take generation it was
    /// submitted for.  Outcomes from an abandoned generation are dropped.
    UploadDone(u64, Result<ArtifactId, UploadError>),
}

impl From<CountdownEvent> for SessionEvent {
    fn from(event: CountdownEvent) -> Self {
        SessionEvent::Countdown(event)
    }
}

impl From<SessionCommand> for SessionEvent {
    fn from(command: SessionCommand) -> Self {
        SessionEvent::Command(command)
    }
}

// ---------------------------------------------------------------------------
// SessionNotice
// ---------------------------------------------------------------------------

/// Broadcast notifications for external observers (e.g. other players that
/// should silence themselves when a take goes live).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// Playback and capture just started together.
    BecameLive,
    /// The take was uploaded; carries the artifact identifier.
    Saved(ArtifactId),
    /// Upload failed; the take is retained and `RetrySave` is accepted.
    SaveFailed(String),
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cloneable command sender for a running [`SessionController`].
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Queue a command.  Returns `false` when the controller has shut down.
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.tx.send(command.into()).await.is_ok()
    }

    /// Queue a command from outside the runtime (e.g. a stdin reader
    /// thread).  Must not be called from an async context.
    pub fn blocking_send(&self, command: SessionCommand) -> bool {
        self.tx.blocking_send(command.into()).is_ok()
    }
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Orchestrates one track's recording session.
///
/// Create with [`SessionController::new`], grab a [`SessionHandle`] and the
/// [`SharedSnapshot`], then drive it to completion with
/// [`run`](Self::run) on the current thread:
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use karaoke_session::capture::CaptureSession;
/// # use karaoke_session::config::AppConfig;
/// # use karaoke_session::session::{SessionCommand, SessionController};
/// # use karaoke_session::track::{Track, TrackSource};
/// # fn make_parts() -> (Box<dyn karaoke_session::playback::PlaybackClock>, CaptureSession, Arc<dyn karaoke_session::upload::RecordingUploader>) { unimplemented!() }
/// # async fn example() {
/// let (playback, capture, uploader) = make_parts();
/// let track = Track::new(1, "Song", TrackSource::Path("song.mp3".into()), None);
///
/// let controller = SessionController::new(track, playback, capture, uploader, AppConfig::default());
/// let handle = controller.handle();
///
/// let driver = async {
///     handle.send(SessionCommand::Start).await;
///     // … later …
///     handle.send(SessionCommand::Shutdown).await;
/// };
/// tokio::join!(controller.run(), driver);
/// # }
/// ```
pub struct SessionController {
    track: Track,
    playback: Box<dyn PlaybackClock>,
    capture: CaptureSession,
    countdown: CountdownTimer,
    uploader: Arc<dyn RecordingUploader>,
    config: AppConfig,
    snapshot: SharedSnapshot,
    cursor: LyricsCursor,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: mpsc::Receiver<SessionEvent>,
    notice_tx: broadcast::Sender<SessionNotice>,
    phase: SessionPhase,
    /// Save-or-discard, decided at the moment a stop is requested and read
    /// exactly once when the capture finalizes.
    save_intent: bool,
    /// The frozen take, retained until the upload succeeds so a failed
    /// submission never loses data.
    pending_take: Option<Arc<Take>>,
    upload_inflight: bool,
    /// Bumped whenever a pending submission is abandoned (new take, reset
    /// during `Finishing`).  An `UploadDone` carrying an older generation
    /// belongs to a discarded take and must not touch the current one.
    upload_generation: u64,
}

impl SessionController {
    /// Create a controller for one track.
    ///
    /// # Arguments
    ///
    /// * `track`    — the song to sing over, lyrics already parsed.
    /// * `playback` — instrumental playback engine (e.g. `RodioClock`).
    /// * `capture`  — microphone capture session.
    /// * `uploader` — recording persistence (e.g. `HttpUploader`).
    /// * `config`   — countdown and ticker settings.
    pub fn new(
        track: Track,
        playback: Box<dyn PlaybackClock>,
        capture: CaptureSession,
        uploader: Arc<dyn RecordingUploader>,
        config: AppConfig,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (notice_tx, _) = broadcast::channel(16);

        let snapshot = new_shared_snapshot();
        snapshot.lock().unwrap().track_title = Some(track.title.clone());

        Self {
            track,
            playback,
            capture,
            countdown: CountdownTimer::new(),
            uploader,
            config,
            snapshot,
            cursor: LyricsCursor::new(),
            event_tx,
            event_rx,
            notice_tx,
            phase: SessionPhase::Idle,
            save_intent: false,
            pending_take: None,
            upload_inflight: false,
            upload_generation: 0,
        }
    }

    /// Command sender for this controller.  Cheap to clone.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.event_tx.clone(),
        }
    }

    /// Read-only display snapshot, refreshed on every tick.
    pub fn snapshot(&self) -> SharedSnapshot {
        Arc::clone(&self.snapshot)
    }

    /// Subscribe to broadcast notices (`BecameLive`, `Saved`, `SaveFailed`).
    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notice_tx.subscribe()
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run the controller until [`SessionCommand::Shutdown`] arrives.
    ///
    /// Not `Send` — drive it with `Runtime::block_on` (or `tokio::join!` in
    /// tests), never `tokio::spawn`.
    pub async fn run(mut self) {
        self.spawn_ticker();

        while let Some(event) = self.event_rx.recv().await {
            match event {
                SessionEvent::Command(SessionCommand::Shutdown) => {
                    self.teardown();
                    break;
                }
                SessionEvent::Command(command) => self.handle_command(command),
                SessionEvent::Countdown(event) => self.handle_countdown(event),
                SessionEvent::Tick => self.handle_tick(),
                SessionEvent::UploadDone(generation, result) => {
                    self.handle_upload_done(generation, result)
                }
            }
        }

        log::info!("session: controller shut down");
    }

    /// Periodic display refresh.  The ticker holds a sender clone, so it
    /// exits once the controller (and with it the receiver) is dropped.
    fn spawn_ticker(&self) {
        let period = tick_period(self.config.session.tick_hz);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(SessionEvent::Tick).await.is_err() {
                    return;
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Command handlers
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start => self.handle_start(),
            SessionCommand::Cancel => self.handle_cancel(),
            SessionCommand::TogglePause => self.handle_toggle_pause(),
            SessionCommand::Finish => self.handle_finish(),
            SessionCommand::Reset => self.handle_reset(),
            SessionCommand::RetrySave => self.handle_retry_save(),
            SessionCommand::Seek(position) => self.handle_seek(position),
            SessionCommand::Shutdown => unreachable!("handled in run()"),
        }
    }

    /// `Start`: acquire mic → load + prime playback → begin countdown.
    ///
    /// Any failure on this path tears back down to `Idle` with the device
    /// released and a specific error message in the snapshot.
    fn handle_start(&mut self) {
        if self.phase.is_active() {
            log::warn!("session: Start rejected in {}", self.phase.label());
            return;
        }

        // Fresh take.  Any submission still in flight belongs to the old
        // one, so its generation is retired here.
        self.save_intent = false;
        self.pending_take = None;
        self.upload_inflight = false;
        self.upload_generation += 1;
        self.cursor.reset();
        {
            let mut snap = self.snapshot.lock().unwrap();
            snap.error_message = None;
            snap.artifact_id = None;
        }

        if let Err(e) = self.capture.acquire() {
            self.fail_to_idle(capture_error_message(&e));
            return;
        }

        match self.playback.load(&self.track.source) {
            Ok(duration) => self.track.duration = duration,
            Err(e) => {
                let _ = self.capture.release();
                self.fail_to_idle(format!("Could not load track audio: {e}"));
                return;
            }
        }
        self.playback.set_volume(self.config.playback.default_volume);

        if let Err(e) = self.playback.prime_output() {
            let _ = self.capture.release();
            self.fail_to_idle(format!("Could not prepare audio output: {e}"));
            return;
        }

        let ticks = self.config.countdown.ticks;
        let interval = Duration::from_millis(self.config.countdown.interval_ms);
        if let Err(e) = self.countdown.begin(ticks, interval, self.event_tx.clone()) {
            let _ = self.capture.release();
            self.fail_to_idle(format!("Could not start countdown: {e}"));
            return;
        }

        self.snapshot.lock().unwrap().countdown = Some(ticks);
        self.set_phase(SessionPhase::Arming);
    }

    /// `Cancel`: abort the countdown, release the mic, back to `Idle`.
    fn handle_cancel(&mut self) {
        if self.phase != SessionPhase::Arming {
            log::warn!("session: Cancel rejected in {}", self.phase.label());
            return;
        }
        self.countdown.cancel();
        let _ = self.playback.stop();
        let _ = self.capture.release();
        self.snapshot.lock().unwrap().countdown = None;
        self.set_phase(SessionPhase::Idle);
    }

    fn handle_toggle_pause(&mut self) {
        match self.phase {
            SessionPhase::Live => {
                let _ = self.playback.pause();
                let _ = self.capture.pause();
                self.set_phase(SessionPhase::Paused);
            }
            SessionPhase::Paused => {
                let _ = self.playback.play();
                let _ = self.capture.resume();
                self.set_phase(SessionPhase::Live);
            }
            _ => log::warn!("session: TogglePause rejected in {}", self.phase.label()),
        }
    }

    /// `Finish`: explicit finish-and-save.
    fn handle_finish(&mut self) {
        if !matches!(self.phase, SessionPhase::Live | SessionPhase::Paused) {
            log::warn!("session: Finish rejected in {}", self.phase.label());
            return;
        }
        self.begin_finish();
    }

    /// `Reset`: finish-and-discard from any non-terminal phase, always
    /// landing in `Idle` with the device released and no take produced.
    fn handle_reset(&mut self) {
        match self.phase {
            SessionPhase::Arming => {
                self.countdown.cancel();
                let _ = self.playback.stop();
                let _ = self.capture.release();
            }
            SessionPhase::Live | SessionPhase::Paused => {
                // Intent decided before the stop is issued.
                self.save_intent = false;
                let _ = self.playback.stop();
                let _ = self.capture.stop();
                self.capture.discard();
                let _ = self.capture.release();
            }
            SessionPhase::Finishing => {
                // Device is already released; drop the pending take and
                // retire its generation so a late outcome from its upload
                // is ignored on arrival.
                self.pending_take = None;
                self.upload_inflight = false;
                self.upload_generation += 1;
            }
            SessionPhase::Idle | SessionPhase::Saved | SessionPhase::Discarded => {}
        }

        self.cursor.reset();
        {
            let mut snap = self.snapshot.lock().unwrap();
            snap.countdown = None;
            snap.error_message = None;
            snap.artifact_id = None;
            snap.position = Duration::ZERO;
            snap.lyric_index = None;
        }
        self.set_phase(SessionPhase::Idle);
    }

    /// `RetrySave`: re-submit the retained take after a failed upload.
    fn handle_retry_save(&mut self) {
        if self.phase != SessionPhase::Finishing || self.upload_inflight {
            log::warn!("session: RetrySave rejected in {}", self.phase.label());
            return;
        }
        let Some(take) = self.pending_take.clone() else {
            log::warn!("session: RetrySave with no retained take");
            return;
        };
        self.snapshot.lock().unwrap().error_message = None;
        self.submit_take(take);
    }

    /// `Seek`: preview positioning, `Idle` only.
    fn handle_seek(&mut self, position: Duration) {
        if self.phase != SessionPhase::Idle {
            log::warn!("session: Seek rejected in {}", self.phase.label());
            return;
        }
        if let Err(e) = self.playback.seek(position) {
            log::warn!("session: seek failed: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Countdown / tick / upload handlers
    // -----------------------------------------------------------------------

    fn handle_countdown(&mut self, event: CountdownEvent) {
        if self.phase != SessionPhase::Arming {
            // Stale event from a countdown cancelled after it fired.
            return;
        }
        match event {
            CountdownEvent::Tick(remaining) => {
                self.snapshot.lock().unwrap().countdown = Some(remaining);
            }
            CountdownEvent::Armed => self.go_live(),
        }
    }

    /// Arming → Live.  `play()` and `start()` are issued back-to-back with
    /// no await between them, so the skew between the track and the captured
    /// take is bounded by one synchronization step.
    fn go_live(&mut self) {
        if let Err(e) = self.playback.play() {
            let _ = self.capture.release();
            self.fail_to_idle(format!("Could not start playback: {e}"));
            return;
        }
        if let Err(e) = self.capture.start() {
            let _ = self.playback.stop();
            let _ = self.capture.release();
            self.fail_to_idle(capture_error_message(&e));
            return;
        }

        self.snapshot.lock().unwrap().countdown = None;
        self.set_phase(SessionPhase::Live);
        let _ = self.notice_tx.send(SessionNotice::BecameLive);
    }

    /// Display refresh: position, active lyric, mic level, end-of-track.
    fn handle_tick(&mut self) {
        // Natural end of the track during a take is an implicit
        // finish-and-save, whether the user happens to be paused or not.
        if matches!(self.phase, SessionPhase::Live | SessionPhase::Paused)
            && self.playback.is_finished()
        {
            log::info!("session: track finished, auto-saving take");
            self.begin_finish();
            return;
        }

        let position = self.playback.position();
        let lyric_index = self
            .cursor
            .advance(&self.track.lyrics, position.as_secs_f64());

        let mut snap = self.snapshot.lock().unwrap();
        snap.position = position;
        snap.duration = self.playback.duration().or(self.track.duration);
        snap.lyric_index = lyric_index;
        snap.mic_level = self.capture.level();
    }

    fn handle_upload_done(&mut self, generation: u64, result: Result<ArtifactId, UploadError>) {
        if generation != self.upload_generation {
            // Outcome of a take that was reset away while its upload ran.
            log::debug!("session: ignoring upload outcome for retired take");
            return;
        }
        if self.phase != SessionPhase::Finishing {
            log::debug!("session: ignoring upload outcome in {}", self.phase.label());
            return;
        }
        self.upload_inflight = false;

        match result {
            Ok(artifact_id) => {
                log::info!("session: take saved as {artifact_id}");
                self.pending_take = None;
                self.snapshot.lock().unwrap().artifact_id = Some(artifact_id.clone());
                self.set_phase(SessionPhase::Saved);
                let _ = self.notice_tx.send(SessionNotice::Saved(artifact_id));
            }
            Err(e) => {
                // Take stays retained; RetrySave is accepted from here.
                let message = format!("Could not save recording: {e}");
                log::error!("session: {message}");
                self.snapshot.lock().unwrap().error_message = Some(message.clone());
                let _ = self.notice_tx.send(SessionNotice::SaveFailed(message));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Finish / teardown
    // -----------------------------------------------------------------------

    /// Shared by explicit `Finish` and natural end-of-track: freeze the
    /// buffer, release the device, submit the take.
    fn begin_finish(&mut self) {
        // Intent is set before the stop so the finalize step below never has
        // to infer it from surrounding state.
        self.save_intent = true;
        let _ = self.playback.stop();
        if let Err(e) = self.capture.stop() {
            let _ = self.capture.release();
            self.fail_to_idle(capture_error_message(&e));
            return;
        }
        self.set_phase(SessionPhase::Finishing);
        self.finalize_capture();
    }

    /// Capture is finalized; read the intent once and act on it.
    fn finalize_capture(&mut self) {
        if !self.save_intent {
            self.capture.discard();
            let _ = self.capture.release();
            self.set_phase(SessionPhase::Discarded);
            return;
        }

        let wav = match self.capture.frozen_wav() {
            Ok(wav) => wav,
            Err(e) => {
                let _ = self.capture.release();
                self.fail_to_idle(capture_error_message(&e));
                return;
            }
        };
        let _ = self.capture.release();

        let take = Arc::new(Take::new(self.track.id, wav));
        self.pending_take = Some(Arc::clone(&take));
        self.submit_take(take);
    }

    /// Submit on a background task; the outcome re-enters the event loop as
    /// `UploadDone`, so `Finishing` stays responsive to `Reset` / `Shutdown`.
    fn submit_take(&mut self, take: Arc<Take>) {
        self.upload_inflight = true;
        let generation = self.upload_generation;
        let uploader = Arc::clone(&self.uploader);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = uploader.submit(&take).await;
            let _ = tx.send(SessionEvent::UploadDone(generation, result)).await;
        });
    }

    /// External disposal: same teardown as `Reset`, from any phase — but it
    /// only releases hardware, it never waits for a pending save.
    fn teardown(&mut self) {
        self.countdown.cancel();
        self.save_intent = false;
        let _ = self.playback.stop();
        if self.capture.is_acquired() {
            let _ = self.capture.stop();
            self.capture.discard();
            let _ = self.capture.release();
        }
        self.pending_take = None;
        if self.phase.is_active() {
            self.set_phase(SessionPhase::Discarded);
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            log::info!("session: {} → {}", self.phase.label(), phase.label());
        }
        self.phase = phase.clone();
        self.snapshot.lock().unwrap().phase = phase;
    }

    fn fail_to_idle(&mut self, message: String) {
        log::error!("session: {message}");
        {
            let mut snap = self.snapshot.lock().unwrap();
            snap.error_message = Some(message);
            snap.countdown = None;
        }
        self.set_phase(SessionPhase::Idle);
    }
}

/// Display refresh period for a configured tick rate.
///
/// Position and lyric updates need at least 10 Hz to read as continuous, so
/// lower configured rates are raised to that floor.
fn tick_period(tick_hz: u32) -> Duration {
    Duration::from_millis((1_000 / u64::from(tick_hz.max(10))).max(1))
}

/// Specific, actionable messages for capture failures.
fn capture_error_message(error: &CaptureError) -> String {
    match error {
        CaptureError::PermissionDenied => {
            "Microphone access denied — allow microphone use and try again".into()
        }
        CaptureError::DeviceUnavailable(detail) => {
            format!("Microphone unavailable: {detail}")
        }
        other => format!("Capture failed: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
