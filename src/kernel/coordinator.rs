use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::batch::BatchStatus;
use super::event::{CapturedChunk, Event};
use super::playback::PlaybackScheduler;
use super::segmenter::Segmenter;
use super::session::{Session, SystemState};
use super::upload::UploadQueue;
use crate::audio::chunker;
use crate::config::CoordinatorConfig;
use crate::outputs::sink::DecodedAudio;
use crate::services::paging::orchestrator::{plan_ramp, utc_hour, RampOutcome, RampPlan};

pub const ARCHIVE_MIME: &str = "audio/wav";

/// Work the driver executes on the coordinator's behalf. Asynchronous
/// effects carry the session id / playback generation they were issued
/// under; completion notices echo them back for staleness checks.
#[derive(Debug, Clone)]
pub enum SideEffect {
    Activate {
        session_id: u64,
        generation: u64,
    },
    Deactivate {
        session_id: u64,
    },
    Decode {
        generation: u64,
        batch_id: Uuid,
        archive: Vec<u8>,
    },
    Play {
        batch_id: Uuid,
        audio: DecodedAudio,
        start_ms: u64,
    },
    SetGain(f32),
    Upload {
        archive_seq: u64,
        bytes: Vec<u8>,
        mime: String,
    },
}

/// The session/batch coordinator: one owned struct holding the whole
/// state machine. `tick_step` is the pure core - it consumes drained
/// events plus the current monotonic time, mutates state, and returns
/// side effects. It never awaits.
pub struct Coordinator {
    pub receiver: mpsc::Receiver<Event>,
    cfg: CoordinatorConfig,
    pub state: SystemState,
    pub segmenter: Segmenter,
    pub playback: PlaybackScheduler,
    pub uploads: UploadQueue,
    session: Option<Session>,
    next_session_id: u64,
    generation: u64,
    hardware_active: bool,

    // Level-run tracking. `above_since` and `silence_since` are mutually
    // exclusive: each level sample sets one and clears the other.
    above_since: Option<u64>,
    silence_since: Option<u64>,
    last_level: f32,

    state_entered_at: u64,
    /// Set once the playback timeline has drained after tail-guard expiry.
    grace_started_at: Option<u64>,
    reactivation_attempts: u32,
    ramp: Option<RampPlan>,
    hour_source: fn() -> u32,
    aborted: bool,
}

impl Coordinator {
    pub fn new(receiver: mpsc::Receiver<Event>, cfg: CoordinatorConfig) -> Self {
        let playback = PlaybackScheduler::new(cfg.playback_enabled);
        Self {
            receiver,
            cfg,
            state: SystemState::Idle,
            segmenter: Segmenter::new(),
            playback,
            uploads: UploadQueue::new(),
            session: None,
            next_session_id: 0,
            generation: 0,
            hardware_active: false,
            above_since: None,
            silence_since: None,
            last_level: 0.0,
            state_entered_at: 0,
            grace_started_at: None,
            reactivation_attempts: 0,
            ramp: None,
            hour_source: utc_hour,
            aborted: false,
        }
    }

    /// Begins the capture session. Called exactly once by the driver once
    /// the capture stream's format is known.
    pub fn start(&mut self, sample_rate: u32, channels: u16) {
        self.segmenter.start(sample_rate, channels);
    }

    /// Full teardown. Idempotent and terminal; the only path that stops
    /// capture.
    pub fn abort(&mut self) -> Vec<SideEffect> {
        let mut effects = Vec::new();
        if self.aborted {
            return effects;
        }
        self.aborted = true;
        if self.hardware_active {
            if let Some(id) = self.session.as_ref().map(|s| s.id) {
                effects.push(SideEffect::Deactivate { session_id: id });
            }
            effects.push(SideEffect::SetGain(0.0));
            self.hardware_active = false;
        }
        self.segmenter.abort();
        self.playback.clear();
        self.uploads.clear();
        self.ramp = None;
        self.generation += 1;
        self.session = None;
        self.state = SystemState::Idle;
        info!("coordinator aborted");
        effects
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn current_session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reactivation_attempts(&self) -> u32 {
        self.reactivation_attempts
    }

    pub fn last_level(&self) -> f32 {
        self.last_level
    }

    /// Cross-cutting PLAYING sub-state.
    pub fn is_playing(&self, now_ms: u64) -> bool {
        !self.playback.drained(now_ms)
    }

    #[doc(hidden)]
    pub fn set_hour_source(&mut self, source: fn() -> u32) {
        self.hour_source = source;
    }

    /// One cooperative step: apply drained events, then run the timer and
    /// level-run evaluation for `now_ms`.
    pub fn tick_step(&mut self, events: Vec<Event>, now_ms: u64) -> Vec<SideEffect> {
        let mut effects = Vec::new();
        if self.aborted {
            return effects;
        }

        for event in events {
            match event {
                Event::Chunk(chunk) => self.handle_chunk(chunk, now_ms, &mut effects),
                Event::Level(level) => self.handle_level(level, now_ms),
                Event::CaptureError(e) => {
                    // Surfaced only; session state is unaffected beyond
                    // losing further chunks.
                    error!("capture error: {e}");
                }
                Event::Activated {
                    session_id,
                    outcome,
                } => self.on_activated(session_id, outcome, now_ms, &mut effects),
                Event::Deactivated { session_id } => {
                    self.on_deactivated(session_id, now_ms, &mut effects)
                }
                Event::Decoded {
                    generation,
                    batch_id,
                    outcome,
                } => self.on_decoded(generation, batch_id, outcome, now_ms, &mut effects),
                Event::Uploaded {
                    archive_seq,
                    outcome,
                } => self.uploads.complete(archive_seq, outcome, &mut effects),
            }
        }

        self.evaluate(now_ms, &mut effects);
        effects
    }

    fn handle_chunk(&mut self, chunk: CapturedChunk, now_ms: u64, effects: &mut Vec<SideEffect>) {
        if !self.segmenter.absorb(chunk, now_ms) {
            // Header-template phase; nothing to segment yet.
            return;
        }
        match self.state {
            SystemState::Recording => {
                if self.segmenter.should_rotate(&self.cfg) {
                    self.complete_current_batch(now_ms, effects);
                }
            }
            SystemState::Idle => {
                if self.segmenter.over_idle_cap(&self.cfg) {
                    debug!("standby batch over idle cap, restarting");
                    self.segmenter.discard_restart(now_ms);
                }
            }
            SystemState::Grace | SystemState::Deactivating => {
                // Standby batch; apply the cap only while the line is
                // silent so imminent promotion audio is never discarded.
                if self.above_since.is_none() && self.segmenter.over_idle_cap(&self.cfg) {
                    self.segmenter.discard_restart(now_ms);
                }
            }
            // Bounded by the sustain / tail-guard windows.
            SystemState::Armed | SystemState::TailGuard => {}
        }
    }

    fn handle_level(&mut self, level: f32, now_ms: u64) {
        self.last_level = level;
        if level >= self.cfg.audio_threshold {
            if self.above_since.is_none() {
                self.above_since = Some(now_ms);
            }
            self.silence_since = None;
        } else {
            self.above_since = None;
            if self.silence_since.is_none() {
                self.silence_since = Some(now_ms);
            }
        }
    }

    fn validated_above(&self, now_ms: u64) -> bool {
        self.above_since
            .map(|since| now_ms.saturating_sub(since) >= self.cfg.sustain_duration)
            .unwrap_or(false)
    }

    fn evaluate(&mut self, now_ms: u64, effects: &mut Vec<SideEffect>) {
        match self.state {
            SystemState::Idle => {
                if self.above_since.is_some() {
                    // Discard the standby batch and pre-buffer into a
                    // fresh one while the sustain timer runs.
                    self.segmenter.discard_restart(now_ms);
                    self.set_state(SystemState::Armed, now_ms);
                }
            }
            SystemState::Armed => match self.above_since {
                None => {
                    // Dipped below threshold before the sustain elapsed:
                    // validation failed, no residual batch.
                    self.segmenter.discard_restart(now_ms);
                    self.set_state(SystemState::Idle, now_ms);
                }
                Some(since) if now_ms.saturating_sub(since) >= self.cfg.sustain_duration => {
                    self.begin_session(now_ms, effects);
                }
                Some(_) => {}
            },
            SystemState::Recording => {
                if let Some(since) = self.silence_since {
                    if now_ms.saturating_sub(since) >= self.cfg.disable_delay {
                        self.complete_current_batch(now_ms, effects);
                        self.set_state(SystemState::TailGuard, now_ms);
                    }
                }
            }
            SystemState::TailGuard => {
                if self.validated_above(now_ms) {
                    // Renewed audio inside the window: same capture
                    // stream, hardware already active.
                    self.silence_since = None;
                    self.set_state(SystemState::Recording, now_ms);
                } else if now_ms.saturating_sub(self.state_entered_at)
                    >= self.cfg.tail_guard_duration
                {
                    // Window expired: the tail-guard batch held nothing
                    // worth keeping.
                    self.segmenter.discard_restart(now_ms);
                    self.grace_started_at = None;
                    self.set_state(SystemState::Grace, now_ms);
                }
            }
            SystemState::Grace => {
                if self.validated_above(now_ms) {
                    // Promotion: hardware stays active, no deactivation.
                    let id = self.current_session_id().unwrap_or(0);
                    info!(session_id = id, "session promoted during grace window");
                    self.silence_since = None;
                    self.set_state(SystemState::Recording, now_ms);
                } else {
                    match self.grace_started_at {
                        None => {
                            // The grace timer only starts once playback
                            // has drained.
                            if self.playback.drained(now_ms) {
                                self.grace_started_at = Some(now_ms);
                            }
                        }
                        Some(started)
                            if now_ms.saturating_sub(started)
                                >= self.cfg.post_playback_grace_duration =>
                        {
                            self.begin_deactivation(now_ms, effects);
                        }
                        Some(_) => {}
                    }
                }
            }
            SystemState::Deactivating => {
                if self.validated_above(now_ms)
                    && self.reactivation_attempts < self.cfg.max_reactivation_attempts
                {
                    self.reactivate(now_ms, effects);
                }
            }
        }

        if let Some(plan) = self.ramp {
            effects.push(SideEffect::SetGain(plan.gain_at(now_ms)));
            if plan.done(now_ms) {
                self.ramp = None;
            }
        }

        let done = self.playback.poll(now_ms);
        for (id, status) in done {
            self.set_batch_status(id, status);
        }
    }

    fn set_state(&mut self, to: SystemState, now_ms: u64) {
        if self.state == to {
            return;
        }
        info!(
            session_id = self.current_session_id().unwrap_or(0),
            from = self.state.label(),
            to = to.label(),
            "state transition"
        );
        self.state = to;
        self.state_entered_at = now_ms;
    }

    fn begin_session(&mut self, now_ms: u64, effects: &mut Vec<SideEffect>) {
        self.next_session_id += 1;
        self.generation += 1;
        let mut session = Session::new(self.next_session_id, self.generation, now_ms);
        session.validated = true;
        info!(session_id = session.id, "session validated");
        self.session = Some(session);
        self.playback.begin_session(self.cfg.playback_delay);
        self.hardware_active = false;
        effects.push(SideEffect::Activate {
            session_id: self.next_session_id,
            generation: self.generation,
        });
        self.silence_since = None;
        self.set_state(SystemState::Recording, now_ms);
    }

    /// Completes the current batch, enqueues it to playback, and records
    /// it on the session.
    fn complete_current_batch(&mut self, now_ms: u64, effects: &mut Vec<SideEffect>) {
        let Some(mut batch) = self.segmenter.rotate(now_ms) else {
            return;
        };
        let archive = batch.archive().map(|a| a.to_vec()).unwrap_or_default();
        batch.status = self
            .playback
            .enqueue(batch.id, archive, self.generation, effects);
        match self.session.as_mut() {
            Some(session) => session.batches.push(batch),
            None => warn!(batch_id = %batch.id, "completed batch without a session"),
        }
    }

    fn on_activated(
        &mut self,
        session_id: u64,
        outcome: Result<(), String>,
        now_ms: u64,
        effects: &mut Vec<SideEffect>,
    ) {
        if self.current_session_id() != Some(session_id) {
            info!(session_id, "dropping stale activation notice");
            return;
        }
        match outcome {
            Ok(()) => {
                self.hardware_active = true;
                info!(session_id, "hardware active");
                match plan_ramp(&self.cfg, now_ms, (self.hour_source)()) {
                    RampOutcome::Jump(gain) => effects.push(SideEffect::SetGain(gain)),
                    RampOutcome::Ramp(plan) => {
                        effects.push(SideEffect::SetGain(plan.from));
                        self.ramp = Some(plan);
                    }
                }
                self.playback.open_gate(self.generation, effects);
            }
            Err(e) => {
                // Fatal for the session: unknown hardware state. Archive
                // what was captured, tear down best-effort, go idle.
                error!(session_id, "hardware activation failed: {e}");
                if let Some(mut batch) = self.segmenter.rotate(now_ms) {
                    batch.status = BatchStatus::Complete;
                    if let Some(session) = self.session.as_mut() {
                        session.batches.push(batch);
                    }
                }
                self.playback.clear();
                self.begin_deactivation(now_ms, effects);
            }
        }
    }

    fn begin_deactivation(&mut self, now_ms: u64, effects: &mut Vec<SideEffect>) {
        let session_id = self.current_session_id().unwrap_or(0);
        self.hardware_active = false;
        self.ramp = None;
        effects.push(SideEffect::SetGain(0.0));
        effects.push(SideEffect::Deactivate { session_id });
        self.set_state(SystemState::Deactivating, now_ms);
    }

    fn on_deactivated(&mut self, session_id: u64, now_ms: u64, effects: &mut Vec<SideEffect>) {
        if self.state != SystemState::Deactivating
            || self.current_session_id() != Some(session_id)
        {
            info!(session_id, "dropping stale deactivation notice");
            return;
        }
        self.finalize_session(now_ms, effects);
        self.reactivation_attempts = 0;
        self.set_state(SystemState::Idle, now_ms);
    }

    /// Bounded emergency promotion out of DEACTIVATING: the superseded
    /// session's batches are enqueued for upload first, then a brand-new
    /// session re-runs activation.
    fn reactivate(&mut self, now_ms: u64, effects: &mut Vec<SideEffect>) {
        self.reactivation_attempts += 1;
        info!(
            attempts = self.reactivation_attempts,
            "qualifying audio during deactivation, reactivating"
        );
        self.finalize_session(now_ms, effects);
        self.begin_session(now_ms, effects);
    }

    /// Assembles the finished session's archive and hands it to the
    /// upload pipeline. Returns immediately; the upload itself is a
    /// background side effect.
    fn finalize_session(&mut self, now_ms: u64, effects: &mut Vec<SideEffect>) {
        let Some(session) = self.session.take() else {
            return;
        };
        // Supersede any in-flight asynchronous tails.
        self.generation += 1;
        if session.batches.iter().all(|b| b.is_empty()) {
            info!(session_id = session.id, "session finalized with no audio");
            return;
        }
        let header = self.segmenter.header().unwrap_or(&[]);
        let bytes = chunker::compose_archive(
            header,
            session.batches.iter().flat_map(|b| b.chunks()),
        );
        info!(
            session_id = session.id,
            batches = session.batches.len(),
            len = bytes.len(),
            "session finalized"
        );
        self.uploads
            .enqueue(session.id, bytes, ARCHIVE_MIME, now_ms, effects);
    }

    fn on_decoded(
        &mut self,
        generation: u64,
        batch_id: Uuid,
        outcome: Result<DecodedAudio, String>,
        now_ms: u64,
        effects: &mut Vec<SideEffect>,
    ) {
        if generation != self.generation {
            debug!(
                %batch_id,
                stale = generation,
                current = self.generation,
                "dropping stale decode result"
            );
            return;
        }
        if let Some((id, status)) =
            self.playback
                .on_decoded(batch_id, outcome, generation, now_ms, effects)
        {
            self.set_batch_status(id, status);
        }
    }

    fn set_batch_status(&mut self, batch_id: Uuid, status: BatchStatus) {
        if let Some(batch) = self
            .session
            .as_mut()
            .and_then(|s| s.batches.iter_mut().find(|b| b.id == batch_id))
        {
            batch.status = status;
        }
    }
}
