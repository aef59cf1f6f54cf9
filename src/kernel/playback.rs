use std::collections::VecDeque;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::batch::BatchStatus;
use super::coordinator::SideEffect;
use crate::outputs::sink::DecodedAudio;

/// Schedules completed batches for gapless sequential output on one
/// monotonic timeline. Decode is dispatched one batch at a time so the
/// queue drains strictly FIFO regardless of decode latency; the next
/// start time is max(now, end of the previously scheduled batch).
#[derive(Debug)]
pub struct PlaybackScheduler {
    enabled: bool,
    queue: VecDeque<QueuedBatch>,
    decode_in_flight: Option<Uuid>,
    /// Hardware activation must precede the first scheduled playback of a
    /// session; the gate stays closed until the activation notice lands.
    gated: bool,
    timeline_end_ms: u64,
    pending_delay_ms: u64,
    playing: Vec<(Uuid, u64)>,
}

#[derive(Debug)]
struct QueuedBatch {
    batch_id: Uuid,
    archive: Vec<u8>,
}

impl PlaybackScheduler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            queue: VecDeque::new(),
            decode_in_flight: None,
            gated: true,
            timeline_end_ms: 0,
            pending_delay_ms: 0,
            playing: Vec::new(),
        }
    }

    /// Resets per-session scheduling state. The timeline itself is shared
    /// and keeps advancing across sessions.
    pub fn begin_session(&mut self, delay_ms: u64) {
        self.gated = true;
        self.pending_delay_ms = delay_ms;
    }

    /// Called on hardware activation; releases queued batches to decode.
    pub fn open_gate(&mut self, generation: u64, effects: &mut Vec<SideEffect>) {
        self.gated = false;
        self.dispatch(generation, effects);
    }

    /// Enqueues a Ready batch. Returns the status the batch takes:
    /// `Queued` normally, `Complete` immediately when playback is off.
    pub fn enqueue(
        &mut self,
        batch_id: Uuid,
        archive: Vec<u8>,
        generation: u64,
        effects: &mut Vec<SideEffect>,
    ) -> BatchStatus {
        if !self.enabled {
            return BatchStatus::Complete;
        }
        self.queue.push_back(QueuedBatch { batch_id, archive });
        self.dispatch(generation, effects);
        BatchStatus::Queued
    }

    fn dispatch(&mut self, generation: u64, effects: &mut Vec<SideEffect>) {
        if self.gated || self.decode_in_flight.is_some() {
            return;
        }
        if let Some(front) = self.queue.front() {
            self.decode_in_flight = Some(front.batch_id);
            effects.push(SideEffect::Decode {
                generation,
                batch_id: front.batch_id,
                archive: front.archive.clone(),
            });
        }
    }

    /// Handles a decode completion. The caller has already verified the
    /// generation; a stale or unknown batch id is dropped here as well.
    pub fn on_decoded(
        &mut self,
        batch_id: Uuid,
        outcome: Result<DecodedAudio, String>,
        generation: u64,
        now_ms: u64,
        effects: &mut Vec<SideEffect>,
    ) -> Option<(Uuid, BatchStatus)> {
        if self.decode_in_flight != Some(batch_id) {
            debug!(%batch_id, "dropping decode result for superseded batch");
            return None;
        }
        self.decode_in_flight = None;
        let front = self.queue.pop_front()?;
        debug_assert_eq!(front.batch_id, batch_id);

        let status = match outcome {
            Ok(audio) => {
                let start = (now_ms + self.pending_delay_ms).max(self.timeline_end_ms);
                self.pending_delay_ms = 0;
                let end = start + audio.duration_ms();
                self.timeline_end_ms = end;
                self.playing.push((batch_id, end));
                info!(%batch_id, start, end, "batch scheduled");
                effects.push(SideEffect::Play {
                    batch_id,
                    audio,
                    start_ms: start,
                });
                BatchStatus::Playing
            }
            Err(e) => {
                // Best-effort: log, fail the batch, advance to the next.
                warn!(%batch_id, "decode failed: {e}");
                BatchStatus::Failed
            }
        };

        self.dispatch(generation, effects);
        Some((batch_id, status))
    }

    /// Advances Playing batches whose scheduled end has passed.
    pub fn poll(&mut self, now_ms: u64) -> Vec<(Uuid, BatchStatus)> {
        let mut done = Vec::new();
        self.playing.retain(|&(id, end)| {
            if end <= now_ms {
                done.push((id, BatchStatus::Complete));
                false
            } else {
                true
            }
        });
        done
    }

    /// True when nothing is queued, decoding, or still on the timeline.
    pub fn drained(&self, now_ms: u64) -> bool {
        self.queue.is_empty() && self.decode_in_flight.is_none() && now_ms >= self.timeline_end_ms
    }

    pub fn timeline_end_ms(&self) -> u64 {
        self.timeline_end_ms
    }

    /// Drops all queued work. In-flight decode results will be rejected by
    /// the generation guard when they land.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.decode_in_flight = None;
        self.playing.clear();
    }
}
