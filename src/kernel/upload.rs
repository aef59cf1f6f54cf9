use tracing::{info, warn};

use super::coordinator::SideEffect;
use super::session::CompletedSession;

/// In-memory queue behind the non-blocking upload pipeline. Enqueueing
/// never blocks session finalization; one background upload is in flight
/// at a time and drains oldest-unuploaded first. A failure halts the
/// drain until the next enqueue re-kicks it.
#[derive(Debug, Default)]
pub struct UploadQueue {
    entries: Vec<CompletedSession>,
    next_seq: u64,
    in_flight: Option<u64>,
    halted: bool,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(
        &mut self,
        session_id: u64,
        bytes: Vec<u8>,
        mime: &str,
        now_ms: u64,
        effects: &mut Vec<SideEffect>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        info!(session_id, seq, len = bytes.len(), "session archive enqueued");
        self.entries.push(CompletedSession {
            seq,
            session_id,
            bytes,
            mime: mime.to_string(),
            finished_at_ms: now_ms,
            uploaded: false,
            upload_ref: None,
        });
        // A fresh enqueue is the manual-retry trigger after a halt.
        self.halted = false;
        self.kick(effects);
    }

    /// Starts the next upload if the worker is idle and not halted.
    pub fn kick(&mut self, effects: &mut Vec<SideEffect>) {
        if self.halted || self.in_flight.is_some() {
            return;
        }
        if let Some(entry) = self.entries.iter().find(|e| !e.uploaded) {
            self.in_flight = Some(entry.seq);
            effects.push(SideEffect::Upload {
                archive_seq: entry.seq,
                bytes: entry.bytes.clone(),
                mime: entry.mime.clone(),
            });
        }
    }

    pub fn complete(
        &mut self,
        seq: u64,
        outcome: Result<String, String>,
        effects: &mut Vec<SideEffect>,
    ) {
        if self.in_flight != Some(seq) {
            warn!(seq, "dropping stale upload result");
            return;
        }
        self.in_flight = None;
        match outcome {
            Ok(reference) => {
                if let Some(entry) = self.entries.iter_mut().find(|e| e.seq == seq) {
                    entry.uploaded = true;
                    entry.upload_ref = Some(reference.clone());
                }
                info!(seq, reference = %reference, "session archive uploaded");
                self.kick(effects);
            }
            Err(e) => {
                // Entry stays queued; the whole loop stops until the next
                // enqueue triggers a retry.
                warn!(seq, "upload failed, worker halted: {e}");
                self.halted = true;
            }
        }
    }

    pub fn entries(&self) -> &[CompletedSession] {
        &self.entries
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.in_flight = None;
        self.halted = false;
    }
}
