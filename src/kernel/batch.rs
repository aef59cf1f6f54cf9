use uuid::Uuid;

use super::event::CapturedChunk;
use crate::audio::chunker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Recording,
    Ready,
    Queued,
    Playing,
    Complete,
    Failed,
}

/// A bounded-duration slice of captured audio. Chunks are append-only and
/// strictly time-ordered; the archive is composed exactly once, when the
/// batch leaves `Recording`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: Uuid,
    chunks: Vec<Vec<u8>>,
    archive: Option<Vec<u8>>,
    pub duration_ms: u64,
    pub status: BatchStatus,
    pub started_at: u64,
    pub ended_at: Option<u64>,
    pub error: Option<String>,
}

impl Batch {
    pub fn new(now_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            chunks: Vec::new(),
            archive: None,
            duration_ms: 0,
            status: BatchStatus::Recording,
            started_at: now_ms,
            ended_at: None,
            error: None,
        }
    }

    /// Appends a chunk. Only legal while the batch is recording.
    pub fn append(&mut self, chunk: CapturedChunk) {
        debug_assert_eq!(self.status, BatchStatus::Recording);
        self.duration_ms += chunk.duration_ms;
        self.chunks.push(chunk.bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Composes the standalone archive (header template + chunks) and moves
    /// the batch to `Ready`. Idempotence is intentionally not offered: a
    /// second compose is a logic error.
    pub fn compose(&mut self, header: &[u8], now_ms: u64) {
        debug_assert_eq!(self.status, BatchStatus::Recording);
        debug_assert!(self.archive.is_none());
        self.archive = Some(chunker::compose_archive(
            header,
            self.chunks.iter().map(|c| c.as_slice()),
        ));
        self.status = BatchStatus::Ready;
        self.ended_at = Some(now_ms);
    }

    pub fn archive(&self) -> Option<&[u8]> {
        self.archive.as_deref()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        self.chunks.iter().map(|c| c.as_slice())
    }

    pub fn fail(&mut self, reason: String) {
        debug_assert!(!matches!(
            self.status,
            BatchStatus::Complete | BatchStatus::Failed
        ));
        self.status = BatchStatus::Failed;
        self.error = Some(reason);
    }
}
