use tracing::{debug, info, warn};

use super::batch::Batch;
use super::event::CapturedChunk;
use crate::audio::chunker;
use crate::config::CoordinatorConfig;

/// How much silence is recorded into the reusable header template
/// immediately after capture starts.
const HEADER_TEMPLATE_MS: u64 = 200;

/// Owns the single long-lived capture session and slices its chunk stream
/// into batches. Between `start` and `abort` a destination batch exists
/// for every chunk the stream emits - capture precedes classification,
/// never the reverse.
#[derive(Debug)]
pub struct Segmenter {
    header: Option<Vec<u8>>,
    header_accum: Vec<CapturedChunk>,
    header_accum_ms: u64,
    sample_rate: u32,
    channels: u16,
    current: Option<Batch>,
    started: bool,
    aborted: bool,
}

impl Segmenter {
    pub fn new() -> Self {
        Self {
            header: None,
            header_accum: Vec::new(),
            header_accum_ms: 0,
            sample_rate: 0,
            channels: 0,
            current: None,
            started: false,
            aborted: false,
        }
    }

    /// Begins the one uninterrupted capture session. Chunks arriving
    /// before the header template is full go into the template, not a
    /// batch; everything after always has a destination batch.
    pub fn start(&mut self, sample_rate: u32, channels: u16) {
        debug_assert!(!self.started);
        self.started = true;
        self.sample_rate = sample_rate;
        self.channels = channels;
        info!(sample_rate, channels, "capture session started");
    }

    /// The only operation permitted to stop capture. Idempotent, terminal.
    pub fn abort(&mut self) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        self.current = None;
        info!("capture session aborted");
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn header_ready(&self) -> bool {
        self.header.is_some()
    }

    pub fn header(&self) -> Option<&[u8]> {
        self.header.as_deref()
    }

    /// Routes one captured chunk. Returns false while the chunk was
    /// absorbed into the header template rather than a batch.
    pub fn absorb(&mut self, chunk: CapturedChunk, now_ms: u64) -> bool {
        debug_assert!(self.started);
        if self.aborted {
            return false;
        }

        if self.header.is_none() {
            self.header_accum_ms += chunk.duration_ms;
            self.header_accum.push(chunk);
            if self.header_accum_ms >= HEADER_TEMPLATE_MS {
                self.build_header();
            }
            return false;
        }

        self.current
            .get_or_insert_with(|| Batch::new(now_ms))
            .append(chunk);
        true
    }

    fn build_header(&mut self) {
        let silence = self
            .header_accum
            .drain(..)
            .flat_map(|c| c.bytes.into_iter());
        match chunker::header_template(silence, self.sample_rate, self.channels) {
            Ok(header) => {
                debug!(len = header.len(), "header template captured");
                self.header = Some(header);
            }
            Err(e) => {
                // Fall back to a bare header so batches still carry a
                // decodable prefix.
                warn!("header template build failed: {e}");
                let empty =
                    chunker::header_template(std::iter::empty(), self.sample_rate, self.channels)
                        .unwrap_or_default();
                self.header = Some(empty);
            }
        }
    }

    pub fn current_duration_ms(&self) -> u64 {
        self.current.as_ref().map(|b| b.duration_ms).unwrap_or(0)
    }

    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_is_empty(&self) -> bool {
        self.current.as_ref().map(|b| b.is_empty()).unwrap_or(true)
    }

    /// Whether the current recording batch should complete under the
    /// duration policy: target reached (subject to the minimum), or the
    /// hard maximum exceeded.
    pub fn should_rotate(&self, cfg: &CoordinatorConfig) -> bool {
        let dur = self.current_duration_ms();
        if dur >= cfg.batch_duration_max {
            return true;
        }
        dur >= cfg.batch_duration && dur >= cfg.batch_duration_min
    }

    /// Whether the idle standby batch has outgrown its memory cap.
    pub fn over_idle_cap(&self, cfg: &CoordinatorConfig) -> bool {
        self.current_duration_ms() > cfg.idle_batch_cap
    }

    /// Completes the current batch (composing its standalone archive) and
    /// opens a fresh one so no chunk is ever homeless. Returns None if the
    /// current batch had no audio.
    pub fn rotate(&mut self, now_ms: u64) -> Option<Batch> {
        let batch = self.current.take();
        self.current = Some(Batch::new(now_ms));
        let mut batch = batch?;
        if batch.is_empty() {
            return None;
        }
        let header = self.header.as_deref().unwrap_or(&[]);
        batch.compose(header, now_ms);
        Some(batch)
    }

    /// Drops the current batch's contents and opens a fresh one.
    pub fn discard_restart(&mut self, now_ms: u64) {
        self.current = Some(Batch::new(now_ms));
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}
