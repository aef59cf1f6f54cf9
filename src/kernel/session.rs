use super::batch::Batch;

/// Top-level coordinator state. Exactly one is active at a time.
/// Playback ("PLAYING") is cross-cutting and tracked by the playback
/// timeline instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    Idle,
    Armed,
    Recording,
    TailGuard,
    Grace,
    Deactivating,
}

impl SystemState {
    pub fn label(&self) -> &'static str {
        match self {
            SystemState::Idle => "idle",
            SystemState::Armed => "armed",
            SystemState::Recording => "recording",
            SystemState::TailGuard => "tailguard",
            SystemState::Grace => "grace",
            SystemState::Deactivating => "deactivating",
        }
    }
}

/// One continuous validated audio episode: a maximal span of batches from
/// validation to finalized deactivation (or promotion into a successor).
#[derive(Debug)]
pub struct Session {
    pub id: u64,
    /// Playback generation this session was issued under.
    pub generation: u64,
    pub batches: Vec<Batch>,
    pub validated: bool,
    pub started_at: u64,
}

impl Session {
    pub fn new(id: u64, generation: u64, now_ms: u64) -> Self {
        Self {
            id,
            generation,
            batches: Vec::new(),
            validated: false,
            started_at: now_ms,
        }
    }
}

/// Archive unit handed to the upload pipeline when a session finalizes.
/// Kept in the queue even after a successful upload, for possible retry.
#[derive(Debug, Clone)]
pub struct CompletedSession {
    pub seq: u64,
    pub session_id: u64,
    pub bytes: Vec<u8>,
    pub mime: String,
    pub finished_at_ms: u64,
    pub uploaded: bool,
    pub upload_ref: Option<String>,
}
