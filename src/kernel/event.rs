use uuid::Uuid;

use crate::outputs::sink::DecodedAudio;

/// One opaque chunk from the capture compressor.
#[derive(Debug, Clone)]
pub struct CapturedChunk {
    pub bytes: Vec<u8>,
    pub duration_ms: u64,
}

/// Inputs to the coordinator. Completion notices from asynchronous
/// collaborators carry the session id / playback generation they were
/// issued under so stale results can be rejected.
#[derive(Debug, Clone)]
pub enum Event {
    Chunk(CapturedChunk),
    Level(f32),
    CaptureError(String),
    Activated {
        session_id: u64,
        outcome: Result<(), String>,
    },
    Deactivated {
        session_id: u64,
    },
    Decoded {
        generation: u64,
        batch_id: Uuid,
        outcome: Result<DecodedAudio, String>,
    },
    Uploaded {
        archive_seq: u64,
        outcome: Result<String, String>,
    },
}
