use std::time::Instant;

/// Driver cadence for silence / tail-guard polling.
pub const POLL_MS: u64 = 100;
/// Output metering cadence.
pub const LEVEL_POLL_MS: u64 = 50;

/// Monotonic millisecond clock anchored at construction. The kernel only
/// ever sees `u64` milliseconds, so tests can feed synthetic times.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn start() -> Self {
        Clock { epoch: Instant::now() }
    }

    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
