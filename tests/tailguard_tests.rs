use herald::config::CoordinatorConfig;
use herald::kernel::coordinator::{Coordinator, SideEffect};
use herald::kernel::event::{CapturedChunk, Event};
use herald::kernel::session::SystemState;
use herald::outputs::sink::DecodedAudio;
use tokio::sync::mpsc;

fn coordinator(cfg: CoordinatorConfig) -> (mpsc::Sender<Event>, Coordinator) {
    let (tx, rx) = mpsc::channel(100);
    let mut c = Coordinator::new(rx, cfg);
    c.start(16_000, 1);
    (tx, c)
}

fn chunk(ms: u64, fill: u8) -> Event {
    Event::Chunk(CapturedChunk {
        bytes: vec![fill; (ms * 32) as usize],
        duration_ms: ms,
    })
}

fn count_activates(effects: &[SideEffect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, SideEffect::Activate { .. }))
        .count()
}

fn count_deactivates(effects: &[SideEffect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, SideEffect::Deactivate { .. }))
        .count()
}

/// Drives a fresh coordinator into an active, hardware-confirmed session.
/// Validation lands at t=500, the activation notice at t=600; session
/// audio chunks carry fill byte 1.
fn to_active_session(c: &mut Coordinator) {
    c.tick_step(vec![chunk(100, 0), chunk(100, 0)], 0);
    assert!(c.segmenter.header_ready());

    c.tick_step(vec![Event::Level(12.0)], 0);
    for t in [100, 200, 300, 400] {
        c.tick_step(vec![Event::Level(12.0), chunk(100, 1)], t);
    }
    let effects = c.tick_step(vec![Event::Level(12.0), chunk(100, 1)], 500);
    assert_eq!(c.state, SystemState::Recording);
    assert_eq!(count_activates(&effects), 1);

    c.tick_step(
        vec![Event::Activated {
            session_id: 1,
            outcome: Ok(()),
        }],
        600,
    );
}

/// Continuous silence from t=700; the disable delay elapses at t=3700 and
/// the tail-guard window opens.
fn to_tail_guard(c: &mut Coordinator, tail_fill: u8) {
    for t in (700..3_700).step_by(100) {
        c.tick_step(vec![Event::Level(0.0), chunk(100, 1)], t);
        assert_eq!(c.state, SystemState::Recording);
    }
    c.tick_step(vec![Event::Level(0.0), chunk(100, 1)], 3_700);
    assert_eq!(c.state, SystemState::TailGuard);

    // Residual room noise keeps arriving during the window.
    for t in (3_800..4_000).step_by(100) {
        c.tick_step(vec![Event::Level(0.0), chunk(100, tail_fill)], t);
    }
}

#[tokio::test]
async fn test_silence_runs_full_deactivation_sequence() {
    let cfg = CoordinatorConfig {
        playback_enabled: false,
        ramp_enabled: false,
        ..CoordinatorConfig::default()
    };
    let (_tx, mut c) = coordinator(cfg);
    to_active_session(&mut c);
    to_tail_guard(&mut c, 9);

    // Tail guard expires 3000ms after it opened.
    for t in (4_000..6_700).step_by(100) {
        let effects = c.tick_step(vec![Event::Level(0.0), chunk(100, 9)], t);
        assert_eq!(c.state, SystemState::TailGuard);
        assert_eq!(count_deactivates(&effects), 0);
    }
    c.tick_step(vec![Event::Level(0.0)], 6_700);
    assert_eq!(c.state, SystemState::Grace);

    // Grace timer starts on the first evaluation with playback drained
    // (t=6800) and expires 750ms later.
    for t in [6_800, 6_900, 7_000, 7_500] {
        let effects = c.tick_step(vec![Event::Level(0.0)], t);
        assert_eq!(c.state, SystemState::Grace);
        assert_eq!(count_deactivates(&effects), 0);
    }
    let effects = c.tick_step(vec![Event::Level(0.0)], 7_600);
    assert_eq!(c.state, SystemState::Deactivating);
    assert_eq!(count_deactivates(&effects), 1);
    assert!(effects
        .iter()
        .any(|e| matches!(e, SideEffect::SetGain(g) if *g == 0.0)));

    // Hardware confirms teardown: the session is finalized and its
    // archive enqueued for upload. Tail-guard audio (fill 9) was
    // discarded at window expiry and never reaches the archive.
    let effects = c.tick_step(
        vec![Event::Deactivated { session_id: 1 }],
        7_700,
    );
    assert_eq!(c.state, SystemState::Idle);
    assert_eq!(c.current_session_id(), None);
    let upload = effects
        .iter()
        .find_map(|e| match e {
            SideEffect::Upload { bytes, .. } => Some(bytes),
            _ => None,
        })
        .expect("session archive upload");
    assert!(upload.iter().all(|&b| b != 9));
    assert!(upload.iter().any(|&b| b == 1));
}

#[tokio::test]
async fn test_tail_guard_revalidation_resumes_without_reactivation() {
    let cfg = CoordinatorConfig {
        playback_enabled: false,
        ramp_enabled: false,
        ..CoordinatorConfig::default()
    };
    let (_tx, mut c) = coordinator(cfg);
    to_active_session(&mut c);
    to_tail_guard(&mut c, 1);

    // Audio returns at t=4000 and sustains. Hardware never deactivated,
    // so recording resumes with no second activation and the same session.
    c.tick_step(vec![Event::Level(12.0), chunk(100, 1)], 4_000);
    for t in [4_100, 4_200, 4_300, 4_400] {
        let effects = c.tick_step(vec![Event::Level(12.0), chunk(100, 1)], t);
        assert_eq!(c.state, SystemState::TailGuard);
        assert_eq!(count_activates(&effects), 0);
    }
    let effects = c.tick_step(vec![Event::Level(12.0), chunk(100, 1)], 4_500);
    assert_eq!(c.state, SystemState::Recording);
    assert_eq!(count_activates(&effects), 0);
    assert_eq!(count_deactivates(&effects), 0);
    assert_eq!(c.current_session_id(), Some(1));
}

#[tokio::test]
async fn test_grace_timer_waits_for_playback_drain() {
    let cfg = CoordinatorConfig {
        ramp_enabled: false,
        ..CoordinatorConfig::default()
    };
    let (_tx, mut c) = coordinator(cfg);
    to_active_session(&mut c);

    // Silence completes the batch at t=3700; with playback on it is
    // queued and, the gate being open, sent to decode.
    for t in (700..3_700).step_by(100) {
        c.tick_step(vec![Event::Level(0.0), chunk(100, 1)], t);
    }
    let effects = c.tick_step(vec![Event::Level(0.0), chunk(100, 1)], 3_700);
    assert_eq!(c.state, SystemState::TailGuard);
    let batch_id = effects
        .iter()
        .find_map(|e| match e {
            SideEffect::Decode { batch_id, .. } => Some(*batch_id),
            _ => None,
        })
        .expect("decode dispatched");

    // Decode lands at t=3800 with five seconds of audio: scheduled
    // 3800..8800, well past tail-guard expiry at t=6700.
    let audio = DecodedAudio {
        samples: vec![0.0; 80_000],
        sample_rate: 16_000,
        channels: 1,
    };
    let effects = c.tick_step(
        vec![Event::Decoded {
            generation: c.generation(),
            batch_id,
            outcome: Ok(audio),
        }],
        3_800,
    );
    let start = effects
        .iter()
        .find_map(|e| match e {
            SideEffect::Play { start_ms, .. } => Some(*start_ms),
            _ => None,
        })
        .expect("playback scheduled");
    assert_eq!(start, 3_800);

    for t in (3_900..6_700).step_by(100) {
        c.tick_step(vec![Event::Level(0.0)], t);
    }
    c.tick_step(vec![Event::Level(0.0)], 6_700);
    assert_eq!(c.state, SystemState::Grace);
    assert!(c.is_playing(6_700));

    // While the timeline runs the grace timer never starts; deactivation
    // cannot fire even long past the nominal grace duration.
    for t in (6_800..8_800).step_by(100) {
        let effects = c.tick_step(vec![Event::Level(0.0)], t);
        assert_eq!(count_deactivates(&effects), 0);
    }

    // Timeline drains at t=8800; grace runs from there.
    c.tick_step(vec![Event::Level(0.0)], 8_800);
    assert!(!c.is_playing(8_800));
    for t in [9_000, 9_500] {
        let effects = c.tick_step(vec![Event::Level(0.0)], t);
        assert_eq!(c.state, SystemState::Grace);
        assert_eq!(count_deactivates(&effects), 0);
    }
    let effects = c.tick_step(vec![Event::Level(0.0)], 9_600);
    assert_eq!(c.state, SystemState::Deactivating);
    assert_eq!(count_deactivates(&effects), 1);
}
