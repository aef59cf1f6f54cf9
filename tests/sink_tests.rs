use herald::outputs::sink::{conform, lead_in_samples, DecodedAudio};

fn mono_16k(ms: u64) -> DecodedAudio {
    DecodedAudio {
        samples: vec![0.25; (ms * 16) as usize],
        sample_rate: 16_000,
        channels: 1,
    }
}

#[test]
fn test_lead_in_realizes_playback_delay_on_empty_ring() {
    // Scheduled 2000ms out with nothing buffered: the whole delay
    // becomes silence samples, so sound starts at start_ms, not now.
    assert_eq!(lead_in_samples(2_500, 500, 0, 16_000, 1), 32_000);
    // Stereo doubles the sample count for the same gap.
    assert_eq!(lead_in_samples(2_500, 500, 0, 16_000, 2), 64_000);
}

#[test]
fn test_lead_in_zero_when_chaining_gaplessly() {
    // 600ms already buffered and the next batch scheduled exactly at
    // the ring's end: no padding.
    assert_eq!(lead_in_samples(1_600, 1_000, 9_600, 16_000, 1), 0);
    // Scheduled start already in the past: push immediately.
    assert_eq!(lead_in_samples(400, 1_000, 0, 16_000, 1), 0);
}

#[test]
fn test_lead_in_covers_partial_buffer_gap() {
    // 100ms buffered, start 300ms out: pad the missing 200ms.
    assert_eq!(lead_in_samples(1_300, 1_000, 1_600, 16_000, 1), 3_200);
}

#[test]
fn test_conform_passthrough_when_formats_match() {
    let audio = mono_16k(100);
    let out = conform(&audio, 16_000, 1);
    assert_eq!(out, audio.samples);
}

#[test]
fn test_conform_downmixes_channels_by_averaging() {
    let audio = DecodedAudio {
        samples: vec![0.2, 0.4, 0.2, 0.4],
        sample_rate: 16_000,
        channels: 2,
    };
    let out = conform(&audio, 16_000, 1);
    assert_eq!(out.len(), 2);
    for s in out {
        assert!((s - 0.3).abs() < 1e-6);
    }
}

#[test]
fn test_conform_fans_out_to_output_channels() {
    let audio = DecodedAudio {
        samples: vec![0.1, 0.2],
        sample_rate: 16_000,
        channels: 1,
    };
    let out = conform(&audio, 16_000, 2);
    assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
}

#[test]
fn test_conform_preserves_duration_across_rate_change() {
    // A 16kHz mono archive played on a 48kHz stereo output must drain
    // in its real duration, not six times faster.
    let audio = mono_16k(100);
    assert_eq!(audio.duration_ms(), 100);

    let out = conform(&audio, 48_000, 2);
    let out_ms = out.len() as u64 * 1_000 / (48_000 * 2);
    assert_eq!(out_ms, 100);
    assert_eq!(out.len(), 9_600);
    assert!(out.iter().all(|s| s.is_finite()));
}
