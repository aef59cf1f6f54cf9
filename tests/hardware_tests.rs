use std::sync::{Arc, Mutex};

use herald::config::{AuxDevice, CoordinatorConfig, SpeakerRef};
use herald::services::paging::client::{DeviceControl, HardwareError};
use herald::services::paging::orchestrator::{plan_ramp, PagingOrchestrator, RampOutcome, RampPlan};

#[derive(Clone, Default)]
struct MockDevice {
    calls: Arc<Mutex<Vec<String>>>,
    fail_zone_ready: bool,
    fail_speakers: bool,
}

impl MockDevice {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DeviceControl for MockDevice {
    async fn set_paging_zone(&self, zone: u32) -> Result<(), HardwareError> {
        self.record(format!("zone:{zone}"));
        Ok(())
    }

    async fn wait_for_zone_ready(&self, zone: u32, timeout_ms: u64) -> Result<(), HardwareError> {
        self.record(format!("ready:{zone}"));
        if self.fail_zone_ready {
            return Err(HardwareError::ZoneTimeout { zone, timeout_ms });
        }
        Ok(())
    }

    async fn set_speaker_volume(&self, id: &str, pct: u8) -> Result<(), HardwareError> {
        self.record(format!("vol:{id}:{pct}"));
        if self.fail_speakers {
            return Err(HardwareError::Request("volume refused".into()));
        }
        Ok(())
    }

    async fn control_aux_devices(&self, ids: &[String], on: bool) -> Result<(), HardwareError> {
        self.record(format!("aux:{}:{}", if on { "on" } else { "off" }, ids.join(",")));
        Ok(())
    }
}

fn cfg() -> CoordinatorConfig {
    CoordinatorConfig {
        speakers: vec![
            SpeakerRef { id: "s1".into() },
            SpeakerRef { id: "s2".into() },
        ],
        aux_devices: vec![
            AuxDevice {
                id: "amp".into(),
                auto_linked: true,
            },
            AuxDevice {
                id: "lamp".into(),
                auto_linked: false,
            },
        ],
        ..CoordinatorConfig::default()
    }
}

#[tokio::test]
async fn test_activation_sequence_is_strictly_ordered() {
    let device = MockDevice::default();
    let orch = PagingOrchestrator::new(device.clone(), cfg());

    orch.activate().await.expect("activation succeeds");

    // Zone first, readiness confirmed, then speakers, then only the
    // auto-linked aux device.
    assert_eq!(
        device.calls(),
        vec!["zone:1", "ready:1", "vol:s1:80", "vol:s2:80", "aux:on:amp"]
    );
}

#[tokio::test]
async fn test_activation_aborts_on_first_failure() {
    let device = MockDevice {
        fail_zone_ready: true,
        ..MockDevice::default()
    };
    let orch = PagingOrchestrator::new(device.clone(), cfg());

    let err = orch.activate().await.expect_err("readiness timed out");
    assert!(matches!(err, HardwareError::ZoneTimeout { zone: 1, .. }));

    // Nothing past the failed step was attempted.
    assert_eq!(device.calls(), vec!["zone:1", "ready:1"]);
}

#[tokio::test]
async fn test_deactivation_attempts_every_step_despite_failures() {
    let device = MockDevice {
        fail_speakers: true,
        ..MockDevice::default()
    };
    let orch = PagingOrchestrator::new(device.clone(), cfg());

    orch.deactivate().await;

    // Both speaker mutes fail, yet the zone restore still runs.
    assert_eq!(
        device.calls(),
        vec!["aux:off:amp", "vol:s1:0", "vol:s2:0", "zone:0"]
    );
}

#[test]
fn test_ramp_suppressed_during_day_hours() {
    let cfg = CoordinatorConfig::default();
    assert_eq!(plan_ramp(&cfg, 1_000, 12), RampOutcome::Jump(1.0));
    // Boundary: dayEnd is exclusive.
    assert!(matches!(plan_ramp(&cfg, 1_000, 20), RampOutcome::Ramp(_)));
}

#[test]
fn test_night_ramp_uses_night_duration() {
    let cfg = CoordinatorConfig::default();
    match plan_ramp(&cfg, 5_000, 23) {
        RampOutcome::Ramp(plan) => {
            assert_eq!(plan.from, 0.1);
            assert_eq!(plan.to, 1.0);
            assert_eq!(plan.start_ms, 5_000);
            assert_eq!(plan.duration_ms, 4_000);
        }
        other => panic!("expected ramp, got {other:?}"),
    }
}

#[test]
fn test_night_ramp_falls_back_to_playback_duration() {
    let cfg = CoordinatorConfig {
        night_ramp_duration: 0,
        ..CoordinatorConfig::default()
    };
    match plan_ramp(&cfg, 0, 2) {
        RampOutcome::Ramp(plan) => assert_eq!(plan.duration_ms, 2_000),
        other => panic!("expected ramp, got {other:?}"),
    }
}

#[test]
fn test_ramp_disabled_jumps_to_max() {
    let cfg = CoordinatorConfig {
        ramp_enabled: false,
        max_volume: 0.8,
        ..CoordinatorConfig::default()
    };
    assert_eq!(plan_ramp(&cfg, 0, 23), RampOutcome::Jump(0.8));
}

#[test]
fn test_day_window_wrapping_midnight() {
    let cfg = CoordinatorConfig {
        day_start_hour: 20,
        day_end_hour: 8,
        ..CoordinatorConfig::default()
    };
    assert_eq!(plan_ramp(&cfg, 0, 22), RampOutcome::Jump(1.0));
    assert_eq!(plan_ramp(&cfg, 0, 3), RampOutcome::Jump(1.0));
    assert!(matches!(plan_ramp(&cfg, 0, 12), RampOutcome::Ramp(_)));
}

#[test]
fn test_ramp_plan_interpolates_linearly() {
    let plan = RampPlan {
        from: 0.0,
        to: 1.0,
        start_ms: 1_000,
        duration_ms: 2_000,
    };
    assert_eq!(plan.gain_at(1_000), 0.0);
    assert_eq!(plan.gain_at(2_000), 0.5);
    assert_eq!(plan.gain_at(3_000), 1.0);
    assert_eq!(plan.gain_at(10_000), 1.0);
    assert!(!plan.done(2_999));
    assert!(plan.done(3_000));
}
