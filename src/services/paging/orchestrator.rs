use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use super::client::{DeviceControl, HardwareError};
use crate::config::CoordinatorConfig;

/// Sequences the external hardware calls around session boundaries.
/// Activation is strict (first failure aborts); deactivation is
/// best-effort and always attempts every remaining step.
#[derive(Clone)]
pub struct PagingOrchestrator<C> {
    client: C,
    cfg: CoordinatorConfig,
}

impl<C: DeviceControl> PagingOrchestrator<C> {
    pub fn new(client: C, cfg: CoordinatorConfig) -> Self {
        Self { client, cfg }
    }

    /// Activation sequence, each step logged and awaited before the next:
    /// zone switch, readiness poll, speaker volumes, aux power. The local
    /// gain ramp is driven by the coordinator tick, not here.
    pub async fn activate(&self) -> Result<(), HardwareError> {
        let zone = self.cfg.paging_device.active_zone;
        info!(zone, "hardware activation: switching paging zone");
        self.client.set_paging_zone(zone).await?;
        self.client
            .wait_for_zone_ready(zone, self.cfg.zone_ready_timeout)
            .await?;

        // Direct to target volume; no repeated network ramp calls.
        for spk in &self.cfg.speakers {
            info!(speaker = %spk.id, pct = self.cfg.target_volume, "hardware activation: speaker volume");
            self.client
                .set_speaker_volume(&spk.id, self.cfg.target_volume)
                .await?;
        }

        let aux = self.auto_linked_aux();
        if !aux.is_empty() {
            info!(count = aux.len(), "hardware activation: aux devices on");
            self.client.control_aux_devices(&aux, true).await?;
        }
        Ok(())
    }

    /// Deactivation mirrors activation in reverse. A failure at any step
    /// is logged and the remaining steps still run; teardown must always
    /// attempt to complete.
    pub async fn deactivate(&self) {
        let aux = self.auto_linked_aux();
        if !aux.is_empty() {
            info!(count = aux.len(), "hardware deactivation: aux devices off");
            if let Err(e) = self.client.control_aux_devices(&aux, false).await {
                warn!("aux teardown failed: {e}");
            }
        }

        for spk in &self.cfg.speakers {
            info!(speaker = %spk.id, "hardware deactivation: speaker muted");
            if let Err(e) = self.client.set_speaker_volume(&spk.id, 0).await {
                warn!(speaker = %spk.id, "speaker teardown failed: {e}");
            }
        }

        let zone = self.cfg.paging_device.idle_zone;
        info!(zone, "hardware deactivation: restoring idle zone");
        if let Err(e) = self.client.set_paging_zone(zone).await {
            warn!("zone teardown failed: {e}");
        }
    }

    fn auto_linked_aux(&self) -> Vec<String> {
        self.cfg
            .aux_devices
            .iter()
            .filter(|d| d.auto_linked)
            .map(|d| d.id.clone())
            .collect()
    }
}

/// Local playback-gain ramp on the output path. No network cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampPlan {
    pub from: f32,
    pub to: f32,
    pub start_ms: u64,
    pub duration_ms: u64,
}

impl RampPlan {
    pub fn gain_at(&self, now_ms: u64) -> f32 {
        if self.duration_ms == 0 || now_ms >= self.start_ms + self.duration_ms {
            return self.to;
        }
        let elapsed = now_ms.saturating_sub(self.start_ms) as f32;
        self.from + (self.to - self.from) * (elapsed / self.duration_ms as f32)
    }

    pub fn done(&self, now_ms: u64) -> bool {
        now_ms >= self.start_ms + self.duration_ms
    }
}

/// What the gain should do on activation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RampOutcome {
    /// Go straight to the target gain.
    Jump(f32),
    /// Ramp from start to max over the plan's duration.
    Ramp(RampPlan),
}

/// Decides the activation gain behavior: ramping can be disabled outright,
/// is suppressed during configured day hours, and uses the night duration
/// otherwise.
pub fn plan_ramp(cfg: &CoordinatorConfig, now_ms: u64, hour: u32) -> RampOutcome {
    if !cfg.ramp_enabled {
        return RampOutcome::Jump(cfg.max_volume);
    }
    let day = if cfg.day_start_hour <= cfg.day_end_hour {
        hour >= cfg.day_start_hour && hour < cfg.day_end_hour
    } else {
        // Window wraps midnight.
        hour >= cfg.day_start_hour || hour < cfg.day_end_hour
    };
    if day {
        return RampOutcome::Jump(cfg.max_volume);
    }
    let duration_ms = if cfg.night_ramp_duration > 0 {
        cfg.night_ramp_duration
    } else {
        cfg.playback_ramp_duration
    };
    RampOutcome::Ramp(RampPlan {
        from: cfg.start_volume,
        to: cfg.max_volume,
        start_ms: now_ms,
        duration_ms,
    })
}

/// Hour-of-day from the system UTC clock.
pub fn utc_hour() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    ((secs % 86_400) / 3_600) as u32
}
