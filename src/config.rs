use serde::Deserialize;

/// Descriptor for the paging head-end the coordinator drives.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingDevice {
    pub host: String,
    /// Zone selected while a session is live.
    pub active_zone: u32,
    /// Zone the device rests on between sessions.
    pub idle_zone: u32,
}

impl Default for PagingDevice {
    fn default() -> Self {
        Self {
            host: "http://localhost:7000".to_string(),
            active_zone: 1,
            idle_zone: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxDevice {
    pub id: String,
    /// Auto-linked devices follow the paging device's active state.
    #[serde(default)]
    pub auto_linked: bool,
}

/// Full configuration surface of the coordinator. All durations are
/// milliseconds, volumes are 0.0-1.0 local gain or 0-100 percent for
/// networked speakers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoordinatorConfig {
    /// Level (0-100 RMS scale) that counts as audio.
    pub audio_threshold: f32,
    /// How long the level must stay at/above threshold to validate.
    pub sustain_duration: u64,

    pub batch_duration: u64,
    pub batch_duration_min: u64,
    pub batch_duration_max: u64,
    /// Memory cap on the idle standby batch before it is restarted.
    pub idle_batch_cap: u64,

    pub playback_enabled: bool,
    /// Offset applied to the first scheduled batch of a session.
    pub playback_delay: u64,

    /// Continuous silence before the current batch completes and the
    /// tail-guard window opens.
    pub disable_delay: u64,
    pub tail_guard_duration: u64,
    pub post_playback_grace_duration: u64,

    pub playback_ramp_duration: u64,
    pub start_volume: f32,
    pub max_volume: f32,
    pub ramp_enabled: bool,
    /// Day window (hours, 0-23) during which ramping is suppressed.
    pub day_start_hour: u32,
    pub day_end_hour: u32,
    pub night_ramp_duration: u64,

    /// Networked speaker volume, percent.
    pub target_volume: u8,
    pub zone_ready_timeout: u64,
    pub max_reactivation_attempts: u32,

    pub paging_device: PagingDevice,
    pub speakers: Vec<SpeakerRef>,
    pub aux_devices: Vec<AuxDevice>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            audio_threshold: 10.0,
            sustain_duration: 500,

            batch_duration: 5_000,
            batch_duration_min: 1_000,
            batch_duration_max: 10_000,
            idle_batch_cap: 3_000,

            playback_enabled: true,
            playback_delay: 0,

            disable_delay: 3_000,
            tail_guard_duration: 3_000,
            post_playback_grace_duration: 750,

            playback_ramp_duration: 2_000,
            start_volume: 0.1,
            max_volume: 1.0,
            ramp_enabled: true,
            day_start_hour: 8,
            day_end_hour: 20,
            night_ramp_duration: 4_000,

            target_volume: 80,
            zone_ready_timeout: 5_000,
            max_reactivation_attempts: 1,

            paging_device: PagingDevice::default(),
            speakers: Vec::new(),
            aux_devices: Vec::new(),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
