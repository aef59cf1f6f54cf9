use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT_MS: u64 = 2_000;
const ZONE_POLL_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, Error)]
pub enum HardwareError {
    #[error("device request failed: {0}")]
    Request(String),
    #[error("zone {zone} not ready within {timeout_ms}ms")]
    ZoneTimeout { zone: u32, timeout_ms: u64 },
}

/// Network control surface of the physical paging hardware. Every call is
/// fallible and independently timed out.
#[allow(async_fn_in_trait)]
pub trait DeviceControl {
    async fn set_paging_zone(&self, zone: u32) -> Result<(), HardwareError>;
    async fn wait_for_zone_ready(&self, zone: u32, timeout_ms: u64) -> Result<(), HardwareError>;
    async fn set_speaker_volume(&self, id: &str, pct: u8) -> Result<(), HardwareError>;
    async fn control_aux_devices(&self, ids: &[String], on: bool) -> Result<(), HardwareError>;
}

#[derive(Serialize)]
struct ZoneRequest {
    zone: u32,
}

#[derive(Deserialize)]
struct ZoneReadyResponse {
    ready: bool,
}

#[derive(Serialize)]
struct VolumeRequest {
    pct: u8,
}

#[derive(Serialize)]
struct AuxRequest<'a> {
    ids: &'a [String],
    on: bool,
}

/// HTTP client for the paging head-end.
#[derive(Clone)]
pub struct HttpDeviceControl {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDeviceControl {
    pub fn new(base_url: &str) -> Self {
        Self {
            // Hard network-level timeout; zone readiness has its own
            // higher-level deadline on top.
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<(), HardwareError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| HardwareError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(HardwareError::Request(format!(
                "{url}: {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

impl DeviceControl for HttpDeviceControl {
    async fn set_paging_zone(&self, zone: u32) -> Result<(), HardwareError> {
        self.post_json("/zone", &ZoneRequest { zone }).await
    }

    /// Polls the readiness endpoint rather than assuming the zone switch
    /// takes effect instantaneously.
    async fn wait_for_zone_ready(&self, zone: u32, timeout_ms: u64) -> Result<(), HardwareError> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let url = format!("{}/zone/{}/ready", self.base_url, zone);
            let ready = match self.client.get(&url).send().await {
                Ok(resp) => resp
                    .json::<ZoneReadyResponse>()
                    .await
                    .map(|r| r.ready)
                    .unwrap_or(false),
                Err(e) => {
                    debug!("zone readiness poll failed: {e}");
                    false
                }
            };
            if ready {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(HardwareError::ZoneTimeout { zone, timeout_ms });
            }
            tokio::time::sleep(Duration::from_millis(ZONE_POLL_INTERVAL_MS)).await;
        }
    }

    async fn set_speaker_volume(&self, id: &str, pct: u8) -> Result<(), HardwareError> {
        self.post_json(&format!("/speakers/{id}/volume"), &VolumeRequest { pct })
            .await
    }

    async fn control_aux_devices(&self, ids: &[String], on: bool) -> Result<(), HardwareError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.post_json("/aux", &AuxRequest { ids, on }).await
    }
}
