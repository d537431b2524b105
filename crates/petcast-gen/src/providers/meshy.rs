//! Meshy image-to-3D provider
//!
//! Talks to the Meshy v1 `image-to-3d` API. Creation returns the provider
//! task id right away; generation itself takes minutes and is observed
//! through `poll_task`.

use crate::image_input::ImagePayload;
use crate::provider::*;
use petcast_core::{PetcastConfig, PetcastError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_MESHY_URL: &str = "https://api.meshy.ai/openapi/v1";
const REQUEST_TIMEOUT_SECS: u64 = 60;
const MAX_RETRIES: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Meshy provider for image-to-3D generation
pub struct MeshyProvider {
    api_key: String,
    api_url: String,
    agent: ureq::Agent,
}

impl MeshyProvider {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            agent: build_agent(),
        }
    }

    /// Create a new MeshyProvider from config
    pub fn from_config(config: &PetcastConfig) -> Result<Self> {
        let api_key = config.api_key("meshy").ok_or_else(|| {
            PetcastError::NoCredential(
                "Meshy API key not configured. Set PETCAST_MESHY_API_KEY or add to .petcast/config.toml"
                    .to_string(),
            )
        })?;
        let api_url = config.api_url("meshy").unwrap_or(DEFAULT_MESHY_URL);
        Ok(Self::new(api_key, api_url))
    }

    fn post_json_with_retry(&self, url: &str, payload: &Value) -> Result<(u16, Value)> {
        self.send_with_retry("create request", || {
            self.agent
                .post(url)
                .header("Authorization", &format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .send_json(payload)
        })
    }

    fn get_json_with_retry(&self, url: &str) -> Result<(u16, Value)> {
        self.send_with_retry("poll", || {
            self.agent
                .get(url)
                .header("Authorization", &format!("Bearer {}", self.api_key))
                .call()
        })
    }

    /// Run `send` until it yields a non-retryable answer. Error statuses are
    /// returned with their body so the caller can surface the message.
    fn send_with_retry<F>(&self, what: &str, mut send: F) -> Result<(u16, Value)>
    where
        F: FnMut() -> std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    {
        let mut attempt = 0;
        loop {
            match send() {
                Ok(mut response) => {
                    let status = response.status().as_u16();
                    if attempt + 1 < MAX_RETRIES && is_retryable_status(status) {
                        log::warn!("Meshy {} returned {}, retrying", what, status);
                        sleep_backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    let body = response
                        .body_mut()
                        .read_json::<Value>()
                        .unwrap_or(Value::Null);
                    return Ok((status, body));
                }
                Err(e) => {
                    if attempt + 1 < MAX_RETRIES && is_retryable_error(&e) {
                        log::warn!("Meshy {} failed ({}), retrying", what, e);
                        sleep_backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(PetcastError::TransientProvider(format!(
                        "Meshy {} failed: {}",
                        what, e
                    )));
                }
            }
        }
    }
}

impl ImageTo3dProvider for MeshyProvider {
    fn name(&self) -> &str {
        "meshy"
    }

    fn health_check(&self) -> Result<ProviderStatus> {
        if self.api_key.trim().is_empty() {
            return Ok(ProviderStatus::NoApiKey);
        }
        Ok(ProviderStatus::Available)
    }

    fn create_task(&self, image: &ImagePayload, options: &CreateOptions) -> Result<String> {
        let payload = serde_json::json!({
            "image_url": image.to_data_url(),
            "enable_pbr": options.enable_pbr,
            "should_remesh": options.should_remesh,
        });
        let url = format!("{}/image-to-3d", self.api_url);
        let (status, body) = self.post_json_with_retry(&url, &payload)?;
        parse_create_response(is_success(status), &body)
    }

    fn poll_task(&self, task_id: &str) -> Result<ProviderTaskStatus> {
        let url = format!("{}/image-to-3d/{}", self.api_url, task_id);
        let (status, body) = self.get_json_with_retry(&url)?;
        if !is_success(status) {
            return Err(PetcastError::TransientProvider(format!(
                "Meshy poll returned {}: {}",
                status, body
            )));
        }
        Ok(parse_poll_response(&body))
    }
}

/// Interpret a create-task answer. `result` carries the task id.
pub fn parse_create_response(status_ok: bool, body: &Value) -> Result<String> {
    let task_id = body
        .get("result")
        .and_then(|r| r.as_str())
        .filter(|id| !id.is_empty());

    match task_id {
        Some(id) if status_ok => Ok(id.to_string()),
        _ => {
            let message = ["message", "error"]
                .iter()
                .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
                .filter(|m| !m.is_empty())
                .unwrap_or("Failed to create 3D task");
            Err(PetcastError::ProviderRejected(message.to_string()))
        }
    }
}

/// Interpret a task status document
pub fn parse_poll_response(body: &Value) -> ProviderTaskStatus {
    let status = body
        .get("status")
        .and_then(|s| s.as_str())
        .unwrap_or("UNKNOWN");

    match status {
        "SUCCEEDED" => {
            let model_urls: BTreeMap<String, String> = body
                .get("model_urls")
                .and_then(|u| u.as_object())
                .map(|urls| {
                    urls.iter()
                        .filter_map(|(format, url)| {
                            url.as_str()
                                .filter(|u| !u.is_empty())
                                .map(|u| (format.clone(), u.to_string()))
                        })
                        .collect()
                })
                .unwrap_or_default();
            ProviderTaskStatus::Succeeded { model_urls }
        }
        "FAILED" | "EXPIRED" | "CANCELED" => {
            let message = body
                .get("task_error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .filter(|m| !m.is_empty())
                .map(|m| m.to_string());
            ProviderTaskStatus::Failed { message }
        }
        _ => {
            let progress = body
                .get("progress")
                .and_then(|p| p.as_u64())
                .unwrap_or(0)
                .min(100) as u8;
            ProviderTaskStatus::Pending { progress }
        }
    }
}

fn build_agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .http_status_as_error(false)
        .build();
    config.into()
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(e: &ureq::Error) -> bool {
    matches!(
        e,
        ureq::Error::Timeout(_)
            | ureq::Error::Io(_)
            | ureq::Error::ConnectionFailed
            | ureq::Error::HostNotFound
    )
}

fn sleep_backoff(attempt: usize) {
    let delay_ms = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << attempt);
    std::thread::sleep(Duration::from_millis(delay_ms));
}
