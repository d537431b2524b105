//! "Your model is ready" notifications
//!
//! Delivery is best-effort. A failed notification never changes task state.

use petcast_core::config::NotifyConfig;
use petcast_core::{PetcastError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const RESEND_URL: &str = "https://api.resend.com/emails";
const REQUEST_TIMEOUT_SECS: u64 = 20;
const SUBJECT: &str = "Your pet's 3D bust is ready!";

/// What to tell the customer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyNotification {
    pub contact: String,
    pub task_id: String,
    pub model_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub view_url: String,
}

impl ReadyNotification {
    pub fn new(contact: &str, task_id: &str, base_url: &str) -> Self {
        Self {
            contact: contact.to_string(),
            task_id: task_id.to_string(),
            model_url: None,
            thumbnail_url: None,
            view_url: view_url(base_url, task_id),
        }
    }

    pub fn with_model_url(mut self, url: Option<String>) -> Self {
        self.model_url = url;
        self
    }

    pub fn with_thumbnail_url(mut self, url: Option<String>) -> Self {
        self.thumbnail_url = url;
        self
    }

    /// Plain-text message body
    pub fn body_text(&self) -> String {
        let mut text = String::from(
            "Your pet's 3D bust is ready!\n\nOur AI sculptor has finished working its magic.\n\n",
        );
        text.push_str(&format!("View your 3D model: {}\n", self.view_url));
        if let Some(thumb) = &self.thumbnail_url {
            text.push_str(&format!("Preview: {}\n", thumb));
        }
        text
    }
}

/// Link to the viewer page for a task
pub fn view_url(base_url: &str, task_id: &str) -> String {
    format!("{}/view?id={}", base_url.trim_end_matches('/'), task_id)
}

/// Result of a delivery attempt that did not error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Sent,
    Skipped { reason: String },
}

/// Delivers ready notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &ReadyNotification) -> Result<NotifyOutcome>;
}

/// Used when no email API key is configured
pub struct DisabledNotifier;

impl Notifier for DisabledNotifier {
    fn notify(&self, notification: &ReadyNotification) -> Result<NotifyOutcome> {
        log::info!(
            "No email API key, skipping notification to {}",
            notification.contact
        );
        Ok(NotifyOutcome::Skipped {
            reason: "no_api_key".to_string(),
        })
    }
}

/// Sends email through the Resend HTTP API
pub struct ResendNotifier {
    api_key: String,
    from: String,
    api_url: String,
    agent: ureq::Agent,
}

impl ResendNotifier {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .http_status_as_error(false)
            .build();
        Self {
            api_key: api_key.into(),
            from: from.into(),
            api_url: RESEND_URL.to_string(),
            agent: config.into(),
        }
    }

    /// Point at a different endpoint (used by tests)
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    fn payload(&self, notification: &ReadyNotification) -> serde_json::Value {
        serde_json::json!({
            "from": self.from,
            "to": [notification.contact],
            "subject": SUBJECT,
            "text": notification.body_text(),
        })
    }
}

impl Notifier for ResendNotifier {
    fn notify(&self, notification: &ReadyNotification) -> Result<NotifyOutcome> {
        let mut response = self
            .agent
            .post(&self.api_url)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send_json(self.payload(notification))
            .map_err(|e| PetcastError::NotifyError(format!("Email delivery failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            log::info!(
                "Sent ready notification for {} to {}",
                notification.task_id,
                notification.contact
            );
            return Ok(NotifyOutcome::Sent);
        }

        let body: serde_json::Value = response
            .body_mut()
            .read_json()
            .unwrap_or(serde_json::Value::Null);
        let message = body
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
            .unwrap_or_else(|| format!("email API returned {}", status.as_u16()));
        Err(PetcastError::NotifyError(message))
    }
}

/// Pick a notifier for the configured credentials
pub fn notifier_from_config(config: &NotifyConfig) -> Arc<dyn Notifier> {
    match config
        .resend_api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
    {
        Some(key) => Arc::new(ResendNotifier::new(key, config.from.clone())),
        None => Arc::new(DisabledNotifier),
    }
}
