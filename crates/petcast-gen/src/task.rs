//! Generation task records
//!
//! A task is keyed by the id the caller sees. The provider-side id it
//! currently tracks can change underneath when a failed generation is
//! resubmitted. Records are only changed through the transition methods
//! below, which keep `result_asset_url` and `error_message` consistent with
//! `status`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::image_input::ImagePayload;

/// Sentinel task id handed out in demo mode
pub const DEMO_TASK_ID: &str = "demo";

/// Placeholder model reference returned for the demo task
pub const DEMO_MODEL_URL: &str = "demo";

/// Status of a generation task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Submitted,
    InProgress,
    Retrying,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Submitted => "SUBMITTED",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Retrying => "RETRYING",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// A tracked generation task
#[derive(Debug, Clone)]
pub struct GenerationTask {
    /// Caller-visible id (the first provider id)
    pub task_id: String,
    /// Provider id currently being tracked
    pub provider_task_id: String,
    pub status: TaskStatus,
    /// Kept only while resubmission is possible
    pub source_image: Option<ImagePayload>,
    pub contact: Option<String>,
    pub retry_count: u32,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub result_asset_url: Option<String>,
    pub error_message: Option<String>,
    pub consecutive_transient_failures: u32,
    /// RFC 3339 timestamp when submitted
    pub submitted_at: String,
    pub updated_at: String,
    /// Bumped by the registry on every stored update
    pub revision: u64,
}

impl GenerationTask {
    /// Create a freshly submitted task
    pub fn new(
        provider_task_id: &str,
        source_image: Option<ImagePayload>,
        contact: Option<String>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            task_id: provider_task_id.to_string(),
            provider_task_id: provider_task_id.to_string(),
            status: TaskStatus::Submitted,
            source_image,
            contact,
            retry_count: 0,
            progress: 0,
            result_asset_url: None,
            error_message: None,
            consecutive_transient_failures: 0,
            submitted_at: now.clone(),
            updated_at: now,
            revision: 0,
        }
    }

    /// Provider reported progress
    pub fn progressed(&self, progress: u8) -> Self {
        let mut next = self.touched();
        next.status = TaskStatus::InProgress;
        next.progress = progress.min(100);
        next.consecutive_transient_failures = 0;
        next
    }

    /// Provider could not be reached for this poll
    pub fn transient_failure(&self) -> Self {
        let mut next = self.touched();
        next.consecutive_transient_failures = self.consecutive_transient_failures.saturating_add(1);
        next
    }

    /// A resubmission has been claimed by one poll
    pub fn retrying(&self) -> Self {
        let mut next = self.touched();
        next.status = TaskStatus::Retrying;
        next.progress = 0;
        next.consecutive_transient_failures = 0;
        next
    }

    /// The claimed resubmission finished; `new_provider_id` is `None` when
    /// the provider refused it and the old id stays tracked
    pub fn retried(&self, new_provider_id: Option<String>) -> Self {
        let mut next = self.touched();
        if let Some(id) = new_provider_id {
            next.provider_task_id = id;
        }
        next.status = TaskStatus::InProgress;
        next.retry_count = self.retry_count + 1;
        next.progress = 0;
        next
    }

    /// `url` is `None` when the provider offered no preferred format
    pub fn succeeded(&self, url: Option<String>) -> Self {
        let mut next = self.touched();
        next.status = TaskStatus::Succeeded;
        next.progress = 100;
        next.result_asset_url = url;
        next.error_message = None;
        next.source_image = None;
        next
    }

    pub fn failed(&self, message: String) -> Self {
        let mut next = self.touched();
        next.status = TaskStatus::Failed;
        next.result_asset_url = None;
        next.error_message = Some(message);
        next.source_image = None;
        next
    }

    /// Whether a provider failure can still be answered with a resubmission
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.source_image.is_some() && self.retry_count < max_retries
    }

    fn touched(&self) -> Self {
        let mut next = self.clone();
        next.updated_at = now_rfc3339();
        next
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
