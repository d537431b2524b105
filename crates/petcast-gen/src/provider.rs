//! Image-to-3D provider trait and wire-level status types

use petcast_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::image_input::ImagePayload;

/// Flags sent with every create-task request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOptions {
    pub enable_pbr: bool,
    pub should_remesh: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            enable_pbr: true,
            should_remesh: false,
        }
    }
}

/// Status returned by a provider health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Available,
    Unavailable(String),
    NoApiKey,
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderStatus::Available => write!(f, "available"),
            ProviderStatus::Unavailable(reason) => write!(f, "unavailable ({})", reason),
            ProviderStatus::NoApiKey => write!(f, "no API key, demo mode"),
        }
    }
}

/// What the provider reports for one of its tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderTaskStatus {
    /// Queued or running, with progress percentage (0-100)
    Pending { progress: u8 },
    /// Finished; result URLs keyed by format (`glb`, `obj`, ...)
    Succeeded { model_urls: BTreeMap<String, String> },
    /// Finished without a usable result
    Failed { message: Option<String> },
}

impl ProviderTaskStatus {
    /// Pick the first result URL whose format appears in `preferred`
    pub fn result_url(&self, preferred: &[String]) -> Option<&str> {
        match self {
            ProviderTaskStatus::Succeeded { model_urls } => preferred
                .iter()
                .find_map(|fmt| model_urls.get(fmt))
                .map(String::as_str),
            _ => None,
        }
    }
}

/// Trait implemented by each image-to-3D backend (Meshy, Scripted)
///
/// Implementations are blocking and must be callable from many threads.
/// Transport failures and provider 5xx answers are reported as
/// `PetcastError::TransientProvider`; explicit refusals as
/// `PetcastError::ProviderRejected`.
pub trait ImageTo3dProvider: Send + Sync {
    /// Provider name (e.g. "meshy", "scripted")
    fn name(&self) -> &str;

    /// Check if the provider is usable (API key set)
    fn health_check(&self) -> Result<ProviderStatus>;

    /// Create a provider-side task and return its id without waiting for it
    fn create_task(&self, image: &ImagePayload, options: &CreateOptions) -> Result<String>;

    /// Query the current state of a provider-side task
    fn poll_task(&self, task_id: &str) -> Result<ProviderTaskStatus>;
}
