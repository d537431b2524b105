//! Generation task manager
//!
//! Accepts uploads, hands them to the image-to-3D provider and answers
//! status polls. A poll that observes a provider failure may resubmit the
//! original image; the registry's compare-and-swap guarantees that only one
//! of several concurrent polls does so.

use petcast_core::config::GenerationConfig;
use petcast_core::{PetcastConfig, PetcastError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::image_input::{validate_contact_address, ImagePayload};
use crate::notify::{notifier_from_config, Notifier, NotifyOutcome, ReadyNotification};
use crate::provider::{CreateOptions, ImageTo3dProvider, ProviderStatus, ProviderTaskStatus};
use crate::providers::create_provider;
use crate::registry::{InMemoryTaskRegistry, TaskRepository};
use crate::task::{GenerationTask, TaskStatus, DEMO_MODEL_URL, DEMO_TASK_ID};

const DEFAULT_FAILURE_MESSAGE: &str = "3D generation failed";
const POLLING_MESSAGE: &str = "Checking...";

/// Status values reported to pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollStatus {
    Succeeded,
    Failed,
    InProgress,
    /// The provider could not be asked; keep polling
    Polling,
}

/// Answer to a status poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollReport {
    pub status: PollStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub demo: bool,
}

impl PollReport {
    pub fn demo() -> Self {
        Self {
            demo: true,
            ..Self::succeeded(Some(DEMO_MODEL_URL.to_string()))
        }
    }

    pub fn succeeded(model_url: Option<String>) -> Self {
        Self {
            status: PollStatus::Succeeded,
            progress: 100,
            model_url,
            error: None,
            message: None,
            demo: false,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: PollStatus::Failed,
            progress: 0,
            model_url: None,
            error: Some(error),
            message: None,
            demo: false,
        }
    }

    pub fn in_progress(progress: u8) -> Self {
        Self {
            status: PollStatus::InProgress,
            progress,
            model_url: None,
            error: None,
            message: None,
            demo: false,
        }
    }

    /// The terminal failure as an error, if this report is one
    pub fn failure(&self) -> Option<PetcastError> {
        match self.status {
            PollStatus::Failed => Some(PetcastError::GenerationFailed(
                self.error.clone().unwrap_or_default(),
            )),
            _ => None,
        }
    }

    pub fn polling() -> Self {
        Self {
            status: PollStatus::Polling,
            progress: 0,
            model_url: None,
            error: None,
            message: Some(POLLING_MESSAGE.to_string()),
            demo: false,
        }
    }
}

/// Answer to a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub demo: bool,
}

/// Tracks generation tasks for one provider
pub struct TaskManager {
    provider: Option<Arc<dyn ImageTo3dProvider>>,
    registry: Arc<dyn TaskRepository>,
    config: GenerationConfig,
    notifier: Option<(Arc<dyn Notifier>, String)>,
}

impl TaskManager {
    /// `provider = None` puts the manager in demo mode
    pub fn new(provider: Option<Arc<dyn ImageTo3dProvider>>, config: GenerationConfig) -> Self {
        Self {
            provider,
            registry: Arc::new(InMemoryTaskRegistry::new()),
            config,
            notifier: None,
        }
    }

    /// Build from resolved configuration. A missing provider credential is
    /// not an error: the manager runs in demo mode.
    pub fn from_config(config: &PetcastConfig) -> Result<Self> {
        let provider = match create_provider(&config.generation.provider, config) {
            Ok(provider) => Some(provider),
            Err(PetcastError::NoCredential(msg)) => {
                log::warn!("{}; running in demo mode", msg);
                None
            }
            Err(e) => return Err(e),
        };

        let mut manager = Self::new(provider, config.generation.clone());
        if config.notify.on_success {
            let base_url = config
                .notify
                .base_url
                .clone()
                .unwrap_or_else(|| format!("http://{}", config.server.bind));
            manager = manager.with_notifier(notifier_from_config(&config.notify), base_url);
        }
        Ok(manager)
    }

    pub fn with_registry(mut self, registry: Arc<dyn TaskRepository>) -> Self {
        self.registry = registry;
        self
    }

    /// Notify the task's contact when a poll first observes success
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, base_url: impl Into<String>) -> Self {
        self.notifier = Some((notifier, base_url.into()));
        self
    }

    pub fn is_demo(&self) -> bool {
        self.provider.is_none()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.name())
    }

    /// Health of the configured provider. Demo mode reports a missing key.
    pub fn provider_status(&self) -> ProviderStatus {
        match &self.provider {
            None => ProviderStatus::NoApiKey,
            Some(provider) => provider
                .health_check()
                .unwrap_or_else(|e| ProviderStatus::Unavailable(e.to_string())),
        }
    }

    /// Snapshot of a tracked task
    pub fn task(&self, task_id: &str) -> Result<Option<GenerationTask>> {
        self.registry.get(task_id)
    }

    /// Validate the upload and start a provider task. Returns as soon as the
    /// provider has accepted the task.
    pub fn submit(&self, image: Option<ImagePayload>, contact: Option<&str>) -> Result<SubmitOutcome> {
        let image = image
            .filter(|i| !i.is_empty())
            .ok_or_else(|| PetcastError::MissingInput("No image provided".to_string()))?;

        let contact = contact.map(str::trim).filter(|c| !c.is_empty());
        match contact {
            Some(address) => validate_contact_address(address)?,
            None if self.config.require_contact => {
                return Err(PetcastError::MissingInput("Email is required".to_string()));
            }
            None => {}
        }

        let provider = match &self.provider {
            Some(provider) => provider,
            None => {
                log::info!("Demo mode submission ({} byte image)", image.len());
                return Ok(SubmitOutcome {
                    task_id: DEMO_TASK_ID.to_string(),
                    demo: true,
                });
            }
        };

        let provider_id = provider.create_task(&image, &self.create_options())?;
        log::info!(
            "Submitted {} image to {} as task {}",
            image.mime_type(),
            provider.name(),
            provider_id
        );

        let source_image = (self.config.max_retries > 0).then_some(image);
        let task = GenerationTask::new(&provider_id, source_image, contact.map(str::to_string));
        self.registry.insert(task)?;

        Ok(SubmitOutcome {
            task_id: provider_id,
            demo: false,
        })
    }

    /// Report the state of a task, driving retries and terminal transitions
    pub fn poll(&self, task_id: &str) -> Result<PollReport> {
        if task_id == DEMO_TASK_ID {
            return Ok(PollReport::demo());
        }
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| PetcastError::NoCredential("No API key".to_string()))?;

        let record = self.registry.get(task_id)?;
        if let Some(task) = &record {
            match task.status {
                TaskStatus::Succeeded => {
                    return Ok(PollReport::succeeded(task.result_asset_url.clone()))
                }
                TaskStatus::Failed => {
                    let error = task
                        .error_message
                        .clone()
                        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                    return Ok(PollReport::failed(error));
                }
                TaskStatus::Retrying => return Ok(PollReport::in_progress(0)),
                TaskStatus::Submitted | TaskStatus::InProgress => {}
            }
        }

        let provider_id = record
            .as_ref()
            .map(|t| t.provider_task_id.as_str())
            .unwrap_or(task_id);

        match provider.poll_task(provider_id) {
            Ok(ProviderTaskStatus::Pending { progress }) => {
                if let Some(task) = &record {
                    // losing this race only drops a progress update
                    self.registry
                        .compare_and_swap(task.revision, task.progressed(progress))?;
                }
                Ok(PollReport::in_progress(progress))
            }
            Ok(status @ ProviderTaskStatus::Succeeded { .. }) => {
                let url = status
                    .result_url(&self.config.preferred_formats)
                    .map(str::to_string);
                if let Some(task) = &record {
                    self.finish_success(task, url.clone())?;
                }
                Ok(PollReport::succeeded(url))
            }
            Ok(ProviderTaskStatus::Failed { message }) => {
                self.handle_failure(provider.as_ref(), task_id, record, message)
            }
            Err(e) if e.is_transient() => self.handle_transient(task_id, record, &e),
            Err(e) => Err(e),
        }
    }

    fn create_options(&self) -> CreateOptions {
        CreateOptions {
            enable_pbr: self.config.enable_pbr,
            should_remesh: self.config.should_remesh,
        }
    }

    fn finish_success(&self, task: &GenerationTask, url: Option<String>) -> Result<()> {
        if !self
            .registry
            .compare_and_swap(task.revision, task.succeeded(url.clone()))?
        {
            return Ok(());
        }
        log::info!(
            "Task {} succeeded after {} retries",
            task.task_id,
            task.retry_count
        );
        if url.is_none() {
            log::warn!("Task {} succeeded without a usable model URL", task.task_id);
        }
        self.notify_ready(task, url);
        Ok(())
    }

    fn notify_ready(&self, task: &GenerationTask, model_url: Option<String>) {
        let (Some((notifier, base_url)), Some(contact)) = (&self.notifier, &task.contact) else {
            return;
        };
        let notification =
            ReadyNotification::new(contact, &task.task_id, base_url).with_model_url(model_url);
        match notifier.notify(&notification) {
            Ok(NotifyOutcome::Sent) => {}
            Ok(NotifyOutcome::Skipped { reason }) => {
                log::info!("Notification for {} skipped: {}", task.task_id, reason)
            }
            Err(e) => log::warn!("Notification for {} failed: {}", task.task_id, e),
        }
    }

    fn handle_failure(
        &self,
        provider: &dyn ImageTo3dProvider,
        task_id: &str,
        record: Option<GenerationTask>,
        message: Option<String>,
    ) -> Result<PollReport> {
        let message = message.unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
        let task = match record {
            Some(task) => task,
            None => {
                log::warn!("Untracked task {} failed: {}", task_id, message);
                return Ok(PollReport::failed(message));
            }
        };

        if !task.can_retry(self.config.max_retries) {
            if self
                .registry
                .compare_and_swap(task.revision, task.failed(message.clone()))?
            {
                log::warn!(
                    "Task {} failed after {} retries: {}",
                    task.task_id,
                    task.retry_count,
                    message
                );
            }
            return Ok(PollReport::failed(message));
        }

        let claimed = task.retrying();
        if !self.registry.compare_and_swap(task.revision, claimed.clone())? {
            // another poll owns this transition
            return Ok(PollReport::in_progress(0));
        }
        let claimed_revision = task.revision + 1;

        let attempt = claimed.retry_count + 1;
        let new_provider_id = match &claimed.source_image {
            Some(image) => match provider.create_task(image, &self.create_options()) {
                Ok(id) => {
                    log::info!(
                        "Task {} failed on {} ({}); resubmitted as {} (attempt {}/{})",
                        task.task_id,
                        task.provider_task_id,
                        message,
                        id,
                        attempt,
                        self.config.max_retries
                    );
                    Some(id)
                }
                Err(e) => {
                    log::warn!(
                        "Resubmission {}/{} of task {} failed: {}",
                        attempt,
                        self.config.max_retries,
                        task.task_id,
                        e
                    );
                    None
                }
            },
            None => None,
        };

        let mut retried = claimed.retried(new_provider_id);
        if retried.retry_count >= self.config.max_retries {
            retried.source_image = None;
        }
        if !self.registry.compare_and_swap(claimed_revision, retried)? {
            log::warn!("Task {} changed while a resubmission was in flight", task.task_id);
        }
        Ok(PollReport::in_progress(0))
    }

    fn handle_transient(
        &self,
        task_id: &str,
        record: Option<GenerationTask>,
        error: &PetcastError,
    ) -> Result<PollReport> {
        log::warn!("Status check for {} failed: {}", task_id, error);
        let Some(task) = record else {
            return Ok(PollReport::polling());
        };

        let next = task.transient_failure();
        match self.config.max_consecutive_transient_failures {
            Some(limit) if next.consecutive_transient_failures > limit => {
                let message = format!(
                    "Provider unreachable after {} consecutive attempts",
                    next.consecutive_transient_failures
                );
                if self
                    .registry
                    .compare_and_swap(task.revision, next.failed(message.clone()))?
                {
                    log::warn!("Task {} failed: {}", task.task_id, message);
                    return Ok(PollReport::failed(message));
                }
                Ok(PollReport::polling())
            }
            _ => {
                self.registry.compare_and_swap(task.revision, next)?;
                Ok(PollReport::polling())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::scripted::{ScriptedPoll, ScriptedProvider};
    use std::sync::Mutex;
    use std::time::Duration;

    const EMAIL: &str = "owner@example.com";
    const MODEL_URL: &str = "https://assets.meshy.ai/t2/model.glb";

    fn image() -> ImagePayload {
        ImagePayload::from_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10], Some("image/jpeg"))
            .unwrap()
    }

    fn manager_with(provider: &Arc<ScriptedProvider>, config: GenerationConfig) -> TaskManager {
        let provider: Arc<dyn ImageTo3dProvider> = provider.clone();
        TaskManager::new(Some(provider), config)
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<ReadyNotification>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: &ReadyNotification) -> Result<NotifyOutcome> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(NotifyOutcome::Sent)
        }
    }

    #[test]
    fn test_submit_returns_provider_id() {
        let provider = Arc::new(ScriptedProvider::new());
        let manager = manager_with(&provider, GenerationConfig::default());

        let outcome = manager.submit(Some(image()), Some(EMAIL)).unwrap();
        assert_eq!(outcome.task_id, "T1");
        assert!(!outcome.demo);
        assert_eq!(provider.create_calls(), 1);
        assert_eq!(provider.poll_calls("T1"), 0);

        let task = manager.task("T1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Submitted);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.contact.as_deref(), Some(EMAIL));
        assert!(task.source_image.is_some());
    }

    #[test]
    fn test_demo_flow() {
        let manager = TaskManager::new(None, GenerationConfig::default());
        assert!(manager.is_demo());

        let outcome = manager.submit(Some(image()), Some(EMAIL)).unwrap();
        assert_eq!(outcome.task_id, "demo");
        assert!(outcome.demo);

        let report = manager.poll(&outcome.task_id).unwrap();
        assert_eq!(report.status, PollStatus::Succeeded);
        assert_eq!(report.progress, 100);
        assert_eq!(report.model_url.as_deref(), Some("demo"));
        assert!(report.demo);
    }

    #[test]
    fn test_provider_status() {
        let demo = TaskManager::new(None, GenerationConfig::default());
        assert_eq!(demo.provider_status(), ProviderStatus::NoApiKey);

        let provider = Arc::new(ScriptedProvider::new());
        let manager = manager_with(&provider, GenerationConfig::default());
        assert_eq!(manager.provider_status(), ProviderStatus::Available);

        provider.set_outage(Some("maintenance window"));
        match manager.provider_status() {
            ProviderStatus::Unavailable(reason) => assert!(reason.contains("maintenance window")),
            other => panic!("expected unavailable, got {:?}", other),
        }
        provider.set_outage(None);
        assert_eq!(manager.provider_status().to_string(), "available");
    }

    #[test]
    fn test_demo_poll_with_provider_skips_network() {
        let provider = Arc::new(ScriptedProvider::new());
        let manager = manager_with(&provider, GenerationConfig::default());
        assert!(manager.poll("demo").unwrap().demo);
        assert_eq!(provider.poll_calls("demo"), 0);
    }

    #[test]
    fn test_poll_without_provider_needs_credential() {
        let manager = TaskManager::new(None, GenerationConfig::default());
        assert!(matches!(
            manager.poll("T1"),
            Err(PetcastError::NoCredential(msg)) if msg == "No API key"
        ));
    }

    #[test]
    fn test_submit_validation_runs_first() {
        let manager = TaskManager::new(None, GenerationConfig::default());
        assert!(matches!(
            manager.submit(None, Some(EMAIL)),
            Err(PetcastError::MissingInput(msg)) if msg == "No image provided"
        ));
        assert!(matches!(
            manager.submit(Some(image()), None),
            Err(PetcastError::MissingInput(msg)) if msg == "Email is required"
        ));
        assert!(matches!(
            manager.submit(Some(image()), Some("not-an-email")),
            Err(PetcastError::MissingInput(msg)) if msg == "Invalid email address"
        ));

        let relaxed = TaskManager::new(
            None,
            GenerationConfig {
                require_contact: false,
                ..GenerationConfig::default()
            },
        );
        assert!(relaxed.submit(Some(image()), None).unwrap().demo);
    }

    #[test]
    fn test_provider_rejection_registers_nothing() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.reject_creates(Some("Insufficient credits"));
        let manager = manager_with(&provider, GenerationConfig::default());

        let result = manager.submit(Some(image()), Some(EMAIL));
        assert!(matches!(result, Err(PetcastError::ProviderRejected(_))));
        assert!(manager.registry.is_empty().unwrap());
    }

    #[test]
    fn test_retry_flow_t1_to_t2() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script("T1", [ScriptedPoll::Failed(Some("mesh error".into()))]);
        provider.script(
            "T2",
            [
                ScriptedPoll::Pending(40),
                ScriptedPoll::Succeeded(MODEL_URL.to_string()),
            ],
        );
        let manager = manager_with(&provider, GenerationConfig::default());
        let task_id = manager.submit(Some(image()), Some(EMAIL)).unwrap().task_id;

        let first = manager.poll(&task_id).unwrap();
        assert_eq!(first, PollReport::in_progress(0));
        assert_eq!(provider.create_calls(), 2);

        let task = manager.task(&task_id).unwrap().unwrap();
        assert_eq!(task.provider_task_id, "T2");
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.status, TaskStatus::InProgress);

        assert_eq!(manager.poll(&task_id).unwrap(), PollReport::in_progress(40));

        let done = manager.poll(&task_id).unwrap();
        assert_eq!(done.status, PollStatus::Succeeded);
        assert_eq!(done.progress, 100);
        assert_eq!(done.model_url.as_deref(), Some(MODEL_URL));

        let stored = manager.task("T1").unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Succeeded);
        assert!(stored.source_image.is_none());
        assert_eq!(provider.create_calls(), 2);
    }

    #[test]
    fn test_retries_exhausted_is_terminal() {
        let provider = Arc::new(ScriptedProvider::new());
        for id in ["T1", "T2", "T3"] {
            provider.script(id, [ScriptedPoll::Failed(Some("content policy".into()))]);
        }
        let manager = manager_with(&provider, GenerationConfig::default());
        let task_id = manager.submit(Some(image()), Some(EMAIL)).unwrap().task_id;

        assert_eq!(manager.poll(&task_id).unwrap().status, PollStatus::InProgress);
        assert_eq!(manager.poll(&task_id).unwrap().status, PollStatus::InProgress);
        let failed = manager.poll(&task_id).unwrap();
        assert_eq!(failed.status, PollStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("content policy"));
        assert!(matches!(
            failed.failure(),
            Some(PetcastError::GenerationFailed(msg)) if msg == "content policy"
        ));
        assert_eq!(provider.create_calls(), 3);

        // answered from the registry from now on
        let again = manager.poll(&task_id).unwrap();
        assert_eq!(again, failed);
        assert_eq!(provider.poll_calls("T3"), 1);
        assert_eq!(provider.create_calls(), 3);
    }

    #[test]
    fn test_no_retry_budget_fails_immediately() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script("T1", [ScriptedPoll::Failed(None)]);
        let manager = manager_with(
            &provider,
            GenerationConfig {
                max_retries: 0,
                ..GenerationConfig::default()
            },
        );
        let task_id = manager.submit(Some(image()), Some(EMAIL)).unwrap().task_id;
        assert!(manager.task(&task_id).unwrap().unwrap().source_image.is_none());

        let report = manager.poll(&task_id).unwrap();
        assert_eq!(report.status, PollStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("3D generation failed"));
        assert_eq!(provider.create_calls(), 1);
    }

    #[test]
    fn test_rejected_resubmission_consumes_attempt() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script("T1", [ScriptedPoll::Failed(None)]);
        let manager = manager_with(&provider, GenerationConfig::default());
        let task_id = manager.submit(Some(image()), Some(EMAIL)).unwrap().task_id;

        provider.reject_creates(Some("Rate limited"));
        assert_eq!(manager.poll(&task_id).unwrap(), PollReport::in_progress(0));

        let task = manager.task(&task_id).unwrap().unwrap();
        assert_eq!(task.provider_task_id, "T1");
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_concurrent_polls_resubmit_once() {
        let provider = Arc::new(ScriptedProvider::new().with_create_delay(Duration::from_millis(50)));
        provider.script("T1", [ScriptedPoll::Failed(None)]);
        let manager = Arc::new(manager_with(&provider, GenerationConfig::default()));
        let task_id = manager.submit(Some(image()), Some(EMAIL)).unwrap().task_id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let task_id = task_id.clone();
                std::thread::spawn(move || manager.poll(&task_id).unwrap())
            })
            .collect();

        for handle in handles {
            let report = handle.join().unwrap();
            assert_eq!(report.status, PollStatus::InProgress);
            assert_eq!(report.progress, 0);
        }
        // one submission plus exactly one resubmission
        assert_eq!(provider.create_calls(), 2);
        let task = manager.task(&task_id).unwrap().unwrap();
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.provider_task_id, "T2");
    }

    #[test]
    fn test_transient_errors_keep_polling() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script("T1", [ScriptedPoll::Transient]);
        let manager = manager_with(&provider, GenerationConfig::default());
        let task_id = manager.submit(Some(image()), Some(EMAIL)).unwrap().task_id;

        for _ in 0..5 {
            let report = manager.poll(&task_id).unwrap();
            assert_eq!(report.status, PollStatus::Polling);
            assert_eq!(report.message.as_deref(), Some("Checking..."));
        }
        let task = manager.task(&task_id).unwrap().unwrap();
        assert_eq!(task.consecutive_transient_failures, 5);
        assert!(!task.status.is_terminal());
    }

    #[test]
    fn test_transient_limit_fails_task() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script("T1", [ScriptedPoll::Transient]);
        let manager = manager_with(
            &provider,
            GenerationConfig {
                max_consecutive_transient_failures: Some(2),
                ..GenerationConfig::default()
            },
        );
        let task_id = manager.submit(Some(image()), Some(EMAIL)).unwrap().task_id;

        assert_eq!(manager.poll(&task_id).unwrap().status, PollStatus::Polling);
        assert_eq!(manager.poll(&task_id).unwrap().status, PollStatus::Polling);
        assert_eq!(manager.poll(&task_id).unwrap().status, PollStatus::Failed);
        assert_eq!(
            manager.task(&task_id).unwrap().unwrap().status,
            TaskStatus::Failed
        );
    }

    #[test]
    fn test_progress_recorded() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script("T1", [ScriptedPoll::Pending(10), ScriptedPoll::Pending(55)]);
        let manager = manager_with(&provider, GenerationConfig::default());
        let task_id = manager.submit(Some(image()), Some(EMAIL)).unwrap().task_id;

        assert_eq!(manager.poll(&task_id).unwrap().progress, 10);
        assert_eq!(manager.poll(&task_id).unwrap().progress, 55);
        assert_eq!(manager.task(&task_id).unwrap().unwrap().progress, 55);
    }

    #[test]
    fn test_untracked_task_is_polled_directly() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script("X9", [ScriptedPoll::Pending(70)]);
        let manager = manager_with(&provider, GenerationConfig::default());
        assert_eq!(manager.poll("X9").unwrap(), PollReport::in_progress(70));
        assert_eq!(provider.poll_calls("X9"), 1);
    }

    #[test]
    fn test_success_notifies_once() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script("T1", [ScriptedPoll::Succeeded(MODEL_URL.to_string())]);
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = manager_with(&provider, GenerationConfig::default())
            .with_notifier(notifier.clone(), "https://petcast3d.com");
        let task_id = manager.submit(Some(image()), Some(EMAIL)).unwrap().task_id;

        manager.poll(&task_id).unwrap();
        manager.poll(&task_id).unwrap();

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].contact, EMAIL);
        assert_eq!(sent[0].view_url, "https://petcast3d.com/view?id=T1");
        assert_eq!(sent[0].model_url.as_deref(), Some(MODEL_URL));
    }

    #[test]
    fn test_poll_report_json_shape() {
        let json = serde_json::to_value(PollReport::demo()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "SUCCEEDED", "progress": 100, "modelUrl": "demo", "demo": true})
        );
        let json = serde_json::to_value(PollReport::polling()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "POLLING", "progress": 0, "message": "Checking..."})
        );
        let json = serde_json::to_value(SubmitOutcome {
            task_id: "T1".into(),
            demo: false,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"taskId": "T1"}));
    }

    #[test]
    fn test_from_config_without_key_is_demo() {
        let mut config = PetcastConfig::default();
        config.providers.clear();
        let manager = TaskManager::from_config(&config).unwrap();
        assert!(manager.is_demo());

        config.generation.provider = "scripted".to_string();
        let manager = TaskManager::from_config(&config).unwrap();
        assert_eq!(manager.provider_name(), Some("scripted"));
    }
}
