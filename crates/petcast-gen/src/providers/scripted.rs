//! Scripted provider for testing
//!
//! Replays queued poll outcomes per provider task id without any network
//! calls. Task ids are handed out sequentially (`T1`, `T2`, ...). The last
//! queued outcome of a task repeats once the queue is drained; an unscripted
//! task stays pending at 0%.

use crate::image_input::ImagePayload;
use crate::provider::*;
use petcast_core::{PetcastError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One scripted answer to `poll_task`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedPoll {
    Pending(u8),
    Succeeded(String),
    Failed(Option<String>),
    /// The provider could not be reached
    Transient,
}

#[derive(Default)]
struct ScriptState {
    next_id: u32,
    create_calls: usize,
    poll_calls: HashMap<String, usize>,
    create_rejection: Option<String>,
    outage: Option<String>,
    scripts: HashMap<String, VecDeque<ScriptedPoll>>,
}

/// A deterministic provider driven by a script
#[derive(Default)]
pub struct ScriptedProvider {
    state: Mutex<ScriptState>,
    create_delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep inside every `create_task` call, widening race windows
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Queue poll outcomes for a provider task id
    pub fn script(&self, task_id: &str, outcomes: impl IntoIterator<Item = ScriptedPoll>) {
        if let Ok(mut state) = self.state.lock() {
            state
                .scripts
                .entry(task_id.to_string())
                .or_default()
                .extend(outcomes);
        }
    }

    /// Make subsequent `create_task` calls fail with this message
    pub fn reject_creates(&self, message: Option<&str>) {
        if let Ok(mut state) = self.state.lock() {
            state.create_rejection = message.map(str::to_string);
        }
    }

    /// Make health checks fail with this message
    pub fn set_outage(&self, message: Option<&str>) {
        if let Ok(mut state) = self.state.lock() {
            state.outage = message.map(str::to_string);
        }
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().map(|s| s.create_calls).unwrap_or(0)
    }

    pub fn poll_calls(&self, task_id: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.poll_calls.get(task_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ScriptState>> {
        self.state
            .lock()
            .map_err(|_| PetcastError::TransientProvider("scripted provider poisoned".to_string()))
    }
}

impl ImageTo3dProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn health_check(&self) -> Result<ProviderStatus> {
        match &self.lock()?.outage {
            Some(message) => Err(PetcastError::TransientProvider(message.clone())),
            None => Ok(ProviderStatus::Available),
        }
    }

    fn create_task(&self, image: &ImagePayload, _options: &CreateOptions) -> Result<String> {
        if image.is_empty() {
            return Err(PetcastError::ProviderRejected("empty image".to_string()));
        }
        {
            let mut state = self.lock()?;
            state.create_calls += 1;
            if let Some(message) = state.create_rejection.clone() {
                return Err(PetcastError::ProviderRejected(message));
            }
        }
        if let Some(delay) = self.create_delay {
            std::thread::sleep(delay);
        }
        let mut state = self.lock()?;
        state.next_id += 1;
        Ok(format!("T{}", state.next_id))
    }

    fn poll_task(&self, task_id: &str) -> Result<ProviderTaskStatus> {
        let mut state = self.lock()?;
        *state.poll_calls.entry(task_id.to_string()).or_default() += 1;

        let outcome = match state.scripts.get_mut(task_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match outcome.unwrap_or(ScriptedPoll::Pending(0)) {
            ScriptedPoll::Pending(progress) => Ok(ProviderTaskStatus::Pending { progress }),
            ScriptedPoll::Succeeded(url) => {
                let format = url
                    .rsplit('.')
                    .next()
                    .filter(|ext| !ext.contains('/'))
                    .unwrap_or("glb")
                    .to_string();
                Ok(ProviderTaskStatus::Succeeded {
                    model_urls: [(format, url)].into_iter().collect(),
                })
            }
            ScriptedPoll::Failed(message) => Ok(ProviderTaskStatus::Failed { message }),
            ScriptedPoll::Transient => Err(PetcastError::TransientProvider(format!(
                "scripted outage while polling {}",
                task_id
            ))),
        }
    }
}
