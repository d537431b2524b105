//! Task registry
//!
//! The registry is the only shared mutable state of the task manager. It is
//! volatile: every record is lost when the process exits. A durable store can
//! replace `InMemoryTaskRegistry` by implementing `TaskRepository`.

use petcast_core::{PetcastError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::task::GenerationTask;

/// Keyed storage for generation tasks with optimistic concurrency
pub trait TaskRepository: Send + Sync {
    /// Fetch a snapshot of a task
    fn get(&self, task_id: &str) -> Result<Option<GenerationTask>>;

    /// Store a new task, replacing any record with the same id
    fn insert(&self, task: GenerationTask) -> Result<()>;

    /// Store `task` only if the stored record still has `expected_revision`.
    /// On success the stored copy carries `expected_revision + 1`.
    fn compare_and_swap(&self, expected_revision: u64, task: GenerationTask) -> Result<bool>;

    /// Number of tracked tasks
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Process-local task registry
#[derive(Default)]
pub struct InMemoryTaskRegistry {
    tasks: Mutex<HashMap<String, GenerationTask>>,
}

impl InMemoryTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, GenerationTask>>> {
        self.tasks
            .lock()
            .map_err(|_| PetcastError::RegistryError("task registry lock poisoned".to_string()))
    }
}

impl TaskRepository for InMemoryTaskRegistry {
    fn get(&self, task_id: &str) -> Result<Option<GenerationTask>> {
        Ok(self.lock()?.get(task_id).cloned())
    }

    fn insert(&self, mut task: GenerationTask) -> Result<()> {
        task.revision = 0;
        self.lock()?.insert(task.task_id.clone(), task);
        Ok(())
    }

    fn compare_and_swap(&self, expected_revision: u64, mut task: GenerationTask) -> Result<bool> {
        let mut tasks = self.lock()?;
        let current = tasks
            .get_mut(&task.task_id)
            .ok_or_else(|| PetcastError::TaskNotFound(task.task_id.clone()))?;
        if current.revision != expected_revision {
            return Ok(false);
        }
        task.revision = expected_revision + 1;
        *current = task;
        Ok(true)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}
