//! PetCast Gen - image-to-3D generation task manager
//!
//! Submits customer photos to an image-to-3D provider (Meshy), tracks the
//! resulting tasks, resubmits failed generations and tells the customer
//! when a model is ready.

pub mod image_input;
pub mod manager;
pub mod notify;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod task;

pub use image_input::{validate_contact_address, ImagePayload};
pub use manager::{PollReport, PollStatus, SubmitOutcome, TaskManager};
pub use notify::{Notifier, NotifyOutcome, ReadyNotification};
pub use provider::{CreateOptions, ImageTo3dProvider, ProviderStatus, ProviderTaskStatus};
pub use registry::{InMemoryTaskRegistry, TaskRepository};
pub use task::{GenerationTask, TaskStatus, DEMO_TASK_ID};
