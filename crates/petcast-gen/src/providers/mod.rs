//! Provider registry
//!
//! Maps provider names to concrete implementations.

pub mod meshy;
pub mod scripted;

use crate::provider::ImageTo3dProvider;
use petcast_core::{PetcastConfig, PetcastError, Result};
use std::sync::Arc;

/// Create a provider by name with configuration
pub fn create_provider(name: &str, config: &PetcastConfig) -> Result<Arc<dyn ImageTo3dProvider>> {
    match name {
        "scripted" => Ok(Arc::new(scripted::ScriptedProvider::new())),
        "meshy" => Ok(Arc::new(meshy::MeshyProvider::from_config(config)?)),
        _ => Err(PetcastError::ConfigError(format!(
            "Unknown provider '{}'. Available: {}",
            name,
            available_providers().join(", ")
        ))),
    }
}

/// List all available provider names
pub fn available_providers() -> Vec<&'static str> {
    vec!["meshy", "scripted"]
}
