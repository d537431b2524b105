//! Configuration loading and display

use anyhow::{Context, Result};
use petcast_core::config::PetcastConfigFile;
use petcast_core::PetcastConfig;
use petcast_gen::TaskManager;
use std::path::Path;

const REDACTED: &str = "<redacted>";

pub fn load(path: Option<&Path>) -> Result<PetcastConfig> {
    match path {
        Some(path) => PetcastConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => PetcastConfig::load().context("Failed to load config"),
    }
}

pub fn run(config: &PetcastConfig) -> Result<()> {
    let manager = TaskManager::from_config(config).context("Failed to set up task manager")?;
    println!("{}", provider_line(&manager));
    println!();
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

/// Provider health as a TOML comment line
fn provider_line(manager: &TaskManager) -> String {
    format!(
        "# provider: {} ({})",
        manager.provider_name().unwrap_or("none"),
        manager.provider_status()
    )
}

/// The resolved config as a file, with every secret replaced
fn redacted(config: &PetcastConfig) -> PetcastConfigFile {
    let mut providers = config.providers.clone();
    for provider in providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.to_string());
        }
    }
    let mut notify = config.notify.clone();
    if notify.resend_api_key.is_some() {
        notify.resend_api_key = Some(REDACTED.to_string());
    }
    PetcastConfigFile {
        providers,
        generation: config.generation.clone(),
        transcode: config.transcode.clone(),
        notify,
        server: config.server.clone(),
    }
}
