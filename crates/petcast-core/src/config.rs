//! Layered configuration system
//!
//! Config is loaded with three layers of precedence (highest wins):
//! 1. Environment variables: `PETCAST_{PROVIDER}_API_KEY` (or the bare
//!    `MESHY_API_KEY` / `RESEND_API_KEY`), `PETCAST_BIND`
//! 2. Project-local: `.petcast/config.toml`
//! 3. Global: `~/.petcast/config.toml`

use crate::{PetcastError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Provider-specific configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Task submission and polling policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Resubmissions allowed after provider-reported failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Consecutive transient poll errors tolerated before a task is failed.
    /// `None` keeps reporting "still polling" indefinitely.
    #[serde(default)]
    pub max_consecutive_transient_failures: Option<u32>,
    #[serde(default = "default_true")]
    pub enable_pbr: bool,
    #[serde(default)]
    pub should_remesh: bool,
    #[serde(default = "default_true")]
    pub require_contact: bool,
    /// Result formats in order of preference
    #[serde(default = "default_preferred_formats")]
    pub preferred_formats: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            max_retries: default_max_retries(),
            max_consecutive_transient_failures: None,
            enable_pbr: true,
            should_remesh: false,
            require_contact: true,
            preferred_formats: default_preferred_formats(),
        }
    }
}

fn default_provider() -> String {
    "meshy".to_string()
}
fn default_max_retries() -> u32 {
    2
}
fn default_preferred_formats() -> Vec<String> {
    vec!["glb".to_string(), "obj".to_string()]
}

/// What the pipeline does with embedded textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureMode {
    /// Drop textures, images, materials and UV sets (geometry only)
    Strip,
    /// Downscale and re-encode every texture
    Resize,
}

/// Asset transcoding pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeConfig {
    #[serde(default = "default_allowed_prefixes")]
    pub allowed_prefixes: Vec<String>,
    #[serde(default = "default_texture_mode")]
    pub texture_mode: TextureMode,
    #[serde(default = "default_max_texture_size")]
    pub max_texture_size: u32,
    #[serde(default = "default_texture_quality")]
    pub texture_quality: u8,
    /// Relative to the primitive's bounding-box diagonal for positions,
    /// absolute for the other attributes
    #[serde(default = "default_weld_tolerance")]
    pub weld_tolerance: f32,
    #[serde(default = "default_position_bits")]
    pub position_bits: u8,
    #[serde(default = "default_normal_bits")]
    pub normal_bits: u8,
    #[serde(default = "default_tex_coord_bits")]
    pub tex_coord_bits: u8,
    #[serde(default = "default_color_bits")]
    pub color_bits: u8,
    #[serde(default = "default_max_asset_bytes")]
    pub max_asset_bytes: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            allowed_prefixes: default_allowed_prefixes(),
            texture_mode: default_texture_mode(),
            max_texture_size: default_max_texture_size(),
            texture_quality: default_texture_quality(),
            weld_tolerance: default_weld_tolerance(),
            position_bits: default_position_bits(),
            normal_bits: default_normal_bits(),
            tex_coord_bits: default_tex_coord_bits(),
            color_bits: default_color_bits(),
            max_asset_bytes: default_max_asset_bytes(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            cache_max_age: default_cache_max_age(),
        }
    }
}

fn default_allowed_prefixes() -> Vec<String> {
    vec!["https://assets.meshy.ai/".to_string()]
}
fn default_texture_mode() -> TextureMode {
    TextureMode::Strip
}
fn default_max_texture_size() -> u32 {
    512
}
fn default_texture_quality() -> u8 {
    80
}
fn default_weld_tolerance() -> f32 {
    0.0001
}
fn default_position_bits() -> u8 {
    14
}
fn default_normal_bits() -> u8 {
    10
}
fn default_tex_coord_bits() -> u8 {
    12
}
fn default_color_bits() -> u8 {
    8
}
fn default_max_asset_bytes() -> u64 {
    64 * 1024 * 1024
}
fn default_fetch_timeout_secs() -> u64 {
    45
}
fn default_cache_max_age() -> u64 {
    3600
}

/// Ready-notification delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub resend_api_key: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
    /// Public origin used to build view links; falls back to the request host
    #[serde(default)]
    pub base_url: Option<String>,
    /// Send the notification from `poll` when a task first succeeds
    #[serde(default)]
    pub on_success: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            resend_api_key: None,
            from: default_from(),
            base_url: None,
            on_success: false,
        }
    }
}

fn default_from() -> String {
    "PetCast 3D <noreply@petcast3d.com>".to_string()
}

/// HTTP service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

/// Top-level config file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PetcastConfigFile {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Resolved configuration with environment variable overrides applied
#[derive(Debug, Clone, Default)]
pub struct PetcastConfig {
    pub providers: HashMap<String, ProviderConfig>,
    pub generation: GenerationConfig,
    pub transcode: TranscodeConfig,
    pub notify: NotifyConfig,
    pub server: ServerConfig,
}

impl PetcastConfig {
    /// Load config with layered precedence: global < project < env vars
    pub fn load() -> Result<Self> {
        let mut config = PetcastConfigFile::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                Self::merge_into(&mut config, global);
            }
        }

        let local_path = PathBuf::from(".petcast/config.toml");
        if local_path.exists() {
            let local = Self::load_file(&local_path)?;
            Self::merge_into(&mut config, local);
        }

        Self::apply_env_overrides(&mut config);
        Self::resolve(config)
    }

    /// Load config from a specific file path only (plus env overrides)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Self::resolve(config)
    }

    /// Get API key for a provider, ignoring blank values and disabled providers
    pub fn api_key(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .filter(|p| p.enabled)
            .and_then(|p| p.api_key.as_deref())
            .filter(|k| !k.trim().is_empty())
    }

    /// Get API URL override for a provider
    pub fn api_url(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.api_url.as_deref())
    }

    /// Check if a provider is enabled
    pub fn is_enabled(&self, provider_name: &str) -> bool {
        self.providers
            .get(provider_name)
            .map(|p| p.enabled)
            .unwrap_or(true)
    }

    /// Reject settings the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        let t = &self.transcode;
        check_bits("position_bits", t.position_bits, 8, 16)?;
        check_bits("normal_bits", t.normal_bits, 4, 16)?;
        check_bits("tex_coord_bits", t.tex_coord_bits, 4, 16)?;
        check_bits("color_bits", t.color_bits, 4, 16)?;
        if t.max_texture_size == 0 {
            return Err(PetcastError::ConfigError(
                "transcode.max_texture_size must be greater than 0".to_string(),
            ));
        }
        if !(1..=100).contains(&t.texture_quality) {
            return Err(PetcastError::ConfigError(format!(
                "transcode.texture_quality must be between 1 and 100, got {}",
                t.texture_quality
            )));
        }
        if !(t.weld_tolerance >= 0.0 && t.weld_tolerance.is_finite()) {
            return Err(PetcastError::ConfigError(
                "transcode.weld_tolerance must be a non-negative number".to_string(),
            ));
        }
        if t.allowed_prefixes.is_empty() {
            return Err(PetcastError::ConfigError(
                "transcode.allowed_prefixes must list at least one asset host".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve(file: PetcastConfigFile) -> Result<Self> {
        let config = PetcastConfig {
            providers: file.providers,
            generation: file.generation,
            transcode: file.transcode,
            notify: file.notify,
            server: file.server,
        };
        config.validate()?;
        Ok(config)
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".petcast").join("config.toml"))
    }

    fn load_file(path: &Path) -> Result<PetcastConfigFile> {
        let content = std::fs::read_to_string(path)?;
        let config: PetcastConfigFile = toml::from_str(&content).map_err(|e| {
            PetcastError::ConfigError(format!("Failed to parse config {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    fn merge_into(base: &mut PetcastConfigFile, overlay: PetcastConfigFile) {
        for (name, provider) in overlay.providers {
            let entry = base.providers.entry(name).or_default();
            if provider.api_key.is_some() {
                entry.api_key = provider.api_key;
            }
            if provider.api_url.is_some() {
                entry.api_url = provider.api_url;
            }
            entry.enabled = provider.enabled;
        }

        // Sections replace wholesale when the overlay changed anything.
        if overlay.generation != GenerationConfig::default() {
            base.generation = overlay.generation;
        }
        if overlay.transcode != TranscodeConfig::default() {
            base.transcode = overlay.transcode;
        }
        if overlay.notify.resend_api_key.is_some() {
            base.notify.resend_api_key = overlay.notify.resend_api_key;
        }
        if overlay.notify.base_url.is_some() {
            base.notify.base_url = overlay.notify.base_url;
        }
        if overlay.notify.from != default_from() {
            base.notify.from = overlay.notify.from;
        }
        if overlay.notify.on_success {
            base.notify.on_success = true;
        }
        if overlay.server != ServerConfig::default() {
            base.server = overlay.server;
        }
    }

    fn apply_env_overrides(config: &mut PetcastConfigFile) {
        for name in ["meshy"] {
            let prefixed = format!("PETCAST_{}_API_KEY", name.to_uppercase());
            let bare = format!("{}_API_KEY", name.to_uppercase());
            if let Some(key) = env_non_empty(&prefixed).or_else(|| env_non_empty(&bare)) {
                let entry = config.providers.entry(name.to_string()).or_default();
                entry.api_key = Some(key);
            }
        }
        if let Some(key) =
            env_non_empty("PETCAST_RESEND_API_KEY").or_else(|| env_non_empty("RESEND_API_KEY"))
        {
            config.notify.resend_api_key = Some(key);
        }
        if let Some(bind) = env_non_empty("PETCAST_BIND") {
            config.server.bind = bind;
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn check_bits(field: &str, value: u8, min: u8, max: u8) -> Result<()> {
    if value < min || value > max {
        return Err(PetcastError::ConfigError(format!(
            "transcode.{} must be between {} and {}, got {}",
            field, min, max, value
        )));
    }
    Ok(())
}
