//! The asset transcoding pipeline
//!
//! fetch → decode → textures → weld → dedup → quantize → encode
//!
//! Only URLs under an allow-listed prefix are accepted. Once a URL is
//! accepted, every later failure turns into a redirect to the original
//! asset so the client can still load the uncompressed model.

use crate::decode::decode_gltf;
use crate::dedup::{dedup_document, DedupReport};
use crate::encode::encode_glb;
use crate::fetch::{AssetFetcher, HttpFetcher};
use crate::quantize::{quantize_document, QuantizeReport};
use crate::textures::{process_textures, TextureReport};
use crate::weld::{weld_document, WeldReport};
use petcast_core::config::TranscodeConfig;
use petcast_core::{PetcastError, Result};
use std::sync::Arc;

pub const GLB_CONTENT_TYPE: &str = "model/gltf-binary";

/// What each stage did to the model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodeReport {
    pub vertices_before: usize,
    pub vertices_after: usize,
    pub triangles_after: usize,
    pub textures: TextureReport,
    pub weld: WeldReport,
    pub dedup: DedupReport,
    pub quantize: QuantizeReport,
}

/// A compressed GLB ready to serve
#[derive(Debug, Clone)]
pub struct TranscodedAsset {
    pub bytes: Vec<u8>,
    pub original_size: usize,
    pub content_type: &'static str,
    pub cache_control: String,
    pub report: TranscodeReport,
}

impl TranscodedAsset {
    pub fn compressed_size(&self) -> usize {
        self.bytes.len()
    }

    /// Fraction of the original size saved, 0.0 when nothing was saved
    pub fn savings(&self) -> f64 {
        if self.original_size == 0 || self.bytes.len() >= self.original_size {
            return 0.0;
        }
        1.0 - self.bytes.len() as f64 / self.original_size as f64
    }
}

/// Result of a transcode request for an accepted URL
#[derive(Debug, Clone)]
pub enum TranscodeOutcome {
    Transcoded(TranscodedAsset),
    /// Serve the original asset instead
    Redirect { url: String, reason: String },
}

pub struct AssetPipeline {
    config: TranscodeConfig,
    fetcher: Arc<dyn AssetFetcher>,
    prefixes: Vec<String>,
}

impl AssetPipeline {
    pub fn new(config: TranscodeConfig, fetcher: Arc<dyn AssetFetcher>) -> Self {
        let prefixes = config
            .allowed_prefixes
            .iter()
            .map(|p| normalize_prefix(p))
            .collect();
        Self {
            config,
            fetcher,
            prefixes,
        }
    }

    /// Pipeline backed by the HTTP fetcher
    pub fn from_config(config: &TranscodeConfig) -> Self {
        Self::new(config.clone(), Arc::new(HttpFetcher::from_config(config)))
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    pub fn allowed_prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        self.prefixes.iter().any(|p| url.starts_with(p.as_str()))
    }

    /// Fetch and transcode the asset at `url`. Only a URL outside the
    /// allow-list is an error.
    pub fn transcode(&self, url: &str) -> Result<TranscodeOutcome> {
        if !self.is_allowed(url) {
            return Err(PetcastError::InvalidSource(format!(
                "{} is not under an allowed asset prefix",
                url
            )));
        }

        let source = match self.fetcher.fetch(url) {
            Ok(bytes) => bytes,
            Err(e) => return Ok(redirect(url, e)),
        };

        match self.transcode_bytes(&source) {
            Ok(asset) => {
                log::info!(
                    "Transcoded {}: {} -> {} bytes ({:.1}% smaller), {} -> {} vertices",
                    url,
                    asset.original_size,
                    asset.compressed_size(),
                    asset.savings() * 100.0,
                    asset.report.vertices_before,
                    asset.report.vertices_after
                );
                Ok(TranscodeOutcome::Transcoded(asset))
            }
            Err(e) => Ok(redirect(url, e)),
        }
    }

    /// Run decode through encode on an asset already in memory
    pub fn transcode_bytes(&self, source: &[u8]) -> Result<TranscodedAsset> {
        let mut doc = decode_gltf(source)?;
        let vertices_before = doc.vertex_count();

        let textures = process_textures(&mut doc, &self.config);
        let weld = weld_document(&mut doc, self.config.weld_tolerance);
        let dedup = dedup_document(&mut doc);
        let quantize = quantize_document(&mut doc, &self.config);
        let bytes = encode_glb(&doc)?;

        log::debug!(
            "weld removed {} degenerate triangles, dedup merged {} items, {} streams quantized",
            weld.degenerate_removed,
            dedup.total(),
            quantize.total()
        );

        Ok(TranscodedAsset {
            bytes,
            original_size: source.len(),
            content_type: GLB_CONTENT_TYPE,
            cache_control: format!("public, max-age={}", self.config.cache_max_age),
            report: TranscodeReport {
                vertices_before,
                vertices_after: doc.vertex_count(),
                triangles_after: doc.triangle_count(),
                textures,
                weld,
                dedup,
                quantize,
            },
        })
    }
}

fn redirect(url: &str, error: PetcastError) -> TranscodeOutcome {
    log::warn!("Serving original {}: {}", url, error);
    TranscodeOutcome::Redirect {
        url: url.to_string(),
        reason: error.to_string(),
    }
}

/// Make sure a prefix that names a host ends at the host boundary, so
/// `https://assets.meshy.ai` does not admit `https://assets.meshy.ai.evil.com`
pub fn normalize_prefix(prefix: &str) -> String {
    let has_host = prefix
        .split_once("://")
        .is_some_and(|(_, rest)| !rest.is_empty());
    if has_host && !prefix.ends_with('/') {
        format!("{}/", prefix)
    } else {
        prefix.to_string()
    }
}
