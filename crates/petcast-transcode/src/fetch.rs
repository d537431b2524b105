//! Source asset fetching

use petcast_core::config::TranscodeConfig;
use petcast_core::{PetcastError, Result};
use std::time::Duration;

/// Retrieves the bytes of a source asset
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP fetcher with a global timeout and a body size limit.
/// Redirects are not followed, so only the allow-listed URL is ever read.
pub struct HttpFetcher {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .max_redirects(0)
            .build();
        Self {
            agent: config.into(),
            max_bytes,
        }
    }

    pub fn from_config(config: &TranscodeConfig) -> Self {
        Self::new(
            Duration::from_secs(config.fetch_timeout_secs),
            config.max_asset_bytes,
        )
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| PetcastError::FetchFailed(format!("GET {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(PetcastError::FetchFailed(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        response
            .body_mut()
            .with_config()
            .limit(self.max_bytes)
            .read_to_vec()
            .map_err(|e| match e {
                ureq::Error::BodyExceedsLimit(limit) => PetcastError::FetchFailed(format!(
                    "{} is larger than the {} byte limit",
                    url, limit
                )),
                other => PetcastError::FetchFailed(format!("Reading {} failed: {}", url, other)),
            })
    }
}
