use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::collect::global_variables::{
    NDVI_DECIMALS, NIR_ASSET, RED_ASSET, SENTINEL2_COLLECTION, STAC_URL,
};
use crate::commons::retry::RetryPolicy;

/// Tunables of the analysis pipeline, handed to each component at construction
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// STAC `/search` endpoint
    pub catalog_url: String,
    pub collection: String,
    pub red_asset: String,
    pub nir_asset: String,
    /// Per-attempt timeout of a catalog search or a band read
    pub request_timeout_secs: u64,
    /// Attempts per network call, first one included
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Concurrent requests allowed against one host
    pub per_host_concurrency: usize,
    pub ndvi_decimals: u32,
    /// Forces a nodata value when the band does not declare one
    pub nodata_override: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            catalog_url: STAC_URL.to_string(),
            collection: SENTINEL2_COLLECTION.to_string(),
            red_asset: RED_ASSET.to_string(),
            nir_asset: NIR_ASSET.to_string(),
            request_timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            per_host_concurrency: 4,
            ndvi_decimals: NDVI_DECIMALS,
            nodata_override: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `AGSIE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = PipelineConfig::default();

        if let Ok(url) = env::var("AGSIE_CATALOG_URL") {
            url::Url::parse(&url).with_context(|| format!("AGSIE_CATALOG_URL is not a URL: {url}"))?;
            config.catalog_url = url;
        }
        if let Ok(collection) = env::var("AGSIE_COLLECTION") {
            config.collection = collection;
        }
        if let Ok(asset) = env::var("AGSIE_RED_ASSET") {
            config.red_asset = asset;
        }
        if let Ok(asset) = env::var("AGSIE_NIR_ASSET") {
            config.nir_asset = asset;
        }
        if let Some(v) = parse_env("AGSIE_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout_secs = v;
        }
        if let Some(v) = parse_env("AGSIE_MAX_ATTEMPTS")? {
            config.max_attempts = v;
        }
        if let Some(v) = parse_env("AGSIE_INITIAL_BACKOFF_MS")? {
            config.initial_backoff_ms = v;
        }
        if let Some(v) = parse_env("AGSIE_MAX_BACKOFF_MS")? {
            config.max_backoff_ms = v;
        }
        if let Some(v) = parse_env("AGSIE_PER_HOST_CONCURRENCY")? {
            config.per_host_concurrency = v;
        }
        if let Some(v) = parse_env("AGSIE_NDVI_DECIMALS")? {
            config.ndvi_decimals = v;
        }
        if let Some(v) = parse_env("AGSIE_NODATA")? {
            config.nodata_override = Some(v);
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            attempt_timeout: self.request_timeout(),
        }
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid value for {key}: {raw}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.collection, "sentinel-2-l2a");
        assert_eq!(config.red_asset, "B04");
        assert_eq!(config.nir_asset, "B08");
        assert_eq!(config.ndvi_decimals, 4);
        assert_eq!(config.retry_policy().max_attempts, 3);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"collection": "landsat-c2-l2", "max_attempts": 0}"#).unwrap();
        assert_eq!(config.collection, "landsat-c2-l2");
        assert_eq!(config.catalog_url, STAC_URL);
        // At least one attempt is always made
        assert_eq!(config.retry_policy().max_attempts, 1);
    }
}
