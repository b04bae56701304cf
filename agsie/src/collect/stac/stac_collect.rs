use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collect::global_variables::{DATETIME_PROPERTY, NIR_ASSET_ALIAS, RED_ASSET_ALIAS};
use crate::error::{AnalysisError, Result};
use crate::geo_core::BoundingBox;

#[cfg(feature = "reqwest")]
pub use self::client::StacCollect;

/// One satellite acquisition and the locators of the bands the pipeline reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteScene {
    pub id: String,
    pub acquired_at: DateTime<Utc>,
    pub red_href: String,
    pub nir_href: String,
}

/// Imagery catalog able to name the most recent scene over a bounding box
#[async_trait]
pub trait SceneCatalog: Send + Sync {
    /// Fails with `SceneNotFound` when nothing intersects the box
    async fn search_latest(&self, bbox: &BoundingBox) -> Result<SatelliteScene>;
}

/// STAC API `/search` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StacSearchRequest {
    pub collections: Vec<String>,
    pub bbox: [f64; 4],
    pub limit: u32,
    pub sortby: Vec<StacSortBy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StacSortBy {
    pub field: String,
    pub direction: String,
}

impl StacSearchRequest {
    /// Newest single scene of `collection` intersecting `bbox`
    pub fn latest(collection: &str, bbox: &BoundingBox) -> Self {
        StacSearchRequest {
            collections: vec![collection.to_string()],
            bbox: bbox.to_stac_bbox(),
            limit: 1,
            sortby: vec![StacSortBy {
                field: DATETIME_PROPERTY.to_string(),
                direction: "desc".to_string(),
            }],
        }
    }
}

/// STAC ItemCollection, reduced to what the pipeline reads
#[derive(Debug, Deserialize)]
pub struct StacItemCollection {
    #[serde(default)]
    pub features: Vec<StacItem>,
}

#[derive(Debug, Deserialize)]
pub struct StacItem {
    pub id: String,
    pub properties: StacProperties,
    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,
}

#[derive(Debug, Deserialize)]
pub struct StacProperties {
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
    /// Set instead of `datetime` for items spanning an interval
    #[serde(default)]
    pub start_datetime: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StacAsset {
    pub href: String,
}

impl StacItem {
    fn asset_href(&self, key: &str, alias: &str) -> Option<&str> {
        self.assets
            .get(key)
            .or_else(|| self.assets.get(alias))
            .map(|a| a.href.as_str())
    }
}

/// First feature of a search answer as a [`SatelliteScene`]
///
/// The request asks the catalog for one item sorted newest first, so the first
/// feature is the latest acquisition.
pub fn parse_latest_scene(
    collection: StacItemCollection,
    red_asset: &str,
    nir_asset: &str,
) -> Result<SatelliteScene> {
    let item = collection
        .features
        .into_iter()
        .next()
        .ok_or(AnalysisError::SceneNotFound)?;

    let acquired_at = item
        .properties
        .datetime
        .or(item.properties.start_datetime)
        .ok_or_else(|| {
            AnalysisError::CatalogUnavailable(format!("scene {} has no acquisition time", item.id))
        })?;

    let red_href = item
        .asset_href(red_asset, RED_ASSET_ALIAS)
        .ok_or_else(|| missing_asset(&item.id, red_asset))?
        .to_string();
    let nir_href = item
        .asset_href(nir_asset, NIR_ASSET_ALIAS)
        .ok_or_else(|| missing_asset(&item.id, nir_asset))?
        .to_string();

    Ok(SatelliteScene {
        id: item.id,
        acquired_at,
        red_href,
        nir_href,
    })
}

fn missing_asset(scene_id: &str, key: &str) -> AnalysisError {
    AnalysisError::CatalogUnavailable(format!("scene {scene_id} has no '{key}' asset"))
}

#[cfg(feature = "reqwest")]
mod client {
    use std::sync::Arc;

    use anyhow::Context;
    use async_trait::async_trait;
    use reqwest::Client;
    use tracing::{debug, info, instrument};

    use super::{parse_latest_scene, SatelliteScene, SceneCatalog, StacItemCollection, StacSearchRequest};
    use crate::commons::config::PipelineConfig;
    use crate::commons::host_limiter::HostLimiter;
    use crate::commons::retry::{with_retry, RetryPolicy};
    use crate::error::{AnalysisError, Result};
    use crate::geo_core::BoundingBox;

    /// STAC API client searching one collection
    pub struct StacCollect {
        client: Client,
        catalog_url: String,
        collection: String,
        red_asset: String,
        nir_asset: String,
        limiter: Arc<HostLimiter>,
        retry: RetryPolicy,
    }

    impl StacCollect {
        pub fn new(config: &PipelineConfig, limiter: Arc<HostLimiter>) -> anyhow::Result<Self> {
            url::Url::parse(&config.catalog_url)
                .with_context(|| format!("Invalid catalog URL: {}", config.catalog_url))?;

            let client = Client::builder()
                .timeout(config.request_timeout())
                .pool_max_idle_per_host(limiter.permits_per_host())
                .build()
                .context("Failed to create HTTP client")?;

            Ok(StacCollect {
                client,
                catalog_url: config.catalog_url.clone(),
                collection: config.collection.clone(),
                red_asset: config.red_asset.clone(),
                nir_asset: config.nir_asset.clone(),
                limiter,
                retry: config.retry_policy(),
            })
        }

        async fn search_once(&self, request: &StacSearchRequest) -> Result<SatelliteScene> {
            let _permit = self
                .limiter
                .acquire(&self.catalog_url)
                .await
                .map_err(|e| AnalysisError::CatalogUnavailable(format!("host limiter closed: {e}")))?;

            let response = self
                .client
                .post(&self.catalog_url)
                .json(request)
                .send()
                .await
                .map_err(|e| AnalysisError::CatalogUnavailable(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AnalysisError::CatalogUnavailable(format!(
                    "catalog returned {status}: {body}"
                )));
            }

            let collection: StacItemCollection = response
                .json()
                .await
                .map_err(|e| AnalysisError::CatalogUnavailable(format!("unreadable response: {e}")))?;

            parse_latest_scene(collection, &self.red_asset, &self.nir_asset)
        }
    }

    #[async_trait]
    impl SceneCatalog for StacCollect {
        #[instrument(skip(self), fields(collection = %self.collection))]
        async fn search_latest(&self, bbox: &BoundingBox) -> Result<SatelliteScene> {
            let request = StacSearchRequest::latest(&self.collection, bbox);
            debug!(url = %self.catalog_url, bbox = ?request.bbox, "Searching catalog");

            let scene = with_retry(
                &self.retry,
                "catalog search",
                |deadline| AnalysisError::CatalogUnavailable(format!("search timed out after {deadline:?}")),
                || self.search_once(&request),
            )
            .await?;

            info!(scene = %scene.id, acquired_at = %scene.acquired_at, "Latest scene found");
            Ok(scene)
        }
    }
}
