use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Caps the number of concurrent requests sent to any single host
///
/// Hosts are keyed by the authority of the request URL; locators that are
/// not URLs (local paths, GDAL virtual paths without a host) share one slot pool.
#[derive(Debug)]
pub struct HostLimiter {
    permits_per_host: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostLimiter {
    pub fn new(permits_per_host: usize) -> Self {
        HostLimiter {
            permits_per_host: permits_per_host.max(1),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn permits_per_host(&self) -> usize {
        self.permits_per_host
    }

    /// Wait for a free slot on the host of `locator`. The slot is released when the permit drops.
    pub async fn acquire(&self, locator: &str) -> Result<OwnedSemaphorePermit, AcquireError> {
        let host = host_key(locator);
        let semaphore = {
            let mut hosts = self.hosts.lock();
            hosts
                .entry(host.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(self.permits_per_host)))
                .clone()
        };
        debug!(host = %host, available = semaphore.available_permits(), "Waiting for host slot");
        semaphore.acquire_owned().await
    }
}

/// Host part of a URL, `/vsicurl/` prefix stripped
pub fn host_key(locator: &str) -> String {
    let trimmed = locator.strip_prefix("/vsicurl/").unwrap_or(locator);
    url::Url::parse(trimmed)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "local".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_key() {
        assert_eq!(
            host_key("https://earth-search.aws.element84.com/v1/search"),
            "earth-search.aws.element84.com"
        );
        assert_eq!(
            host_key("/vsicurl/https://sentinel-cogs.s3.us-west-2.amazonaws.com/B04.tif"),
            "sentinel-cogs.s3.us-west-2.amazonaws.com"
        );
        assert_eq!(host_key("/data/B04.tif"), "local");
    }

    #[tokio::test]
    async fn test_caps_concurrency_per_host() {
        let limiter = HostLimiter::new(2);
        let a = limiter.acquire("https://a.example.com/1").await.unwrap();
        let _b = limiter.acquire("https://a.example.com/2").await.unwrap();

        // Third request on the same host has to wait
        let third = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            limiter.acquire("https://a.example.com/3"),
        )
        .await;
        assert!(third.is_err());

        // Other hosts are unaffected
        let _c = limiter.acquire("https://b.example.com/1").await.unwrap();

        drop(a);
        let _d = limiter.acquire("https://a.example.com/3").await.unwrap();
    }
}
