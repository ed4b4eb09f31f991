//! Region Discovery
//!
//! Enumerates the regions enabled for the account and caches the list.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::cache::ENABLED_REGIONS_KEY;
use super::providers::{CacheStore, RegionEnumerator};

/// Outcome of region discovery.
///
/// When `discovery_failed` is set, `regions` holds only the default region
/// and must not be read as the account's full region set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDiscovery {
    pub regions: Vec<String>,
    pub discovery_failed: bool,
    pub discovery_error: Option<String>,
}

/// Discovers and caches enabled regions
pub struct RegionDiscoveryService {
    enumerator: Arc<dyn RegionEnumerator>,
    cache: Arc<dyn CacheStore>,
    default_region: String,
    cache_ttl: Duration,
}

impl RegionDiscoveryService {
    pub fn new(
        enumerator: Arc<dyn RegionEnumerator>,
        cache: Arc<dyn CacheStore>,
        default_region: &str,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            enumerator,
            cache,
            default_region: default_region.to_string(),
            cache_ttl,
        }
    }

    /// Enabled regions, sorted; degrades to the default region on failure
    pub async fn get_enabled_regions_with_status(&self) -> RegionDiscovery {
        if let Some(regions) = self.cached_regions().await {
            debug!(count = regions.len(), "Using cached region list");
            return RegionDiscovery {
                regions,
                discovery_failed: false,
                discovery_error: None,
            };
        }

        match self.enumerator.describe_regions().await {
            Ok(infos) => {
                let mut regions: Vec<String> = infos
                    .into_iter()
                    .filter(|r| r.is_enabled())
                    .map(|r| r.region_name)
                    .collect();
                regions.sort();
                regions.dedup();

                info!(count = regions.len(), "Discovered enabled regions");

                match serde_json::to_string(&regions) {
                    Ok(payload) => {
                        if !self
                            .cache
                            .set(ENABLED_REGIONS_KEY, &payload, self.cache_ttl)
                            .await
                        {
                            warn!("Failed to cache enabled regions");
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize region list"),
                }

                RegionDiscovery {
                    regions,
                    discovery_failed: false,
                    discovery_error: None,
                }
            }
            Err(e) => {
                error!(
                    error = %e,
                    default_region = %self.default_region,
                    "Region discovery failed, falling back to default region"
                );
                RegionDiscovery {
                    regions: vec![self.default_region.clone()],
                    discovery_failed: true,
                    discovery_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Enabled regions without the status flags
    pub async fn get_enabled_regions(&self) -> Vec<String> {
        self.get_enabled_regions_with_status().await.regions
    }

    /// Drop the cached region list
    pub async fn invalidate(&self) -> bool {
        self.cache.delete(ENABLED_REGIONS_KEY).await
    }

    async fn cached_regions(&self) -> Option<Vec<String>> {
        let raw = self.cache.get(ENABLED_REGIONS_KEY).await?;
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(regions) => Some(regions),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed cached region list");
                None
            }
        }
    }
}
