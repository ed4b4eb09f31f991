//! Inventory Snapshot Provider
//!
//! Serves region and resource listings from an exported JSON inventory, so
//! scans can run offline against a captured account state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::error::ProviderError;
use super::providers::{RegionEnumerator, RegionInfo, ResourceFetcher};
use super::types::{Filters, Resource, GLOBAL_REGION};

/// Captured account state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub regions: Vec<RegionInfo>,
    /// Account-wide resources carry the region `global`
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl InventorySnapshot {
    /// Load a snapshot from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory file: {:?}", path))?;
        let snapshot: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid inventory file: {:?}", path))?;

        info!(
            regions = snapshot.regions.len(),
            resources = snapshot.resources.len(),
            "Loaded inventory snapshot"
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl RegionEnumerator for InventorySnapshot {
    async fn describe_regions(&self) -> Result<Vec<RegionInfo>, ProviderError> {
        Ok(self.regions.clone())
    }
}

/// Per-region view of a snapshot
pub struct InventoryClient {
    snapshot: Arc<InventorySnapshot>,
    region: String,
    serves_global: bool,
}

impl InventoryClient {
    /// Client for `region`; the global API region also answers for `global`
    pub fn new(snapshot: Arc<InventorySnapshot>, region: &str, global_api_region: &str) -> Self {
        Self {
            snapshot,
            region: region.to_string(),
            serves_global: region == global_api_region,
        }
    }

    fn serves(&self, region: &str) -> bool {
        region == self.region || (self.serves_global && region == GLOBAL_REGION)
    }
}

#[async_trait]
impl ResourceFetcher for InventoryClient {
    async fn fetch(
        &self,
        resource_type: &str,
        _filters: &Filters,
    ) -> Result<Vec<Resource>, ProviderError> {
        Ok(self
            .snapshot
            .resources
            .iter()
            .filter(|r| r.resource_type == resource_type && self.serves(&r.region))
            .cloned()
            .collect())
    }
}
