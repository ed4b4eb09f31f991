//! External Collaborator Interfaces
//!
//! Trait-based abstractions for the pieces the scanner consumes but does not
//! own: per-type resource fetchers, the tag-policy evaluator, the key-value
//! cache store and the region enumeration API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::error::ProviderError;
use super::types::{Filters, Resource, Violation};

/// Opt-in statuses of regions that are usable by the account
pub const ENABLED_OPT_IN_STATUSES: &[&str] = &["opt-in-not-required", "opted-in"];

/// Trait for fetching tagged resources of one type within one region
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch all resources of `resource_type`.
    ///
    /// Returns an empty list when nothing matches; errors are reserved for
    /// hard failures.
    async fn fetch(
        &self,
        resource_type: &str,
        filters: &Filters,
    ) -> Result<Vec<Resource>, ProviderError>;
}

/// Trait for checking a resource's tags against the organizational policy
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn validate(
        &self,
        resource_id: &str,
        resource_type: &str,
        region: &str,
        tags: &BTreeMap<String, String>,
        cost_impact: f64,
    ) -> Vec<Violation>;
}

/// Key-value store with TTL.
///
/// Implementations fail soft: an unreachable backend reads as a miss and
/// writes report `false`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool;

    async fn delete(&self, key: &str) -> bool;

    async fn clear(&self) -> bool;
}

/// Region as reported by the enumeration API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub region_name: String,
    pub opt_in_status: String,
}

impl RegionInfo {
    pub fn new(region_name: &str, opt_in_status: &str) -> Self {
        Self {
            region_name: region_name.to_string(),
            opt_in_status: opt_in_status.to_string(),
        }
    }

    /// Whether the account can use this region
    pub fn is_enabled(&self) -> bool {
        ENABLED_OPT_IN_STATUSES.contains(&self.opt_in_status.as_str())
    }
}

/// Trait for listing the regions known to the account
#[async_trait]
pub trait RegionEnumerator: Send + Sync {
    async fn describe_regions(&self) -> Result<Vec<RegionInfo>, ProviderError>;
}
