//! Multi-Region Tag Compliance Agent
//!
//! Scans cloud resources for required tags across every enabled region of an
//! account and reports a single aggregated compliance result.
//!
//! ## Architecture
//!
//! - **Pipeline**: fetch, validate and score one scope, with result caching
//! - **Discovery**: enabled-region enumeration with a cached, degradable answer
//! - **Clients**: one reusable API handle per region
//! - **Scanner**: global types once, regional types fanned out with bounded
//!   concurrency, per-region timeouts and retry
//!
//! External systems (cloud inventory, policy engine, cache backend) sit
//! behind the traits in [`providers`].

mod types;
mod error;
pub mod providers;
pub mod config;
pub mod cache;
pub mod clients;
pub mod discovery;
pub mod inventory;
pub mod pipeline;
pub mod policy;
pub mod scanner;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{compliance_cache_key, InMemoryCache};
pub use clients::{ClientSettings, RegionalClientFactory};
pub use config::{ResourceTypeCatalog, ResourceTypeSpec, RetryPolicy, ScannerConfig};
pub use discovery::{RegionDiscovery, RegionDiscoveryService};
pub use error::{ComplianceError, ProviderError, ScanResult};
pub use inventory::{InventoryClient, InventorySnapshot};
pub use pipeline::CompliancePipeline;
pub use policy::{RequiredTag, TagPolicy, TagPolicyEvaluator};
pub use providers::{CacheStore, PolicyEvaluator, RegionEnumerator, RegionInfo, ResourceFetcher};
pub use scanner::{MultiRegionScanner, RegionSelection, ScanRequest};
pub use types::*;
