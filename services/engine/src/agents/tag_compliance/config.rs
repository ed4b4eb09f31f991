//! Scanner Configuration
//!
//! A single configuration value built at startup and handed to every
//! component: region defaults, fan-out limits, timeouts, retry policy,
//! cache TTLs and the resource type catalog.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use super::error::{ComplianceError, ScanResult};

/// Resource type sentinel that expands to every cost-generating type
pub const ALL_RESOURCE_TYPES: &str = "all";

/// Properties of one scannable resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTypeSpec {
    /// Namespaced type, e.g. `ec2:instance`
    pub name: String,
    /// Account-wide and served from a single API region
    #[serde(default)]
    pub global: bool,
    /// Taggable but carries no direct cost
    #[serde(default)]
    pub free: bool,
    /// Estimated monthly cost of one resource
    #[serde(default)]
    pub monthly_cost_estimate: f64,
}

impl ResourceTypeSpec {
    fn new(name: &str, global: bool, free: bool, monthly_cost_estimate: f64) -> Self {
        Self {
            name: name.to_string(),
            global,
            free,
            monthly_cost_estimate,
        }
    }
}

/// Known resource types and their classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTypeCatalog {
    pub types: Vec<ResourceTypeSpec>,
}

impl Default for ResourceTypeCatalog {
    fn default() -> Self {
        Self {
            types: vec![
                ResourceTypeSpec::new("ec2:instance", false, false, 70.0),
                ResourceTypeSpec::new("ec2:volume", false, false, 10.0),
                ResourceTypeSpec::new("ec2:natgateway", false, false, 32.0),
                ResourceTypeSpec::new("ec2:elastic_ip", false, false, 3.6),
                ResourceTypeSpec::new("rds:db", false, false, 120.0),
                ResourceTypeSpec::new("lambda:function", false, false, 5.0),
                ResourceTypeSpec::new("ecs:service", false, false, 45.0),
                ResourceTypeSpec::new("eks:cluster", false, false, 73.0),
                ResourceTypeSpec::new("elasticache:cluster", false, false, 50.0),
                ResourceTypeSpec::new("dynamodb:table", false, false, 25.0),
                ResourceTypeSpec::new("elasticloadbalancing:loadbalancer", false, false, 22.0),
                ResourceTypeSpec::new("opensearch:domain", false, false, 90.0),
                ResourceTypeSpec::new("s3:bucket", true, false, 23.0),
                ResourceTypeSpec::new("cloudfront:distribution", true, false, 15.0),
                ResourceTypeSpec::new("route53:hostedzone", true, false, 0.5),
                ResourceTypeSpec::new("ec2:vpc", false, true, 0.0),
                ResourceTypeSpec::new("ec2:subnet", false, true, 0.0),
                ResourceTypeSpec::new("ec2:security_group", false, true, 0.0),
                ResourceTypeSpec::new("iam:role", true, true, 0.0),
                ResourceTypeSpec::new("logs:log_group", false, true, 0.0),
            ],
        }
    }
}

impl ResourceTypeCatalog {
    fn spec(&self, resource_type: &str) -> Option<&ResourceTypeSpec> {
        self.types.iter().find(|t| t.name == resource_type)
    }

    /// Types expanded from the `all` sentinel
    pub fn cost_generating_types(&self) -> Vec<String> {
        self.types
            .iter()
            .filter(|t| !t.free)
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn is_global(&self, resource_type: &str) -> bool {
        self.spec(resource_type).map(|t| t.global).unwrap_or(false)
    }

    pub fn is_free(&self, resource_type: &str) -> bool {
        self.spec(resource_type).map(|t| t.free).unwrap_or(false)
    }

    /// Monthly cost of one resource; unknown types cost nothing
    pub fn cost_estimate(&self, resource_type: &str) -> f64 {
        self.spec(resource_type)
            .map(|t| t.monthly_cost_estimate)
            .unwrap_or(0.0)
    }

    /// Split into (global, regional), preserving order
    pub fn partition(&self, resource_types: &[String]) -> (Vec<String>, Vec<String>) {
        resource_types
            .iter()
            .cloned()
            .partition(|t| self.is_global(t))
    }
}

/// Exponential backoff with jitter for transient upstream failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random extra delay, as a fraction of the delay
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry number `attempt`, with up to `jitter` extra
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        delay + delay.mul_f64(extra)
    }
}

/// Configuration for the multi-region tag compliance scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Region used when discovery fails
    pub default_region: String,
    /// Region through which global resources are addressed
    pub global_api_region: String,
    /// Infrastructure-level region allow-list
    pub allowed_regions: Option<Vec<String>>,
    pub max_concurrent_regions: usize,
    /// Concurrency when scanning the expanded `all` type set
    pub max_concurrent_regions_all: usize,
    pub region_timeout: Duration,
    /// Per-region timeout when scanning the expanded `all` type set
    pub region_timeout_all: Duration,
    /// Regional types are scanned in groups of this size
    pub resource_type_chunk_size: usize,
    /// Pause between regional type groups
    pub chunk_pause: Duration,
    pub retry: RetryPolicy,
    pub result_cache_ttl: Duration,
    pub region_cache_ttl: Duration,
    pub catalog: ResourceTypeCatalog,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            default_region: "us-east-1".to_string(),
            global_api_region: "us-east-1".to_string(),
            allowed_regions: None,
            max_concurrent_regions: 5,
            max_concurrent_regions_all: 8,
            region_timeout: Duration::from_secs(60),
            region_timeout_all: Duration::from_secs(180),
            resource_type_chunk_size: 10,
            chunk_pause: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            result_cache_ttl: Duration::from_secs(3600),
            region_cache_ttl: Duration::from_secs(86400),
            catalog: ResourceTypeCatalog::default(),
        }
    }
}

impl ScannerConfig {
    /// Defaults overlaid with `TAGSCAN_*` environment variables
    pub fn from_env() -> ScanResult<Self> {
        let mut config = Self::default();

        if let Ok(region) = env::var("TAGSCAN_DEFAULT_REGION") {
            config.default_region = region;
        }
        if let Ok(regions) = env::var("TAGSCAN_ALLOWED_REGIONS") {
            config.allowed_regions = parse_region_list(&regions);
        }
        if let Some(n) = env_parse::<usize>("TAGSCAN_MAX_CONCURRENT_REGIONS")? {
            if n == 0 {
                return Err(ComplianceError::Config(
                    "TAGSCAN_MAX_CONCURRENT_REGIONS must be at least 1".to_string(),
                ));
            }
            config.max_concurrent_regions = n;
        }
        if let Some(secs) = env_parse::<u64>("TAGSCAN_REGION_TIMEOUT_SECS")? {
            config.region_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("TAGSCAN_RESULT_CACHE_TTL_SECS")? {
            config.result_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("TAGSCAN_REGION_CACHE_TTL_SECS")? {
            config.region_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(retries) = env_parse::<u32>("TAGSCAN_MAX_RETRIES")? {
            config.retry.max_retries = retries;
        }

        Ok(config)
    }

    /// Replace `all` with every cost-generating type; reports whether it did
    pub fn expand_resource_types(&self, resource_types: &[String]) -> (Vec<String>, bool) {
        if resource_types.iter().any(|t| t == ALL_RESOURCE_TYPES) {
            (self.catalog.cost_generating_types(), true)
        } else {
            (resource_types.to_vec(), false)
        }
    }

    /// (concurrency, per-region timeout) for a scan
    pub fn fan_out_limits(&self, all_types: bool) -> (usize, Duration) {
        if all_types {
            (self.max_concurrent_regions_all.max(1), self.region_timeout_all)
        } else {
            (self.max_concurrent_regions.max(1), self.region_timeout)
        }
    }
}

/// Comma-separated list; empty input means no restriction
pub fn parse_region_list(value: &str) -> Option<Vec<String>> {
    let regions: Vec<String> = value
        .split(',')
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    if regions.is_empty() {
        None
    } else {
        Some(regions)
    }
}

fn env_parse<T: FromStr>(name: &str) -> ScanResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ComplianceError::Config(format!("{} has invalid value {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_expands_to_cost_generating_types() {
        let config = ScannerConfig::default();
        let (types, expanded) = config.expand_resource_types(&["all".to_string()]);

        assert!(expanded);
        assert!(types.contains(&"ec2:instance".to_string()));
        assert!(types.contains(&"s3:bucket".to_string()));
        assert!(!types.contains(&"ec2:vpc".to_string()));
    }

    #[test]
    fn test_partition_global_types() {
        let catalog = ResourceTypeCatalog::default();
        let (global, regional) = catalog.partition(&[
            "ec2:instance".to_string(),
            "s3:bucket".to_string(),
            "route53:hostedzone".to_string(),
            "rds:db".to_string(),
        ]);

        assert_eq!(global, vec!["s3:bucket", "route53:hostedzone"]);
        assert_eq!(regional, vec!["ec2:instance", "rds:db"]);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter: 0.25,
        };

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));

        let jittered = policy.delay_for(1);
        assert!(jittered >= Duration::from_millis(200));
        assert!(jittered <= Duration::from_millis(250));
    }

    #[test]
    fn test_fan_out_limits() {
        let config = ScannerConfig::default();
        assert_eq!(config.fan_out_limits(false), (5, Duration::from_secs(60)));
        assert_eq!(config.fan_out_limits(true), (8, Duration::from_secs(180)));
    }

    #[test]
    fn test_parse_region_list() {
        assert_eq!(
            parse_region_list("us-east-1, eu-west-1,"),
            Some(vec!["us-east-1".to_string(), "eu-west-1".to_string()])
        );
        assert_eq!(parse_region_list(" , "), None);
    }
}
