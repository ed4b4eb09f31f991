//! In-memory fakes of the external interfaces, shared by unit tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ProviderError;
use super::policy::{TagPolicy, TagPolicyEvaluator};
use super::providers::{CacheStore, RegionEnumerator, RegionInfo, ResourceFetcher};
use super::types::{Filters, Resource, Severity};

pub(crate) const ACCOUNT_ID: &str = "123456789012";

pub(crate) fn resource(id: &str, resource_type: &str, region: &str, tags: &[(&str, &str)]) -> Resource {
    let service = resource_type.split(':').next().unwrap_or("ec2");
    Resource {
        resource_id: id.to_string(),
        resource_type: resource_type.to_string(),
        region: region.to_string(),
        tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
        arn: format!("arn:aws:{}:{}:{}:{}", service, region, ACCOUNT_ID, id),
        created_at: None,
    }
}

pub(crate) fn instance(id: &str, region: &str, tags: &[(&str, &str)]) -> Resource {
    resource(id, "ec2:instance", region, tags)
}

/// Error-severity policy requiring every tag in `names`
pub(crate) fn required_tags_policy(names: &[&str]) -> TagPolicyEvaluator {
    names.iter().fold(
        TagPolicyEvaluator::new(TagPolicy::default()).expect("empty policy compiles"),
        |policy, name| policy.with_tag(name, Severity::Error),
    )
}

/// Serves a fixed resource list; selected types can be made to fail
#[derive(Clone, Default)]
pub(crate) struct FakeFetcher {
    resources: Vec<Resource>,
    failures: HashMap<String, ProviderError>,
    /// Fail this many calls before answering normally
    transient_failures: Arc<AtomicUsize>,
    delay: Option<Duration>,
    pub calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    /// Most fetches observed running at once, across clones
    pub peak_in_flight: Arc<AtomicUsize>,
}

/// Counts a fetch as running until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeFetcher {
    pub(crate) fn new(resources: Vec<Resource>) -> Self {
        Self {
            resources,
            ..Default::default()
        }
    }

    pub(crate) fn fail_type(mut self, resource_type: &str, error: ProviderError) -> Self {
        self.failures.insert(resource_type.to_string(), error);
        self
    }

    pub(crate) fn throttle_first(self, calls: usize) -> Self {
        self.transient_failures.store(calls, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ResourceFetcher for FakeFetcher {
    async fn fetch(
        &self,
        resource_type: &str,
        _filters: &Filters,
    ) -> Result<Vec<Resource>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let throttled = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(ProviderError::api("ThrottlingException", "Rate exceeded"));
        }

        if let Some(err) = self.failures.get(resource_type) {
            return Err(err.clone());
        }

        Ok(self
            .resources
            .iter()
            .filter(|r| r.resource_type == resource_type)
            .cloned()
            .collect())
    }
}

/// Region enumeration with a fixed answer
pub(crate) struct StaticRegions {
    regions: Vec<RegionInfo>,
    error: Option<ProviderError>,
    pub calls: Arc<AtomicUsize>,
}

impl StaticRegions {
    pub(crate) fn new(regions: Vec<(&str, &str)>) -> Self {
        Self {
            regions: regions
                .into_iter()
                .map(|(name, status)| RegionInfo::new(name, status))
                .collect(),
            error: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn enabled(names: &[&str]) -> Self {
        Self::new(names.iter().map(|n| (*n, "opt-in-not-required")).collect())
    }

    pub(crate) fn failing(error: ProviderError) -> Self {
        Self {
            regions: Vec::new(),
            error: Some(error),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl RegionEnumerator for StaticRegions {
    async fn describe_regions(&self) -> Result<Vec<RegionInfo>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.regions.clone()),
        }
    }
}

/// A cache whose backend is down
pub(crate) struct UnreachableCache;

#[async_trait]
impl CacheStore for UnreachableCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> bool {
        false
    }

    async fn delete(&self, _key: &str) -> bool {
        false
    }

    async fn clear(&self) -> bool {
        false
    }
}

/// Per-region fakes handed out by a client factory
#[derive(Default)]
pub(crate) struct RegionFixtures {
    fetchers: Mutex<HashMap<String, FakeFetcher>>,
}

impl RegionFixtures {
    pub(crate) fn with_region(self, region: &str, fetcher: FakeFetcher) -> Self {
        self.fetchers
            .lock()
            .unwrap()
            .insert(region.to_string(), fetcher);
        self
    }

    /// Fetcher for `region`; regions without a fixture are empty
    pub(crate) fn fetcher(&self, region: &str) -> FakeFetcher {
        self.fetchers
            .lock()
            .unwrap()
            .get(region)
            .cloned()
            .unwrap_or_default()
    }
}
