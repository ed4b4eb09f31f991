//! Compliance Scan-and-Cache Pipeline
//!
//! Fetches resources, validates their tags against the policy, scores the
//! outcome and memoizes it behind a deterministic cache key.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::cache::compliance_cache_key;
use super::config::ScannerConfig;
use super::error::{ProviderError, ScanResult};
use super::providers::{CacheStore, PolicyEvaluator, ResourceFetcher};
use super::types::{ComplianceResult, Filters, Resource, SeverityFilter, Violation};

/// Severity used when invalidating a single cache entry
const DEFAULT_SEVERITY: &str = "all";

/// Single-scope compliance checker
pub struct CompliancePipeline {
    fetcher: Arc<dyn ResourceFetcher>,
    evaluator: Arc<dyn PolicyEvaluator>,
    cache: Arc<dyn CacheStore>,
    config: Arc<ScannerConfig>,
    /// Region this pipeline's fetcher is bound to, if any
    scope: Option<String>,
}

impl CompliancePipeline {
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        evaluator: Arc<dyn PolicyEvaluator>,
        cache: Arc<dyn CacheStore>,
        config: Arc<ScannerConfig>,
    ) -> Self {
        Self {
            fetcher,
            evaluator,
            cache,
            config,
            scope: None,
        }
    }

    /// Bind the pipeline's cache entries to one region
    pub fn scoped(mut self, region: &str) -> Self {
        self.scope = Some(region.to_string());
        self
    }

    pub fn cache_key(
        &self,
        resource_types: &[String],
        filters: Option<&Filters>,
        severity: &str,
    ) -> String {
        compliance_cache_key(resource_types, filters, severity, self.scope.as_deref())
    }

    /// Check compliance, serving from cache unless `force_refresh` is set
    pub async fn check_compliance(
        &self,
        resource_types: &[String],
        filters: Option<&Filters>,
        severity: &str,
        force_refresh: bool,
    ) -> ScanResult<ComplianceResult> {
        let key = self.cache_key(resource_types, filters, severity);

        if !force_refresh {
            if let Some(cached) = self.cached_result(&key).await {
                debug!(key = %key, scope = ?self.scope, "Compliance cache hit");
                return Ok(cached);
            }
        }

        let result = self
            .scan_and_validate(resource_types, filters, severity)
            .await?;

        match serde_json::to_string(&result) {
            Ok(payload) => {
                if !self
                    .cache
                    .set(&key, &payload, self.config.result_cache_ttl)
                    .await
                {
                    warn!(key = %key, "Failed to cache compliance result");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize compliance result"),
        }

        Ok(result)
    }

    /// Clear every cached entry, or only the entry for the given inputs
    pub async fn invalidate_cache(
        &self,
        resource_types: Option<&[String]>,
        filters: Option<&Filters>,
    ) -> bool {
        if resource_types.is_none() && filters.is_none() {
            info!("Clearing compliance cache");
            return self.cache.clear().await;
        }

        let key = self.cache_key(resource_types.unwrap_or_default(), filters, DEFAULT_SEVERITY);
        self.cache.delete(&key).await
    }

    async fn cached_result(&self, key: &str) -> Option<ComplianceResult> {
        let raw = self.cache.get(key).await?;
        match serde_json::from_str::<ComplianceResult>(&raw) {
            Ok(result) if result.is_consistent() => Some(result),
            Ok(_) => {
                warn!(key = %key, "Ignoring inconsistent cached compliance result");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring malformed cached compliance result");
                None
            }
        }
    }

    async fn scan_and_validate(
        &self,
        resource_types: &[String],
        filters: Option<&Filters>,
        severity: &str,
    ) -> ScanResult<ComplianceResult> {
        let started = Instant::now();
        let empty = Filters::new();
        let filters = filters.unwrap_or(&empty);

        let resources = self.fetch_all(resource_types, filters).await?;

        let catalog = &self.config.catalog;
        let resources: Vec<Resource> = resources
            .into_iter()
            .filter(|r| !catalog.is_free(&r.resource_type))
            .filter(|r| matches_filters(r, filters))
            .collect();

        let mut violations: Vec<Violation> = Vec::new();
        let mut compliant = 0usize;
        for resource in &resources {
            let found = self
                .evaluator
                .validate(
                    &resource.resource_id,
                    &resource.resource_type,
                    &resource.region,
                    &resource.tags,
                    catalog.cost_estimate(&resource.resource_type),
                )
                .await;
            if found.is_empty() {
                compliant += 1;
            }
            violations.extend(found);
        }

        let cost_attribution_gap: f64 = violations.iter().map(|v| v.cost_impact_monthly).sum();

        let severity_filter = SeverityFilter::parse(severity);
        violations.retain(|v| severity_filter.matches(v.severity));

        let result =
            ComplianceResult::from_counts(resources.len(), compliant, violations, cost_attribution_gap);

        info!(
            scope = ?self.scope,
            total = result.total_resources,
            compliant = result.compliant_resources,
            violations = result.violations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Compliance scan complete"
        );

        Ok(result)
    }

    /// Fetch every type, skipping types that fail. Fails only when every
    /// requested type failed.
    async fn fetch_all(
        &self,
        resource_types: &[String],
        filters: &Filters,
    ) -> Result<Vec<Resource>, ProviderError> {
        let mut resources = Vec::new();
        let mut last_error = None;
        let mut fetched_any = false;

        for resource_type in resource_types {
            match self.fetcher.fetch(resource_type, filters).await {
                Ok(found) => {
                    debug!(resource_type = %resource_type, count = found.len(), "Fetched resources");
                    fetched_any = true;
                    resources.extend(found);
                }
                Err(e) => {
                    warn!(
                        resource_type = %resource_type,
                        scope = ?self.scope,
                        error = %e,
                        "Failed to fetch resources, skipping type"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !fetched_any => Err(e),
            _ => Ok(resources),
        }
    }
}

/// Values of a string-or-list filter; `None` when the filter is absent
fn filter_values(filters: &Filters, name: &str) -> Option<Vec<String>> {
    match filters.get(name)? {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        Value::Null => None,
        other => {
            warn!(filter = %name, value = %other, "Ignoring unsupported filter value");
            None
        }
    }
}

fn matches_filters(resource: &Resource, filters: &Filters) -> bool {
    if let Some(regions) = filter_values(filters, "region") {
        if !regions.iter().any(|r| r == &resource.region) {
            return false;
        }
    }
    if let Some(accounts) = filter_values(filters, "account_id") {
        let account = resource.account_id();
        if !accounts.iter().any(|a| a == account) {
            return false;
        }
    }
    true
}
