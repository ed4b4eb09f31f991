//! Multi-Region Scanner
//!
//! Resolves the region set, scans account-wide resource types once through
//! the global API region, fans the regional types out across every selected
//! region with bounded concurrency and per-region retry, and merges the
//! outcomes into one aggregated result.

use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::clients::RegionalClientFactory;
use super::config::ScannerConfig;
use super::discovery::RegionDiscoveryService;
use super::error::{ComplianceError, ScanResult};
use super::pipeline::CompliancePipeline;
use super::providers::{CacheStore, PolicyEvaluator, ResourceFetcher};
use super::types::{
    compliance_score, ComplianceResult, Filters, MultiRegionComplianceResult, RegionMetadata,
    RegionSummary, RegionalScanResult, Violation, GLOBAL_REGION,
};

/// Filter keys that name target regions
const REGION_FILTER_KEYS: &[&str] = &["region", "regions"];

/// Parameters of one multi-region scan
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Resource types to scan; `all` expands to every cost-generating type
    pub resource_types: Vec<String>,
    pub filters: Filters,
    /// `all`, `errors_only` or `warnings_only`
    pub severity: String,
    /// Restrict the scan to these regions
    pub regions: Option<Vec<String>>,
    pub force_refresh: bool,
}

impl ScanRequest {
    pub fn new<I, S>(resource_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource_types: resource_types.into_iter().map(Into::into).collect(),
            filters: Filters::new(),
            severity: "all".to_string(),
            regions: None,
            force_refresh: false,
        }
    }

    pub fn filter(mut self, key: &str, value: Value) -> Self {
        self.filters.insert(key.to_string(), value);
        self
    }

    pub fn severity(mut self, severity: &str) -> Self {
        self.severity = severity.to_string();
        self
    }

    pub fn regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = Some(regions.into_iter().map(Into::into).collect());
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Explicit region list, else region values found in the filters
    fn region_filter(&self) -> Option<Vec<String>> {
        if let Some(regions) = &self.regions {
            return Some(regions.clone());
        }

        let mut regions = Vec::new();
        for key in REGION_FILTER_KEYS {
            match self.filters.get(*key) {
                Some(Value::String(r)) => regions.push(r.clone()),
                Some(Value::Array(items)) => {
                    regions.extend(items.iter().filter_map(|v| v.as_str().map(str::to_string)))
                }
                _ => {}
            }
        }
        if regions.is_empty() {
            None
        } else {
            Some(regions)
        }
    }
}

/// Regions to scan and regions deliberately left out
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSelection {
    pub selected: Vec<String>,
    pub skipped: Vec<String>,
}

/// Intersect enabled regions with the allow-list and the caller's filter.
///
/// Regions named by the caller that are not enabled and allowed are an
/// error rather than an empty scan.
pub fn resolve_regions(
    enabled: &[String],
    allowed: Option<&[String]>,
    requested: Option<&[String]>,
) -> ScanResult<RegionSelection> {
    let mut skipped = Vec::new();

    let available: Vec<String> = match allowed {
        Some(allowed) => {
            for region in allowed {
                if !enabled.contains(region) {
                    warn!(region = %region, "Allowed region is not enabled for the account, dropping");
                }
            }
            enabled
                .iter()
                .filter(|r| {
                    let keep = allowed.contains(*r);
                    if !keep {
                        skipped.push((*r).clone());
                    }
                    keep
                })
                .cloned()
                .collect()
        }
        None => enabled.to_vec(),
    };

    let Some(requested) = requested.filter(|r| !r.is_empty()) else {
        return Ok(RegionSelection {
            selected: available,
            skipped,
        });
    };

    let mut invalid: Vec<String> = requested
        .iter()
        .filter(|r| !available.contains(*r))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        invalid.sort();
        invalid.dedup();
        return Err(ComplianceError::InvalidRegionFilter {
            invalid_regions: invalid,
            valid_regions: available,
        });
    }

    let (selected, excluded): (Vec<String>, Vec<String>) =
        available.into_iter().partition(|r| requested.contains(r));
    skipped.extend(excluded);
    skipped.sort();

    Ok(RegionSelection { selected, skipped })
}

/// Filters with every region key removed
pub fn strip_region_filters(filters: &Filters) -> Filters {
    filters
        .iter()
        .filter(|(k, _)| !REGION_FILTER_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Key under which duplicate violations collapse.
///
/// ARN identifiers and global resources are unique account-wide; any other
/// id is only unique within its region.
fn violation_dedup_key(v: &Violation) -> (String, String, String) {
    let scope = if v.region == GLOBAL_REGION || v.resource_id.starts_with("arn:") {
        String::new()
    } else {
        v.region.clone()
    };
    (scope, v.resource_id.clone(), v.tag_name.clone())
}

/// Orchestrates compliance scans across every enabled region
pub struct MultiRegionScanner<C> {
    config: Arc<ScannerConfig>,
    discovery: Arc<RegionDiscoveryService>,
    clients: Arc<RegionalClientFactory<C>>,
    evaluator: Arc<dyn PolicyEvaluator>,
    cache: Arc<dyn CacheStore>,
}

impl<C> MultiRegionScanner<C>
where
    C: ResourceFetcher + 'static,
{
    pub fn new(
        config: Arc<ScannerConfig>,
        discovery: Arc<RegionDiscoveryService>,
        clients: Arc<RegionalClientFactory<C>>,
        evaluator: Arc<dyn PolicyEvaluator>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            config,
            discovery,
            clients,
            evaluator,
            cache,
        }
    }

    /// Single-region pipeline backed by that region's client
    pub fn pipeline_for(&self, region: &str) -> CompliancePipeline {
        let fetcher: Arc<dyn ResourceFetcher> = self.clients.get_client(region);
        CompliancePipeline::new(
            fetcher,
            Arc::clone(&self.evaluator),
            Arc::clone(&self.cache),
            Arc::clone(&self.config),
        )
        .scoped(region)
    }

    /// Scan every selected region and aggregate the results
    pub async fn scan_all_regions(
        &self,
        request: &ScanRequest,
    ) -> ScanResult<MultiRegionComplianceResult> {
        let started = Instant::now();

        let (resource_types, expanded_all) =
            self.config.expand_resource_types(&request.resource_types);
        let (global_types, regional_types) = self.config.catalog.partition(&resource_types);

        if request.force_refresh {
            self.discovery.invalidate().await;
        }
        let discovery = self.discovery.get_enabled_regions_with_status().await;
        if discovery.discovery_failed {
            warn!(
                error = ?discovery.discovery_error,
                "Region discovery degraded, scanning fallback region only"
            );
        }

        let requested = request.region_filter();
        let selection = resolve_regions(
            &discovery.regions,
            self.config.allowed_regions.as_deref(),
            requested.as_deref(),
        )?;

        if selection.selected.is_empty() && !regional_types.is_empty() {
            error!(
                enabled = ?discovery.regions,
                allowed = ?self.config.allowed_regions,
                "No region is both enabled and allowed"
            );
            return Err(ComplianceError::NoRegionsAvailable {
                enabled: discovery.regions,
                allowed: self.config.allowed_regions.clone(),
            });
        }

        let filters = strip_region_filters(&request.filters);
        let (concurrency, timeout) = self.config.fan_out_limits(expanded_all);

        info!(
            regions = selection.selected.len(),
            global_types = global_types.len(),
            regional_types = regional_types.len(),
            concurrency,
            timeout_secs = timeout.as_secs(),
            expanded_all,
            "Starting multi-region compliance scan"
        );

        let global = if global_types.is_empty() {
            None
        } else {
            Some(
                self.scan_global(&global_types, &filters, request, timeout)
                    .await,
            )
        };

        let (scanned_regions, regional) = if regional_types.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let results = self
                .scan_regions(
                    &selection.selected,
                    &regional_types,
                    &filters,
                    request,
                    concurrency,
                    timeout,
                )
                .await;
            (selection.selected.clone(), results)
        };

        let mut skipped = selection.skipped;
        if regional_types.is_empty() {
            skipped.extend(selection.selected);
            skipped.sort();
        }

        let metadata = RegionMetadata {
            total_regions: scanned_regions,
            successful_regions: Vec::new(),
            failed_regions: Vec::new(),
            skipped_regions: skipped,
            discovery_failed: discovery.discovery_failed,
            discovery_error: discovery.discovery_error,
            region_errors: BTreeMap::new(),
        };

        let attempted = regional.len() + usize::from(global.is_some());
        let aggregated = aggregate(regional, global, metadata);

        info!(
            total = aggregated.summary.total_resources,
            compliant = aggregated.summary.compliant_resources,
            successful = aggregated.region_metadata.successful_regions.len(),
            failed = aggregated.region_metadata.failed_regions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Multi-region compliance scan complete"
        );

        if attempted > 0 && aggregated.region_metadata.successful_regions.is_empty() {
            let failed_regions = aggregated.region_metadata.failed_regions.clone();
            let guidance = if expanded_all && any_timed_out(&aggregated) {
                Some(format!(
                    "Scanning all resource types timed out in every region; request a narrower \
                     list of resource types or raise the per-region timeout (currently {}s)",
                    timeout.as_secs()
                ))
            } else {
                None
            };
            error!(failed = ?failed_regions, "Compliance scan failed in every region");
            return Err(ComplianceError::ScanFailed {
                failed_regions,
                partial: Box::new(aggregated),
                guidance,
            });
        }

        Ok(aggregated)
    }

    /// Scan account-wide types once and label the outcome `global`
    async fn scan_global(
        &self,
        resource_types: &[String],
        filters: &Filters,
        request: &ScanRequest,
        timeout: Duration,
    ) -> RegionalScanResult {
        let api_region = self.config.global_api_region.clone();
        let mut result = self
            .scan_with_retry(
                &api_region,
                GLOBAL_REGION,
                resource_types,
                filters,
                request,
                timeout,
            )
            .await;

        for violation in &mut result.violations {
            violation.region = GLOBAL_REGION.to_string();
        }
        let mut seen = HashSet::new();
        result.resources.retain(|r| seen.insert(r.resource_id.clone()));
        for stub in &mut result.resources {
            stub.region = GLOBAL_REGION.to_string();
        }
        result
    }

    /// Fan regional types out across regions, one type group at a time
    async fn scan_regions(
        &self,
        regions: &[String],
        resource_types: &[String],
        filters: &Filters,
        request: &ScanRequest,
        concurrency: usize,
        timeout: Duration,
    ) -> Vec<RegionalScanResult> {
        let chunk_size = self.config.resource_type_chunk_size.max(1);
        let mut merged: BTreeMap<String, RegionalScanResult> = BTreeMap::new();

        for (index, chunk) in resource_types.chunks(chunk_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.chunk_pause).await;
            }

            let results: Vec<RegionalScanResult> = stream::iter(regions)
                .map(|region| {
                    self.scan_with_retry(region, region, chunk, filters, request, timeout)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

            for result in results {
                match merged.get_mut(&result.region) {
                    Some(existing) => existing.merge(result),
                    None => {
                        merged.insert(result.region.clone(), result);
                    }
                }
            }
        }

        merged.into_values().collect()
    }

    /// Scan one region, retrying transient failures with backoff
    async fn scan_with_retry(
        &self,
        api_region: &str,
        label: &str,
        resource_types: &[String],
        filters: &Filters,
        request: &ScanRequest,
        timeout: Duration,
    ) -> RegionalScanResult {
        let started = Instant::now();
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            match self
                .scan_once(api_region, label, resource_types, filters, request, timeout)
                .await
            {
                Ok(result) => {
                    return RegionalScanResult::from_compliance(label, result, started.elapsed())
                }
                Err(e) if e.is_transient() && attempt < retry.max_retries => {
                    let delay = retry.delay_for(attempt);
                    warn!(
                        region = %label,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying region scan"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(region = %label, attempts = attempt + 1, error = %e, "Region scan failed");
                    return RegionalScanResult::failed(label, e.to_string(), started.elapsed());
                }
            }
        }
    }

    async fn scan_once(
        &self,
        api_region: &str,
        label: &str,
        resource_types: &[String],
        filters: &Filters,
        request: &ScanRequest,
        timeout: Duration,
    ) -> ScanResult<ComplianceResult> {
        let pipeline = self.pipeline_for(api_region).scoped(label);

        let scan = pipeline.check_compliance(
            resource_types,
            Some(filters),
            &request.severity,
            request.force_refresh,
        );

        match tokio::time::timeout(timeout, scan).await {
            Ok(result) => result,
            Err(_) => Err(ComplianceError::RegionTimeout {
                region: label.to_string(),
                timeout,
            }),
        }
    }
}

fn any_timed_out(result: &MultiRegionComplianceResult) -> bool {
    result
        .region_metadata
        .region_errors
        .values()
        .any(|msg| msg.contains("timed out"))
}

/// Merge global and regional outcomes into one result
fn aggregate(
    regional: Vec<RegionalScanResult>,
    global: Option<RegionalScanResult>,
    mut metadata: RegionMetadata,
) -> MultiRegionComplianceResult {
    let global_ids: HashSet<String> = global
        .iter()
        .filter(|g| g.success)
        .flat_map(|g| g.resources.iter().map(|r| r.resource_id.clone()))
        .collect();

    let mut breakdown = BTreeMap::new();
    let mut seen = HashSet::new();
    let mut violations = Vec::new();
    let mut total = 0usize;
    let mut compliant = 0usize;
    let mut cost_gap = 0.0;
    let mut failed = BTreeSet::new();
    let mut successful = BTreeSet::new();

    for mut result in global.into_iter().chain(regional) {
        if !result.success {
            if let Some(message) = result.error_message.take() {
                metadata.region_errors.insert(result.region.clone(), message);
            }
            failed.insert(result.region.clone());
            continue;
        }
        successful.insert(result.region.clone());

        if result.region != GLOBAL_REGION && !global_ids.is_empty() {
            let before = result.resources.len();
            result.resources.retain(|r| !global_ids.contains(&r.resource_id));
            let removed = before - result.resources.len();
            if removed > 0 {
                warn!(
                    region = %result.region,
                    removed,
                    "Dropping global resources observed in a regional scan"
                );
                result.non_compliant_count = result.non_compliant_count.saturating_sub(removed);
                let removed_cost: f64 = result
                    .violations
                    .iter()
                    .filter(|v| global_ids.contains(&v.resource_id))
                    .map(|v| v.cost_impact_monthly)
                    .sum();
                result.cost_attribution_gap =
                    (result.cost_attribution_gap - removed_cost).max(0.0);
                result.violations.retain(|v| !global_ids.contains(&v.resource_id));
            }
        }

        let region_total = result.total_resources();
        breakdown.insert(
            result.region.clone(),
            RegionSummary {
                compliance_score: compliance_score(result.compliant_count, region_total),
                total_resources: region_total,
                compliant_resources: result.compliant_count,
                non_compliant_resources: result.non_compliant_count,
                violation_count: result.violations.len(),
                cost_attribution_gap: result.cost_attribution_gap,
            },
        );

        total += region_total;
        compliant += result.compliant_count;
        cost_gap += result.cost_attribution_gap;
        for violation in result.violations {
            if seen.insert(violation_dedup_key(&violation)) {
                violations.push(violation);
            }
        }
    }

    metadata.successful_regions = successful.into_iter().collect();
    metadata.failed_regions = failed.into_iter().collect();

    MultiRegionComplianceResult {
        summary: ComplianceResult::from_counts(total, compliant, violations, cost_gap),
        region_metadata: metadata,
        regional_breakdown: breakdown,
    }
}
