//! Tag Compliance Types
//!
//! Core types for representing scanned resources, policy violations and
//! the single-region and multi-region scan outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::warn;

/// Region label used for account-wide resources
pub const GLOBAL_REGION: &str = "global";

/// Account placeholder for ARNs that cannot be parsed
pub const UNKNOWN_ACCOUNT: &str = "unknown";

/// Post-fetch filters, keyed by filter name (`region`, `account_id`, ...)
pub type Filters = BTreeMap<String, serde_json::Value>;

/// A cloud resource discovered during a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Service-specific identifier
    pub resource_id: String,
    /// Namespaced type, e.g. `ec2:instance`
    pub resource_type: String,
    /// Region code or `global`
    pub region: String,
    /// Tag key to tag value
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Fully-qualified resource identifier
    #[serde(default)]
    pub arn: String,
    /// Creation time, when the service reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource {
    /// Owning account, recovered from the ARN
    pub fn account_id(&self) -> &str {
        extract_account_id(&self.arn)
    }
}

/// Extract the account segment (5th colon-delimited field) of an ARN.
///
/// Malformed or truncated ARNs yield [`UNKNOWN_ACCOUNT`].
pub fn extract_account_id(arn: &str) -> &str {
    let parts: Vec<&str> = arn.split(':').collect();
    if parts.len() < 5 || parts[0] != "arn" || parts[4].is_empty() {
        return UNKNOWN_ACCOUNT;
    }
    parts[4]
}

/// Minimal reference to a non-compliant resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceStub {
    pub resource_id: String,
    pub resource_type: String,
    pub region: String,
}

/// Kind of policy check that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MissingRequiredTag,
    InvalidValue,
    InvalidFormat,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::MissingRequiredTag => write!(f, "missing_required_tag"),
            ViolationKind::InvalidValue => write!(f, "invalid_value"),
            ViolationKind::InvalidFormat => write!(f, "invalid_format"),
        }
    }
}

/// Violation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One failed policy check against one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub resource_id: String,
    pub resource_type: String,
    pub region: String,
    pub violation_type: ViolationKind,
    /// Tag that failed the check
    pub tag_name: String,
    pub severity: Severity,
    /// Value found on the resource, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
    /// Values the policy would have accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    /// Estimated monthly cost attributable to this violation
    pub cost_impact_monthly: f64,
}

/// Which violations to report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeverityFilter {
    #[default]
    All,
    ErrorsOnly,
    WarningsOnly,
}

impl SeverityFilter {
    /// Parse a filter name; unrecognized values fall back to `All`.
    pub fn parse(value: &str) -> Self {
        match value {
            "all" => SeverityFilter::All,
            "errors_only" => SeverityFilter::ErrorsOnly,
            "warnings_only" => SeverityFilter::WarningsOnly,
            other => {
                warn!(severity = %other, "Unrecognized severity filter, reporting all violations");
                SeverityFilter::All
            }
        }
    }

    pub fn matches(&self, severity: Severity) -> bool {
        match self {
            SeverityFilter::All => true,
            SeverityFilter::ErrorsOnly => severity == Severity::Error,
            SeverityFilter::WarningsOnly => severity == Severity::Warning,
        }
    }
}

/// Outcome of one logical scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    /// compliant / total, 1.0 when nothing was scanned
    pub compliance_score: f64,
    pub total_resources: usize,
    pub compliant_resources: usize,
    pub violations: Vec<Violation>,
    /// Sum of violation cost impacts
    pub cost_attribution_gap: f64,
    pub scan_timestamp: DateTime<Utc>,
}

impl ComplianceResult {
    /// Build a result whose score is derived from the counts.
    pub fn from_counts(
        total_resources: usize,
        compliant_resources: usize,
        violations: Vec<Violation>,
        cost_attribution_gap: f64,
    ) -> Self {
        let compliant_resources = compliant_resources.min(total_resources);
        Self {
            compliance_score: compliance_score(compliant_resources, total_resources),
            total_resources,
            compliant_resources,
            violations,
            cost_attribution_gap,
            scan_timestamp: Utc::now(),
        }
    }

    /// Checks the invariants a cached payload must satisfy
    pub fn is_consistent(&self) -> bool {
        self.compliant_resources <= self.total_resources
            && (0.0..=1.0).contains(&self.compliance_score)
            && self.cost_attribution_gap >= 0.0
    }
}

/// Ratio of compliant to total resources
pub fn compliance_score(compliant: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        compliant as f64 / total as f64
    }
}

/// Per-region scan outcome prior to aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionalScanResult {
    pub region: String,
    pub success: bool,
    /// Deduplicated, violation-bearing resources
    pub resources: Vec<ResourceStub>,
    pub violations: Vec<Violation>,
    pub compliant_count: usize,
    /// Unique non-compliant resources
    pub non_compliant_count: usize,
    pub cost_attribution_gap: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(with = "duration_secs")]
    pub scan_duration: Duration,
}

impl RegionalScanResult {
    /// Summarize a single-region compliance result
    pub fn from_compliance(region: &str, result: ComplianceResult, elapsed: Duration) -> Self {
        let mut seen = std::collections::HashSet::new();
        let resources: Vec<ResourceStub> = result
            .violations
            .iter()
            .filter(|v| seen.insert(v.resource_id.clone()))
            .map(|v| ResourceStub {
                resource_id: v.resource_id.clone(),
                resource_type: v.resource_type.clone(),
                region: v.region.clone(),
            })
            .collect();

        Self {
            region: region.to_string(),
            success: true,
            resources,
            non_compliant_count: result.total_resources.saturating_sub(result.compliant_resources),
            compliant_count: result.compliant_resources,
            cost_attribution_gap: result.cost_attribution_gap,
            violations: result.violations,
            error_message: None,
            scan_duration: elapsed,
        }
    }

    /// A failed attempt carries only the region and the error
    pub fn failed(region: &str, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            region: region.to_string(),
            success: false,
            resources: Vec::new(),
            violations: Vec::new(),
            compliant_count: 0,
            non_compliant_count: 0,
            cost_attribution_gap: 0.0,
            error_message: Some(error.into()),
            scan_duration: elapsed,
        }
    }

    pub fn total_resources(&self) -> usize {
        self.compliant_count + self.non_compliant_count
    }

    /// Fold another chunk's result for the same region into this one
    pub fn merge(&mut self, other: RegionalScanResult) {
        self.success = self.success && other.success;
        self.resources.extend(other.resources);
        self.violations.extend(other.violations);
        self.compliant_count += other.compliant_count;
        self.non_compliant_count += other.non_compliant_count;
        self.cost_attribution_gap += other.cost_attribution_gap;
        self.scan_duration += other.scan_duration;
        if let Some(err) = other.error_message {
            self.error_message = Some(match self.error_message.take() {
                Some(existing) => format!("{}; {}", existing, err),
                None => err,
            });
        }
    }
}

/// Which regions were targeted and how they fared
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionMetadata {
    pub total_regions: Vec<String>,
    pub successful_regions: Vec<String>,
    pub failed_regions: Vec<String>,
    pub skipped_regions: Vec<String>,
    /// Region discovery fell back to the default region
    pub discovery_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_error: Option<String>,
    /// Last error of each failed region
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub region_errors: BTreeMap<String, String>,
}

/// Per-region entry of the aggregated breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub compliance_score: f64,
    pub total_resources: usize,
    pub compliant_resources: usize,
    pub non_compliant_resources: usize,
    pub violation_count: usize,
    pub cost_attribution_gap: f64,
}

/// Aggregated multi-region scan outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiRegionComplianceResult {
    #[serde(flatten)]
    pub summary: ComplianceResult,
    pub region_metadata: RegionMetadata,
    pub regional_breakdown: BTreeMap<String, RegionSummary>,
}

impl MultiRegionComplianceResult {
    /// Violation counts grouped by tag name
    pub fn violations_by_tag(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for v in &self.summary.violations {
            *counts.entry(v.tag_name.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
