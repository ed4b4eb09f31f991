//! Error types for tag compliance scanning

use std::time::Duration;
use thiserror::Error;

use super::types::MultiRegionComplianceResult;

/// API error codes that signal a retryable upstream condition
const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "ServiceUnavailable",
    "InternalError",
    "InternalFailure",
    "RequestTimeout",
];

/// Lowercased message fragments that signal rate limiting or timeouts
const TRANSIENT_PATTERNS: &[&str] = &[
    "rate exceeded",
    "too many requests",
    "throttl",
    "timed out",
    "timeout",
    "connection reset",
];

/// Failures reported by the upstream cloud API
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The API answered with an error code
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    /// The request never got an answer
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request exceeded its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Api { code, message } => {
                TRANSIENT_CODES.contains(&code.as_str()) || matches_transient_pattern(message)
            }
            ProviderError::Transport(_) | ProviderError::Timeout(_) => true,
        }
    }
}

fn matches_transient_pattern(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Errors surfaced by the compliance pipeline and the multi-region scanner
#[derive(Debug, Error)]
pub enum ComplianceError {
    /// Upstream API failure
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The caller asked for regions that are not enabled or not allowed
    #[error("Invalid region filter: {invalid_regions:?} (valid regions: {valid_regions:?})")]
    InvalidRegionFilter {
        invalid_regions: Vec<String>,
        valid_regions: Vec<String>,
    },

    /// Regional types were requested but no region is both enabled and allowed
    #[error("No regions available to scan (enabled: {enabled:?}, allowed: {allowed:?})")]
    NoRegionsAvailable {
        enabled: Vec<String>,
        allowed: Option<Vec<String>>,
    },

    /// Every targeted region failed
    #[error("Scan failed in all regions: {failed_regions:?}")]
    ScanFailed {
        failed_regions: Vec<String>,
        partial: Box<MultiRegionComplianceResult>,
        guidance: Option<String>,
    },

    /// A single region exceeded its scan deadline
    #[error("Scan of region {region} timed out after {timeout:?}")]
    RegionTimeout { region: String, timeout: Duration },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ComplianceError {
    /// Whether the scanner should retry the region that produced this error
    pub fn is_transient(&self) -> bool {
        match self {
            ComplianceError::Provider(e) => e.is_transient(),
            ComplianceError::RegionTimeout { .. } => true,
            _ => false,
        }
    }
}

/// Result alias for scanning operations
pub type ScanResult<T> = Result<T, ComplianceError>;
