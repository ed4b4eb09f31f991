//! Compliance Scan Agent - Standalone Binary
//!
//! Runs a multi-region tag compliance scan against an inventory snapshot and
//! prints the aggregated result as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tagscan_engine::agents::tag_compliance::{
    ClientSettings, ComplianceError, InMemoryCache, InventoryClient, InventorySnapshot,
    MultiRegionScanner, RegionDiscoveryService, RegionalClientFactory, ScanRequest,
    ScannerConfig, Severity, TagPolicy, TagPolicyEvaluator,
};

/// Compliance Scan Agent - Audits resource tags across every enabled region
#[derive(Parser, Debug)]
#[command(name = "compliance-scan-agent", version, about)]
struct Args {
    /// Inventory snapshot (JSON) to scan
    #[arg(long, env = "TAGSCAN_INVENTORY")]
    inventory: PathBuf,

    /// Tag policy file (JSON); defaults to --required-tags
    #[arg(long, env = "TAGSCAN_POLICY")]
    policy: Option<PathBuf>,

    /// Tags every resource must carry when no policy file is given
    #[arg(long, value_delimiter = ',', default_value = "Owner,CostCenter,Environment")]
    required_tags: Vec<String>,

    /// Resource types to scan, or "all"
    #[arg(long, value_delimiter = ',', default_value = "all")]
    resource_types: Vec<String>,

    /// Restrict the scan to these regions
    #[arg(long, value_delimiter = ',')]
    regions: Option<Vec<String>>,

    /// all, errors_only or warnings_only
    #[arg(long, default_value = "all")]
    severity: String,

    /// Ignore cached results
    #[arg(long, default_value = "false")]
    force_refresh: bool,

    /// Pretty-print the JSON result
    #[arg(long, default_value = "false")]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    let config = Arc::new(ScannerConfig::from_env().context("Invalid scanner configuration")?);

    info!(
        inventory = ?args.inventory,
        resource_types = ?args.resource_types,
        regions = ?args.regions,
        severity = %args.severity,
        "Starting Compliance Scan Agent"
    );

    let evaluator = match &args.policy {
        Some(path) => TagPolicyEvaluator::new(TagPolicy::from_file(path)?)?,
        None => args.required_tags.iter().fold(
            TagPolicyEvaluator::new(TagPolicy::default())?,
            |policy, tag| policy.with_tag(tag, Severity::Error),
        ),
    };

    let snapshot = Arc::new(InventorySnapshot::from_file(&args.inventory)?);
    let cache = Arc::new(InMemoryCache::new());

    let discovery = Arc::new(RegionDiscoveryService::new(
        snapshot.clone(),
        Arc::new(InMemoryCache::new()),
        &config.default_region,
        config.region_cache_ttl,
    ));

    let global_api_region = config.global_api_region.clone();
    let client_snapshot = snapshot.clone();
    let clients = Arc::new(RegionalClientFactory::new(
        ClientSettings::default(),
        move |region, _| InventoryClient::new(client_snapshot.clone(), region, &global_api_region),
    ));

    let scanner = MultiRegionScanner::new(config, discovery, clients, Arc::new(evaluator), cache);

    let mut request = ScanRequest::new(args.resource_types.iter().cloned())
        .severity(&args.severity)
        .force_refresh(args.force_refresh);
    if let Some(regions) = &args.regions {
        request = request.regions(regions.iter().cloned());
    }

    match scanner.scan_all_regions(&request).await {
        Ok(result) => {
            info!(
                score = result.summary.compliance_score,
                violations_by_tag = ?result.violations_by_tag(),
                "Compliance scan finished"
            );
            print_json(&result, args.pretty)
        }
        Err(ComplianceError::ScanFailed {
            failed_regions,
            partial,
            guidance,
        }) => {
            error!(failed = ?failed_regions, guidance = ?guidance, "Compliance scan failed");
            print_json(&partial, args.pretty)?;
            anyhow::bail!("Scan failed in all regions: {:?}", failed_regions)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}
