//! Compliance Result Caching
//!
//! Deterministic cache keys for scan inputs and an in-process TTL store.

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use super::providers::CacheStore;
use super::types::Filters;

/// Prefix of every compliance result key
pub const COMPLIANCE_KEY_PREFIX: &str = "compliance:";

/// Key under which the enabled-region list is cached
pub const ENABLED_REGIONS_KEY: &str = "aws:enabled_regions";

/// Build the cache key for a compliance scan.
///
/// Resource types are sorted and string lists inside filters are sorted, so
/// the key does not depend on caller ordering. `scope` is the region of a
/// region-scoped pipeline.
pub fn compliance_cache_key(
    resource_types: &[String],
    filters: Option<&Filters>,
    severity: &str,
    scope: Option<&str>,
) -> String {
    let mut types = resource_types.to_vec();
    types.sort();

    let filters: serde_json::Map<String, Value> = filters
        .map(|f| {
            f.iter()
                .map(|(k, v)| (k.clone(), normalize_filter_value(v)))
                .collect()
        })
        .unwrap_or_default();

    let mut payload = json!({
        "resource_types": types,
        "filters": filters,
        "severity": severity,
    });
    if let Some(region) = scope {
        payload["region"] = Value::String(region.to_string());
    }

    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{}{:x}", COMPLIANCE_KEY_PREFIX, hasher.finalize())
}

fn normalize_filter_value(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(normalize_filter_value).collect();
            items.sort_by_key(|v| v.to_string());
            Value::Array(items)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_filter_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-process [`CacheStore`] with per-entry expiry
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        debug!(key = %key, "Evicting expired cache entry");
        self.entries.write().await.remove(key);
        None
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            return false;
        };
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        true
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    async fn clear(&self) -> bool {
        let mut entries = self.entries.write().await;
        let had_entries = !entries.is_empty();
        entries.clear();
        had_entries
    }
}
