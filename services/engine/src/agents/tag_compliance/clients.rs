//! Regional Client Factory
//!
//! One lazily-built API handle per region, all derived from the same base
//! settings. Handles are identity-stable for the factory's lifetime so any
//! state they cache (e.g. a resolved account id) is reused across calls.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Settings shared by every regional handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Attempts made by the handle's own transport layer
    pub max_attempts: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

type ClientBuilder<C> = dyn Fn(&str, &ClientSettings) -> C + Send + Sync;

/// Maps region codes to reusable per-region handles
pub struct RegionalClientFactory<C> {
    settings: ClientSettings,
    builder: Box<ClientBuilder<C>>,
    clients: Mutex<HashMap<String, Arc<C>>>,
}

impl<C> RegionalClientFactory<C> {
    /// Create a factory that builds handles with `builder`
    pub fn new<F>(settings: ClientSettings, builder: F) -> Self
    where
        F: Fn(&str, &ClientSettings) -> C + Send + Sync + 'static,
    {
        Self {
            settings,
            builder: Box::new(builder),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Handle for `region`, built on first use
    pub fn get_client(&self, region: &str) -> Arc<C> {
        let mut clients = self.lock();
        if let Some(client) = clients.get(region) {
            return Arc::clone(client);
        }

        debug!(region = %region, "Creating regional client");
        let client = Arc::new((self.builder)(region, &self.settings));
        clients.insert(region.to_string(), Arc::clone(&client));
        client
    }

    /// Drop every cached handle
    pub fn clear_clients(&self) {
        self.lock().clear();
    }

    /// Regions with a live handle, sorted
    pub fn cached_regions(&self) -> Vec<String> {
        let mut regions: Vec<String> = self.lock().keys().cloned().collect();
        regions.sort();
        regions
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<C>>> {
        // The map holds no invariant a panicking holder could break
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }
}
