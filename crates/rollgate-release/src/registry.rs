//! Per-service release clients, built once from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use rollgate_core::{Config, ServiceConfig};

use crate::api::ReleaseApi;
use crate::error::{ReleaseError, ReleaseResult};

/// Release clients keyed by service name.
///
/// Owned by whoever runs the workflow and passed down by reference.
#[derive(Default, Clone)]
pub struct ReleaseRegistry {
    clients: HashMap<String, Arc<dyn ReleaseApi>>,
}

impl ReleaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one client per configured service.
    ///
    /// `factory` receives the service name, its config and its resolved
    /// region.
    pub fn from_config<F>(config: &Config, mut factory: F) -> ReleaseResult<Self>
    where
        F: FnMut(&str, &ServiceConfig, &str) -> ReleaseResult<Arc<dyn ReleaseApi>>,
    {
        let mut registry = Self::new();
        for (name, service) in &config.services {
            let region = config.region_for(name);
            let client = factory(name, service, region)?;
            debug!(service = %name, %region, "release client registered");
            registry.register(name, client);
        }
        Ok(registry)
    }

    pub fn register(&mut self, service: &str, client: Arc<dyn ReleaseApi>) {
        self.clients.insert(service.to_string(), client);
    }

    pub fn client(&self, service: &str) -> ReleaseResult<Arc<dyn ReleaseApi>> {
        self.clients
            .get(service)
            .cloned()
            .ok_or_else(|| ReleaseError::NoClient(service.to_string()))
    }

    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }
}
