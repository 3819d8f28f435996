//! Application context shared by the protocol adapter, tools, and transports.

use std::sync::Arc;

use redmine_mcp_client::RedmineApi;
use redmine_mcp_core::{Environment, MetricsCollector};

use crate::registry::Registry;

/// Everything a request needs, constructed once at startup.
///
/// Cloning is cheap; all members are shared.
#[derive(Clone)]
pub struct AppContext {
    registry: Arc<Registry>,
    api: Arc<dyn RedmineApi>,
    metrics: Arc<MetricsCollector>,
    environment: Environment,
}

impl AppContext {
    pub fn new(
        registry: Arc<Registry>,
        api: Arc<dyn RedmineApi>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry,
            api,
            metrics,
            environment: Environment::default(),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Same context, different backend client (per-tenant credentials).
    pub fn with_api(&self, api: Arc<dyn RedmineApi>) -> Self {
        Self {
            api,
            ..self.clone()
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn api(&self) -> &dyn RedmineApi {
        self.api.as_ref()
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }
}
