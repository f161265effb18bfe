use crate::{
    cache::Registry,
    config::Config,
    coordinator::Coordinator,
    fetcher::{HttpUpstream, Upstream},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Cache registry plus upstream transport
    pub coordinator: Coordinator,
    /// Prometheus handle, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl AppState {
    /// Create the shared state with a pooled HTTP upstream.
    ///
    /// Fails if the cache directory cannot be created or the HTTP client
    /// cannot be built; either is fatal at startup.
    pub fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let upstream = HttpUpstream::new(&config.user_agent)?;
        Self::with_upstream(config, Arc::new(upstream))
    }

    /// Create the shared state around an arbitrary upstream transport.
    pub fn with_upstream(
        config: Config,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(&config.cache_dir).map_err(|e| {
            format!(
                "Failed to create cache dir {}: {}",
                config.cache_dir.display(),
                e
            )
        })?;

        let registry = Registry::new(config.ttl_policy(), config.cache_dir.clone());
        let coordinator = Coordinator::new(
            registry,
            upstream,
            &config.origin_url,
            config.fetch_timeout(),
        );

        Ok(Self {
            config: Arc::new(config),
            coordinator,
            metrics: None,
            started_at: Instant::now(),
        })
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    pub fn registry(&self) -> &Registry {
        self.coordinator.registry()
    }
}
