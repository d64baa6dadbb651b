//! Shared state of the exposition server.

use std::sync::Arc;

use cached::{Cached, TimedCache};
use parking_lot::Mutex;
use prometheus::Registry;

use crate::config::ConfigV1;
use crate::metrics::Metrics;
use crate::routes::Exposition;

/// Holds the last rendered scrape for `ttl` seconds. A zero TTL disables it.
#[derive(Clone)]
pub struct ScrapeCache {
    inner: Option<Arc<Mutex<TimedCache<(), String>>>>,
}

impl ScrapeCache {
    pub fn new(ttl: u64) -> Self {
        ScrapeCache {
            inner: (ttl > 0).then(|| Arc::new(Mutex::new(TimedCache::with_lifespan(ttl)))),
        }
    }

    pub fn get(&self) -> Option<String> {
        let inner = self.inner.as_ref()?;
        let mut cache = inner.lock();
        cache.cache_get(&()).cloned()
    }

    pub fn set(&self, body: String) {
        if let Some(inner) = &self.inner {
            inner.lock().cache_set((), body);
        }
    }
}

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    /// Controller instruments.
    pub metrics: Metrics,
    /// Process telemetry.
    pub telemetry: Arc<Registry>,
    metrics_cache: ScrapeCache,
    telemetry_cache: ScrapeCache,
}

impl AppState {
    pub fn new(config: Arc<ConfigV1>, metrics: Metrics) -> Self {
        AppState {
            metrics_cache: ScrapeCache::new(config.metrics.ttl),
            telemetry_cache: ScrapeCache::new(config.telemetry.ttl),
            telemetry: Arc::new(telemetry_registry()),
            config,
            metrics,
        }
    }

    pub fn cache_for(&self, exposition: Exposition) -> &ScrapeCache {
        match exposition {
            Exposition::Metrics | Exposition::Combined => &self.metrics_cache,
            Exposition::Telemetry => &self.telemetry_cache,
        }
    }
}

/// Registry for process telemetry. Process statistics are only available
/// on Linux.
pub fn telemetry_registry() -> Registry {
    let registry = Registry::new();
    #[cfg(target_os = "linux")]
    {
        use tracing::warn;

        let collector = prometheus::process_collector::ProcessCollector::for_self();
        if let Err(err) = registry.register(Box::new(collector)) {
            warn!("Failed to register process collector: {}", err);
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ttl_never_caches() {
        let cache = ScrapeCache::new(0);
        cache.set("body".to_string());
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn test_cache_returns_body_within_ttl() {
        let cache = ScrapeCache::new(60);
        assert_eq!(cache.get(), None);
        cache.set("body".to_string());
        assert_eq!(cache.get().as_deref(), Some("body"));
    }

    #[test]
    fn test_caches_are_per_exposition() {
        let mut config = ConfigV1::default();
        config.metrics.ttl = 60;
        let state = AppState::new(Arc::new(config), Metrics::new());

        state.cache_for(Exposition::Metrics).set("metrics".to_string());
        assert_eq!(
            state.cache_for(Exposition::Combined).get().as_deref(),
            Some("metrics")
        );
        assert_eq!(state.cache_for(Exposition::Telemetry).get(), None);
    }
}
