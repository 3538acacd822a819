use std::time::Duration;

use crate::{
    clock::{Clock, SystemClock},
    repository::{EventRepository, FeatureRepository},
    FeatureAssignmentService, Result,
};

/// Configuration for [`ExpiringCache`](crate::ExpiringCache).
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Interval between background sweeps of expired entries. Zero means
    /// [`CacheConfig::DEFAULT_SWEEP_INTERVAL`].
    pub sweep_interval: Duration,
}

impl CacheConfig {
    /// Default value for [`CacheConfig::sweep_interval`].
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a new `CacheConfig` using default configuration.
    pub fn new() -> CacheConfig {
        CacheConfig::default()
    }

    /// Update sweep interval with `interval`.
    pub fn with_sweep_interval(mut self, interval: Duration) -> CacheConfig {
        self.sweep_interval = interval;
        self
    }

    pub(crate) fn effective_sweep_interval(&self) -> Duration {
        if self.sweep_interval.is_zero() {
            CacheConfig::DEFAULT_SWEEP_INTERVAL
        } else {
            self.sweep_interval
        }
    }
}

impl Default for CacheConfig {
    fn default() -> CacheConfig {
        CacheConfig {
            sweep_interval: CacheConfig::DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Configuration for [`FeatureAssignmentService`].
pub struct ServiceConfig {
    pub(crate) features: Box<dyn FeatureRepository>,
    pub(crate) events: Box<dyn EventRepository>,
    pub(crate) feature_ttl: Duration,
    pub(crate) cache: CacheConfig,
}

impl ServiceConfig {
    /// Default time a feature stays cached after it was loaded from the repository.
    pub const DEFAULT_FEATURE_TTL: Duration = Duration::from_secs(60);

    /// Create a default configuration on top of the given repositories.
    ///
    /// ```
    /// # use splitter::{MemoryEventRepository, MemoryFeatureRepository, ServiceConfig};
    /// ServiceConfig::new(MemoryFeatureRepository::new(), MemoryEventRepository::new());
    /// ```
    pub fn new(
        features: impl FeatureRepository + 'static,
        events: impl EventRepository + 'static,
    ) -> ServiceConfig {
        ServiceConfig {
            features: Box::new(features),
            events: Box::new(events),
            feature_ttl: ServiceConfig::DEFAULT_FEATURE_TTL,
            cache: CacheConfig::default(),
        }
    }

    /// Override how long a loaded feature is served from the cache. Zero keeps features cached
    /// until the process exits.
    pub fn feature_ttl(&mut self, ttl: Duration) -> &mut Self {
        self.feature_ttl = ttl;
        self
    }

    /// Override the cache sweep interval.
    pub fn sweep_interval(&mut self, interval: Duration) -> &mut Self {
        self.cache.sweep_interval = interval;
        self
    }

    /// Create a new [`FeatureAssignmentService`] using the specified configuration.
    ///
    /// ```
    /// # use splitter::{MemoryEventRepository, MemoryFeatureRepository, ServiceConfig};
    /// let service = ServiceConfig::new(MemoryFeatureRepository::new(), MemoryEventRepository::new())
    ///     .to_service()
    ///     .unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the cache sweeper thread failed to start.
    pub fn to_service(self) -> Result<FeatureAssignmentService> {
        FeatureAssignmentService::new(self, SystemClock)
    }

    /// Same as [`ServiceConfig::to_service`] but reading time from `clock`.
    pub fn to_service_with_clock<C: Clock>(self, clock: C) -> Result<FeatureAssignmentService<C>> {
        FeatureAssignmentService::new(self, clock)
    }
}
