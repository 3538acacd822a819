use std::{sync::Arc, time::Duration};

use crate::{
    cache::ExpiringCache,
    clock::{Clock, SystemClock},
    config::ServiceConfig,
    error::{Error, RepositoryError, ValidationError, ValidationErrors},
    repository::{Deadline, EventRepository, FeatureRepository},
    Event, Feature, Result, User, Variant,
};

/// Entry point for looking up features, assigning users to variants, and recording events.
///
/// Reads go through an in-memory cache: [`get_feature`](Self::get_feature) serves a cached feature
/// when it has one and otherwise loads it from the [`FeatureRepository`] and caches it for the
/// configured TTL. Mutations go straight to the repository and leave the cache alone, so a changed
/// or deleted feature may still be served until its cache entry expires.
///
/// In order to create a service instance, first create [`ServiceConfig`].
///
/// # Examples
/// ```
/// # use splitter::{Deadline, Feature, MemoryEventRepository, MemoryFeatureRepository, ServiceConfig, User, Variant, VariantSet};
/// let service = ServiceConfig::new(MemoryFeatureRepository::new(), MemoryEventRepository::new())
///     .to_service()
///     .unwrap();
///
/// let variants = VariantSet::new([Variant::new("red", 50).unwrap(), Variant::new("green", 50).unwrap()]).unwrap();
/// let feature = service
///     .create_feature(Feature::new("red_button", "", true, variants).unwrap(), Deadline::NONE)
///     .unwrap();
///
/// let user = User::authenticated(42).unwrap();
/// let variant = service.get_assignment(feature.id.unwrap(), &user, Deadline::NONE).unwrap();
/// assert!(variant.is_some());
/// ```
pub struct FeatureAssignmentService<C: Clock = SystemClock> {
    features: Box<dyn FeatureRepository>,
    events: Box<dyn EventRepository>,
    cache: ExpiringCache<Arc<Feature>, C>,
    feature_ttl: Duration,
}

impl<C: Clock> FeatureAssignmentService<C> {
    pub(crate) fn new(config: ServiceConfig, clock: C) -> Result<Self> {
        let cache = ExpiringCache::with_clock(config.cache, clock)?;

        Ok(FeatureAssignmentService {
            features: config.features,
            events: config.events,
            cache,
            feature_ttl: config.feature_ttl,
        })
    }

    /// Get a feature by id, serving it from the cache when possible.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `id` is not positive.
    /// - [`Error::NotFound`] if the feature does not exist. Nothing is cached in this case.
    /// - [`Error::Repository`] if the repository failed.
    pub fn get_feature(&self, id: i64, deadline: Deadline) -> Result<Arc<Feature>> {
        check_feature_id(id)?;

        let key = id.to_string();
        if let Some(feature) = self.cache.get(&key) {
            log::trace!(target: "splitter", feature_id = id; "feature cache hit");
            return Ok(feature);
        }

        log::debug!(target: "splitter", feature_id = id; "feature cache miss, loading from repository");
        let feature = deadline
            .check()
            .and_then(|()| self.features.get_by_id(id, deadline))
            .map_err(|err| repository_error("get feature", Some(id), err))?;

        let feature = Arc::new(feature);
        self.cache.set(key, feature.clone(), self.feature_ttl);
        Ok(feature)
    }

    /// List all features, ordered by id. Always reads from the repository.
    pub fn list_features(&self, deadline: Deadline) -> Result<Vec<Feature>> {
        deadline
            .check()
            .and_then(|()| self.features.list(deadline))
            .map_err(|err| repository_error("list features", None, err))
    }

    /// Validate and persist a new feature. Returns the feature with ids assigned.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the feature is malformed. The repository is not called.
    /// - [`Error::Repository`] if the repository failed.
    pub fn create_feature(&self, mut feature: Feature, deadline: Deadline) -> Result<Feature> {
        feature.validate()?;

        deadline
            .check()
            .and_then(|()| self.features.create(&mut feature, deadline))
            .map_err(|err| repository_error("create feature", None, err))?;

        log::debug!(target: "splitter",
                    feature_id = feature.id,
                    feature = feature.name.as_str();
                    "created feature");
        Ok(feature)
    }

    /// Validate and persist changes to an existing feature, replacing its whole variant set.
    /// Variants of `feature` receive fresh ids.
    ///
    /// The cached copy of the feature, if any, is left in place and keeps being served until it
    /// expires.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the feature is malformed or has no valid id.
    /// - [`Error::NotFound`] if the feature does not exist.
    /// - [`Error::Repository`] if the repository failed.
    pub fn update_feature(&self, feature: &mut Feature, deadline: Deadline) -> Result<()> {
        let mut errors = Vec::new();
        let id = feature.id.unwrap_or(0);
        if id <= 0 {
            errors.push(ValidationError::InvalidFeatureId { id });
        }
        if let Err(feature_errors) = feature.validate() {
            errors.extend(feature_errors.errors().iter().cloned());
        }
        ValidationErrors::check(errors)?;

        deadline
            .check()
            .and_then(|()| self.features.update(feature, deadline))
            .map_err(|err| repository_error("update feature", Some(id), err))?;

        log::debug!(target: "splitter", feature_id = id; "updated feature");
        Ok(())
    }

    /// Delete a feature and its variants.
    ///
    /// The cached copy of the feature, if any, is left in place and keeps being served until it
    /// expires.
    pub fn delete_feature(&self, id: i64, deadline: Deadline) -> Result<()> {
        deadline
            .check()
            .and_then(|()| self.features.delete(id, deadline))
            .map_err(|err| repository_error("delete feature", None, err))?;

        log::debug!(target: "splitter", feature_id = id; "deleted feature");
        Ok(())
    }

    /// Validate and persist an event. Returns the event with its id and timestamp assigned.
    pub fn record_event(&self, mut event: Event, deadline: Deadline) -> Result<Event> {
        event.validate()?;

        deadline
            .check()
            .and_then(|()| self.events.create(&mut event, deadline))
            .map_err(|err| repository_error("record event", None, err))?;

        log::trace!(target: "splitter",
                    feature_id = event.feature_id,
                    user_id = event.user_id,
                    variant = event.variant.as_str(),
                    event_type = event.event_type.as_str();
                    "recorded event");
        Ok(event)
    }

    /// List events recorded for a feature, newest first.
    pub fn list_events_by_feature(&self, feature_id: i64, deadline: Deadline) -> Result<Vec<Event>> {
        deadline
            .check()
            .and_then(|()| self.events.list_by_feature_id(feature_id, deadline))
            .map_err(|err| repository_error("list events", None, err))
    }

    /// Get the variant `user` is assigned to in feature `feature_id`.
    ///
    /// Returns `Ok(None)` if the feature is not active.
    ///
    /// # Errors
    ///
    /// Same as [`get_feature`](Self::get_feature), plus [`Error::InvariantViolation`] if the
    /// feature has no variant with a positive weight.
    pub fn get_assignment(
        &self,
        feature_id: i64,
        user: &User,
        deadline: Deadline,
    ) -> Result<Option<Variant>> {
        let feature = self.get_feature(feature_id, deadline)?;

        if !feature.active {
            log::trace!(target: "splitter",
                        feature_id,
                        user_id = user.id();
                        "feature is not active, no assignment");
            return Ok(None);
        }

        let variant = feature.variant_for_user(user)?;
        Ok(Some(variant.clone()))
    }

    /// Stop the cache sweeper thread and block waiting for it to exit.
    pub fn shutdown(self) -> Result<()> {
        self.cache.shutdown()
    }
}

fn check_feature_id(id: i64) -> Result<()> {
    if id <= 0 {
        return Err(ValidationError::InvalidFeatureId { id }.into());
    }
    Ok(())
}

/// `id` is set for operations where "not found" is a distinct outcome.
fn repository_error(operation: &'static str, id: Option<i64>, err: RepositoryError) -> Error {
    match id {
        Some(id) if matches!(err, RepositoryError::NotFound) => Error::from_repository(operation, id, err),
        _ => {
            log::warn!(target: "splitter", operation; "repository error: {}", err);
            Error::repository(operation, err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs::File,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use super::FeatureAssignmentService;
    use crate::{
        clock::ManualClock,
        error::{Error, InvariantViolation, RepositoryError, ValidationError},
        memory::{MemoryEventRepository, MemoryFeatureRepository},
        repository::{Deadline, FeatureRepository},
        variant::{Variant, VariantSet},
        Event, Feature, ServiceConfig, User,
    };

    const RED_BUTTON: i64 = 1;
    const PRICING_PAGE: i64 = 2;
    const ONBOARDING_HOLDOUT: i64 = 3;

    /// Counts calls to `get_by_id` and can be switched to fail every call.
    struct CountingRepository {
        inner: MemoryFeatureRepository,
        get_calls: Arc<AtomicUsize>,
        failing: bool,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("connection refused")]
    struct ConnectionRefused;

    impl CountingRepository {
        fn fail(&self) -> Result<(), RepositoryError> {
            if self.failing {
                Err(RepositoryError::backend(ConnectionRefused))
            } else {
                Ok(())
            }
        }
    }

    impl FeatureRepository for CountingRepository {
        fn get_by_id(&self, id: i64, deadline: Deadline) -> Result<Feature, RepositoryError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            self.fail()?;
            self.inner.get_by_id(id, deadline)
        }

        fn list(&self, deadline: Deadline) -> Result<Vec<Feature>, RepositoryError> {
            self.fail()?;
            self.inner.list(deadline)
        }

        fn create(&self, feature: &mut Feature, deadline: Deadline) -> Result<(), RepositoryError> {
            self.fail()?;
            self.inner.create(feature, deadline)
        }

        fn update(&self, feature: &mut Feature, deadline: Deadline) -> Result<(), RepositoryError> {
            self.fail()?;
            self.inner.update(feature, deadline)
        }

        fn delete(&self, id: i64, deadline: Deadline) -> Result<(), RepositoryError> {
            self.fail()?;
            self.inner.delete(id, deadline)
        }
    }

    struct Fixture {
        service: FeatureAssignmentService<ManualClock>,
        clock: ManualClock,
        get_calls: Arc<AtomicUsize>,
    }

    fn fixture_with(failing: bool) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();

        let inner =
            MemoryFeatureRepository::from_reader(File::open("tests/data/features.json").unwrap())
                .unwrap();
        let get_calls = Arc::new(AtomicUsize::new(0));
        let clock = ManualClock::new();

        let mut config = ServiceConfig::new(
            CountingRepository {
                inner,
                get_calls: get_calls.clone(),
                failing,
            },
            MemoryEventRepository::new(),
        );
        config.sweep_interval(Duration::from_secs(3600));
        let service = config.to_service_with_clock(clock.clone()).unwrap();

        Fixture {
            service,
            clock,
            get_calls,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(false)
    }

    fn user(id: u64) -> User {
        User::authenticated(id).unwrap()
    }

    fn single_variant(name: &str, weight: u8) -> VariantSet {
        VariantSet::new([Variant::new(name, weight).unwrap()]).unwrap()
    }

    #[test]
    fn second_get_is_served_from_cache() {
        let f = fixture();

        let first = f.service.get_feature(RED_BUTTON, Deadline::NONE).unwrap();
        assert_eq!(f.get_calls.load(Ordering::SeqCst), 1);

        let second = f.service.get_feature(RED_BUTTON, Deadline::NONE).unwrap();
        assert_eq!(f.get_calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name, "red_button");
    }

    #[test]
    fn feature_is_reloaded_after_ttl() {
        let f = fixture();

        f.service.get_feature(RED_BUTTON, Deadline::NONE).unwrap();
        f.clock.advance(ServiceConfig::DEFAULT_FEATURE_TTL - Duration::from_secs(1));
        f.service.get_feature(RED_BUTTON, Deadline::NONE).unwrap();
        assert_eq!(f.get_calls.load(Ordering::SeqCst), 1);

        f.clock.advance(Duration::from_secs(1));
        f.service.get_feature(RED_BUTTON, Deadline::NONE).unwrap();
        assert_eq!(f.get_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn huge_feature_ttl_keeps_feature_cached() {
        let clock = ManualClock::new();
        let mut config = ServiceConfig::new(
            MemoryFeatureRepository::from_reader(File::open("tests/data/features.json").unwrap())
                .unwrap(),
            MemoryEventRepository::new(),
        );
        config
            .feature_ttl(Duration::MAX)
            .sweep_interval(Duration::from_secs(3600));
        let service = config.to_service_with_clock(clock.clone()).unwrap();

        let first = service.get_feature(RED_BUTTON, Deadline::NONE).unwrap();
        clock.advance(Duration::from_secs(365 * 24 * 3600));
        let second = service.get_feature(RED_BUTTON, Deadline::NONE).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn not_found_is_not_cached() {
        let f = fixture();

        for _ in 0..2 {
            assert!(matches!(
                f.service.get_feature(99, Deadline::NONE),
                Err(Error::NotFound { id: 99 })
            ));
        }
        assert_eq!(f.get_calls.load(Ordering::SeqCst), 2);
        assert!(f.service.cache.is_empty());
    }

    #[test]
    fn rejects_non_positive_ids() {
        let f = fixture();

        let err = f.service.get_feature(0, Deadline::NONE).unwrap_err();
        assert!(matches!(err, Error::Validation(ref errors)
            if errors.contains(&ValidationError::InvalidFeatureId { id: 0 })));
        assert_eq!(f.get_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn update_does_not_invalidate_cache() {
        let f = fixture();
        let cached = f.service.get_feature(PRICING_PAGE, Deadline::NONE).unwrap();

        let mut updated = (*cached).clone();
        updated.variants = single_variant("control", 100);
        f.service.update_feature(&mut updated, Deadline::NONE).unwrap();

        let stale = f.service.get_feature(PRICING_PAGE, Deadline::NONE).unwrap();
        assert_eq!(stale.variants.len(), 3);

        f.clock.advance(ServiceConfig::DEFAULT_FEATURE_TTL);
        let fresh = f.service.get_feature(PRICING_PAGE, Deadline::NONE).unwrap();
        assert_eq!(fresh.variants.names().collect::<Vec<_>>(), ["control"]);
    }

    #[test]
    fn update_validates_before_repository() {
        let f = fixture();

        let mut unsaved = Feature::new("unsaved", "", true, single_variant("a", 10)).unwrap();
        let err = f
            .service
            .update_feature(&mut unsaved, Deadline::NONE)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref errors)
            if errors.contains(&ValidationError::InvalidFeatureId { id: 0 })));

        unsaved.id = Some(99);
        assert!(matches!(
            f.service.update_feature(&mut unsaved, Deadline::NONE),
            Err(Error::NotFound { id: 99 })
        ));
    }

    #[test]
    fn delete_does_not_evict_cache() {
        let f = fixture();
        f.service.get_feature(RED_BUTTON, Deadline::NONE).unwrap();

        f.service.delete_feature(RED_BUTTON, Deadline::NONE).unwrap();
        assert!(f.service.get_feature(RED_BUTTON, Deadline::NONE).is_ok());

        f.clock.advance(ServiceConfig::DEFAULT_FEATURE_TTL);
        assert!(matches!(
            f.service.get_feature(RED_BUTTON, Deadline::NONE),
            Err(Error::NotFound { id: RED_BUTTON })
        ));
    }

    #[test]
    fn create_validates_before_repository() {
        let f = fixture();

        let mut invalid = Feature::new("checkout", "", true, single_variant("a", 60)).unwrap();
        invalid.name.clear();
        let err = f
            .service
            .create_feature(invalid, Deadline::NONE)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(f.service.list_features(Deadline::NONE).unwrap().len(), 3);

        let created = f
            .service
            .create_feature(
                Feature::new("checkout", "", true, single_variant("a", 60)).unwrap(),
                Deadline::NONE,
            )
            .unwrap();
        assert_eq!(created.id, Some(4));
        assert!(created.variants.iter().all(|v| v.id.is_some()));
    }

    #[test]
    fn list_bypasses_cache() {
        let f = fixture();

        let features = f.service.list_features(Deadline::NONE).unwrap();
        assert_eq!(features.len(), 3);
        assert!(f.service.cache.is_empty());
    }

    #[test]
    fn assigns_active_features_only() {
        let f = fixture();

        let variant = f
            .service
            .get_assignment(RED_BUTTON, &user(42), Deadline::NONE)
            .unwrap()
            .unwrap();
        assert!(variant.name == "red" || variant.name == "green");

        assert_eq!(
            f.service
                .get_assignment(ONBOARDING_HOLDOUT, &user(42), Deadline::NONE)
                .unwrap(),
            None
        );
    }

    #[test]
    fn assignment_is_stable_across_cache_reloads() {
        let f = fixture();

        let first = f
            .service
            .get_assignment(PRICING_PAGE, &user(7), Deadline::NONE)
            .unwrap();
        f.clock.advance(ServiceConfig::DEFAULT_FEATURE_TTL * 2);
        let second = f
            .service
            .get_assignment(PRICING_PAGE, &user(7), Deadline::NONE)
            .unwrap();

        assert_eq!(f.get_calls.load(Ordering::SeqCst), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn zero_weight_feature_fails_loudly() {
        let f = fixture();
        let created = f
            .service
            .create_feature(
                Feature::new("dark_launch", "", true, single_variant("off", 0)).unwrap(),
                Deadline::NONE,
            )
            .unwrap();

        let err = f
            .service
            .get_assignment(created.id.unwrap(), &user(1), Deadline::NONE)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvariantViolation(InvariantViolation::ZeroTotalWeight { .. })
        ));
    }

    #[test]
    fn records_and_lists_events() {
        let f = fixture();

        for event_type in ["view", "click"] {
            let event = f
                .service
                .record_event(
                    Event::new(RED_BUTTON, 42, "red", event_type).unwrap(),
                    Deadline::NONE,
                )
                .unwrap();
            assert!(event.id.is_some());
            assert!(event.created_at.is_some());
        }

        let events = f
            .service
            .list_events_by_feature(RED_BUTTON, Deadline::NONE)
            .unwrap();
        assert_eq!(
            events.iter().map(|e| e.event_type.as_str()).collect::<Vec<_>>(),
            ["click", "view"]
        );
        assert!(f.service.cache.is_empty());
    }

    #[test]
    fn record_event_validates() {
        let f = fixture();

        let mut event = Event::new(RED_BUTTON, 42, "red", "view").unwrap();
        event.event_type.clear();

        let err = f.service.record_event(event, Deadline::NONE).unwrap_err();
        assert!(matches!(err, Error::Validation(ref errors)
            if errors.contains(&ValidationError::EventTypeRequired)));
        assert!(f
            .service
            .list_events_by_feature(RED_BUTTON, Deadline::NONE)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn repository_failures_are_wrapped() {
        let f = fixture_with(true);

        let err = f.service.get_feature(RED_BUTTON, Deadline::NONE).unwrap_err();
        assert!(matches!(
            err,
            Error::Repository {
                operation: "get feature",
                source: RepositoryError::Backend(_),
            }
        ));
        assert_eq!(err.to_string(), "get feature: connection refused");
        assert!(f.service.cache.is_empty());

        let err = f.service.list_features(Deadline::NONE).unwrap_err();
        assert_eq!(err.to_string(), "list features: connection refused");
    }

    #[test]
    fn expired_deadline_skips_repository() {
        let f = fixture();

        let err = f
            .service
            .get_feature(RED_BUTTON, Deadline::after(Duration::ZERO))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Repository {
                operation: "get feature",
                source: RepositoryError::DeadlineExceeded,
            }
        ));
        assert_eq!(f.get_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cached_feature_ignores_deadline() {
        let f = fixture();
        f.service.get_feature(RED_BUTTON, Deadline::NONE).unwrap();

        assert!(f
            .service
            .get_feature(RED_BUTTON, Deadline::after(Duration::ZERO))
            .is_ok());
    }

    #[test]
    fn concurrent_assignments() {
        let f = fixture();
        let service = Arc::new(f.service);

        let handles = (0..8u64)
            .map(|t| {
                let service = service.clone();
                std::thread::spawn(move || {
                    for id in 1..=500u64 {
                        let user = User::authenticated(t * 1_000 + id).unwrap();
                        let variant = service
                            .get_assignment(RED_BUTTON, &user, Deadline::NONE)
                            .unwrap();
                        assert!(variant.is_some());
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        // Racing misses may load the feature more than once, but never once per call.
        assert!(f.get_calls.load(Ordering::SeqCst) <= 8);
    }

    #[test]
    fn shutdown_stops_sweeper() {
        let f = fixture();
        f.service.shutdown().unwrap();
    }
}
