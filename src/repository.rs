//! Persistence collaborators consumed by [`FeatureAssignmentService`].
//!
//! The service only talks to storage through these traits. [`crate::memory`] provides in-memory
//! implementations.
//!
//! [`FeatureAssignmentService`]: crate::FeatureAssignmentService
use std::time::{Duration, Instant};

use crate::{error::RepositoryError, Event, Feature};

/// A caller-supplied point in time after which repository calls should not be started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline.
    pub const NONE: Deadline = Deadline(None);

    /// A deadline `timeout` from now. A `timeout` too large to be represented as an [`Instant`]
    /// means no deadline.
    pub fn after(timeout: Duration) -> Deadline {
        Deadline(Instant::now().checked_add(timeout))
    }

    /// A deadline at `instant`.
    pub fn at(instant: Instant) -> Deadline {
        Deadline(Some(instant))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    /// Time left before the deadline. `None` if there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|instant| instant.saturating_duration_since(Instant::now()))
    }

    /// Fail with [`RepositoryError::DeadlineExceeded`] if the deadline has passed.
    pub fn check(&self) -> Result<(), RepositoryError> {
        match self.0 {
            Some(instant) if Instant::now() >= instant => Err(RepositoryError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Durable storage of features and their variants.
pub trait FeatureRepository: Send + Sync {
    /// Load a feature with all of its variants, in stored order.
    ///
    /// Returns [`RepositoryError::NotFound`] if there is no such feature.
    fn get_by_id(&self, id: i64, deadline: Deadline) -> Result<Feature, RepositoryError>;

    /// Load all features, ordered by id.
    fn list(&self, deadline: Deadline) -> Result<Vec<Feature>, RepositoryError>;

    /// Persist a new feature, assigning ids to it and to each of its variants.
    fn create(&self, feature: &mut Feature, deadline: Deadline) -> Result<(), RepositoryError>;

    /// Replace an existing feature and its whole variant set atomically. Old variants are removed
    /// and the new ones inserted with fresh ids.
    ///
    /// Returns [`RepositoryError::NotFound`] if there is no such feature.
    fn update(&self, feature: &mut Feature, deadline: Deadline) -> Result<(), RepositoryError>;

    /// Remove a feature and its variants atomically. Removing a missing feature is not an error.
    fn delete(&self, id: i64, deadline: Deadline) -> Result<(), RepositoryError>;
}

/// Append-only storage of assignment events.
pub trait EventRepository: Send + Sync {
    /// Persist a new event, assigning its id and creation timestamp.
    fn create(&self, event: &mut Event, deadline: Deadline) -> Result<(), RepositoryError>;

    /// Load events of a feature, newest first.
    fn list_by_feature_id(
        &self,
        feature_id: i64,
        deadline: Deadline,
    ) -> Result<Vec<Event>, RepositoryError>;
}
