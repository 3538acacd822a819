//! Deterministic experiment variant assignment backed by a self-expiring feature cache.
//!
//! # Overview
//!
//! A [`Feature`] is an experiment with an ordered [`VariantSet`] of weighted [`Variant`]s. Weights
//! are integers out of 100 and the set never exceeds that total. Given a [`User`], the feature
//! deterministically picks one variant: the same user always lands in the same variant as long as
//! the variants don't change, and over many users each variant receives its share of the traffic.
//! See the [`assignment`] module for the algorithm.
//!
//! [`FeatureAssignmentService`] ties everything together. Features live in a
//! [`FeatureRepository`] and events in an [`EventRepository`]; both are traits, so any storage can
//! be plugged in. [`MemoryFeatureRepository`] and [`MemoryEventRepository`] keep everything in
//! process memory.
//!
//! Feature lookups go through an [`ExpiringCache`]. On a miss, the feature is loaded from the
//! repository and cached for a fixed TTL. Mutations are written to the repository only, so a
//! changed feature may still be served from the cache until its entry expires. Each cache owns a
//! background sweeper thread that reclaims expired entries.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Validation errors and missing features are
//! normal outcomes that callers are expected to handle. [`Error::InvariantViolation`] indicates a
//! feature that cannot be assigned at all and usually needs a developer's attention.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `splitter` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into cache and repository activity.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod assignment;
pub mod cache;
pub mod clock;
pub mod memory;
pub mod repository;
pub mod sharder;

mod config;
mod error;
mod event;
mod feature;
mod service;
mod sweeper;
mod user;
mod variant;

pub use cache::ExpiringCache;
pub use config::{CacheConfig, ServiceConfig};
pub use error::{Error, InvariantViolation, RepositoryError, Result, ValidationError, ValidationErrors};
pub use event::Event;
pub use feature::Feature;
pub use memory::{MemoryEventRepository, MemoryFeatureRepository};
pub use repository::{Deadline, EventRepository, FeatureRepository};
pub use service::FeatureAssignmentService;
pub use user::{User, UserId};
pub use variant::{Variant, VariantSet, MAXIMUM_WEIGHT};
