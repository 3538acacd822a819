//! In-memory repositories.
//!
//! They follow the same contracts as a database-backed implementation would: ids are assigned on
//! create, updates replace the whole variant set, and events are listed newest first. They are
//! handy for tests, demos and small deployments that can afford to lose their data on restart.
use std::{collections::BTreeMap, io::Read, sync::RwLock};

use chrono::Utc;
use serde::{de::Error as _, Deserialize};

use crate::{
    error::RepositoryError,
    repository::{Deadline, EventRepository, FeatureRepository},
    Event, Feature,
};

#[derive(Default)]
struct FeatureTable {
    rows: BTreeMap<i64, Feature>,
    last_feature_id: i64,
    last_variant_id: i64,
}

impl FeatureTable {
    fn insert_variants(&mut self, feature: &mut Feature) {
        let last_variant_id = &mut self.last_variant_id;
        feature.variants.assign_ids(|| {
            *last_variant_id += 1;
            *last_variant_id
        });
    }
}

/// A [`FeatureRepository`] that keeps features in process memory.
#[derive(Default)]
pub struct MemoryFeatureRepository {
    table: RwLock<FeatureTable>,
}

/// Seed document accepted by [`MemoryFeatureRepository::from_reader`].
#[derive(Deserialize)]
struct Seed {
    features: Vec<Feature>,
}

impl MemoryFeatureRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        MemoryFeatureRepository::default()
    }

    /// Create a repository seeded from a JSON document of the form `{"features": [...]}`.
    ///
    /// Ids in the document are ignored; features receive ids in document order. Every feature is
    /// validated while parsing.
    pub fn from_reader(reader: impl Read) -> serde_json::Result<Self> {
        let seed: Seed = serde_json::from_reader(reader)?;

        let repository = MemoryFeatureRepository::new();
        {
            let mut table = repository.table.write().expect("lock is not shared yet");
            for mut feature in seed.features {
                feature.validate().map_err(serde_json::Error::custom)?;
                table.last_feature_id += 1;
                let id = table.last_feature_id;
                feature.id = Some(id);
                table.insert_variants(&mut feature);
                table.rows.insert(id, feature);
            }
        }
        Ok(repository)
    }
}

impl FeatureRepository for MemoryFeatureRepository {
    fn get_by_id(&self, id: i64, deadline: Deadline) -> Result<Feature, RepositoryError> {
        deadline.check()?;

        let table = self
            .table
            .read()
            .expect("thread holding feature table lock should not panic");
        table.rows.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    fn list(&self, deadline: Deadline) -> Result<Vec<Feature>, RepositoryError> {
        deadline.check()?;

        let table = self
            .table
            .read()
            .expect("thread holding feature table lock should not panic");
        Ok(table.rows.values().cloned().collect())
    }

    fn create(&self, feature: &mut Feature, deadline: Deadline) -> Result<(), RepositoryError> {
        deadline.check()?;

        let mut table = self
            .table
            .write()
            .expect("thread holding feature table lock should not panic");
        table.last_feature_id += 1;
        let id = table.last_feature_id;
        feature.id = Some(id);
        table.insert_variants(feature);
        table.rows.insert(id, feature.clone());
        Ok(())
    }

    fn update(&self, feature: &mut Feature, deadline: Deadline) -> Result<(), RepositoryError> {
        deadline.check()?;

        let id = feature.id.ok_or(RepositoryError::NotFound)?;
        let mut table = self
            .table
            .write()
            .expect("thread holding feature table lock should not panic");
        if !table.rows.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }

        // Variants are deleted and reinserted, so they always get fresh ids.
        table.insert_variants(feature);
        table.rows.insert(id, feature.clone());
        Ok(())
    }

    fn delete(&self, id: i64, deadline: Deadline) -> Result<(), RepositoryError> {
        deadline.check()?;

        let mut table = self
            .table
            .write()
            .expect("thread holding feature table lock should not panic");
        table.rows.remove(&id);
        Ok(())
    }
}

#[derive(Default)]
struct EventTable {
    rows: Vec<Event>,
    last_id: i64,
}

/// An [`EventRepository`] that keeps events in process memory.
#[derive(Default)]
pub struct MemoryEventRepository {
    table: RwLock<EventTable>,
}

impl MemoryEventRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        MemoryEventRepository::default()
    }
}

impl EventRepository for MemoryEventRepository {
    fn create(&self, event: &mut Event, deadline: Deadline) -> Result<(), RepositoryError> {
        deadline.check()?;

        let mut table = self
            .table
            .write()
            .expect("thread holding event table lock should not panic");
        table.last_id += 1;
        event.id = Some(table.last_id);
        event.created_at = Some(Utc::now());
        table.rows.push(event.clone());
        Ok(())
    }

    fn list_by_feature_id(
        &self,
        feature_id: i64,
        deadline: Deadline,
    ) -> Result<Vec<Event>, RepositoryError> {
        deadline.check()?;

        let table = self
            .table
            .read()
            .expect("thread holding event table lock should not panic");
        let mut events: Vec<Event> = table
            .rows
            .iter()
            .filter(|event| event.feature_id == feature_id)
            .cloned()
            .collect();
        // Ids break ties between events created within the same clock tick.
        events.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(events)
    }
}
