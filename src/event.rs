use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ValidationError, ValidationErrors},
    UserId,
};

/// An observed assignment, e.g. a user seeing or converting on a variant.
///
/// Events are recorded once and never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Assigned by the repository.
    #[serde(default)]
    pub id: Option<i64>,
    pub feature_id: i64,
    pub user_id: UserId,
    /// Name of the variant the user was assigned to.
    pub variant: String,
    /// Free-form event type, e.g. `"view"` or `"click"`.
    pub event_type: String,
    /// Assigned by the repository.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Create a new, not yet recorded event and validate it.
    pub fn new(
        feature_id: i64,
        user_id: UserId,
        variant: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Result<Event, ValidationErrors> {
        let event = Event {
            id: None,
            feature_id,
            user_id,
            variant: variant.into(),
            event_type: event_type.into(),
            created_at: None,
        };
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();

        if self.feature_id <= 0 {
            errors.push(ValidationError::InvalidFeatureId {
                id: self.feature_id,
            });
        }

        if self.event_type.is_empty() {
            errors.push(ValidationError::EventTypeRequired);
        }

        ValidationErrors::check(errors)
    }
}
