use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Stable numeric user identifier.
pub type UserId = u64;

/// A user that can be assigned to a variant.
///
/// A user is either authenticated or anonymous. Either way the id is non-zero, so resolving
/// [`User::id`] never fails once a `User` exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum User {
    /// A user with an account.
    Authenticated(NonZeroU64),
    /// A visitor identified by an anonymous id.
    Anonymous(NonZeroU64),
}

impl User {
    /// Create an authenticated user.
    pub fn authenticated(id: UserId) -> Result<User, ValidationError> {
        NonZeroU64::new(id)
            .map(User::Authenticated)
            .ok_or(ValidationError::UserIdRequired)
    }

    /// Create an anonymous user.
    pub fn anonymous(id: UserId) -> Result<User, ValidationError> {
        NonZeroU64::new(id)
            .map(User::Anonymous)
            .ok_or(ValidationError::UserIdRequired)
    }

    /// Resolve a user from a pair of raw ids where zero means "unset". The authenticated id takes
    /// precedence over the anonymous one.
    pub fn from_ids(id: UserId, anonymous_id: UserId) -> Result<User, ValidationError> {
        User::authenticated(id).or_else(|_| User::anonymous(anonymous_id))
    }

    /// The resolved id.
    pub fn id(&self) -> UserId {
        match self {
            User::Authenticated(id) | User::Anonymous(id) => id.get(),
        }
    }

    /// Return `true` for anonymous users.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, User::Anonymous(_))
    }
}
