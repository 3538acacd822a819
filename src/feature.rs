use serde::{Deserialize, Serialize};

use crate::{
    assignment,
    error::{Error, ValidationError, ValidationErrors},
    sharder::{Md5Sharder, Sharder},
    variant::{Variant, VariantSet},
    User,
};

/// An experiment: a named set of weighted variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Assigned by the repository. `None` for features that were not persisted yet.
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub variants: VariantSet,
}

impl Feature {
    /// Create a new, not yet persisted feature and validate it.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        active: bool,
        variants: VariantSet,
    ) -> Result<Feature, ValidationErrors> {
        let feature = Feature {
            id: None,
            name: name.into(),
            description: description.into(),
            active,
            variants,
        };
        feature.validate()?;
        Ok(feature)
    }

    /// Append a variant, keeping the variant set invariants.
    pub fn add_variant(&mut self, variant: Variant) -> Result<(), ValidationError> {
        self.variants.add(variant)
    }

    /// Check that the feature is well-formed and can be handed to a repository.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push(ValidationError::NameRequired);
        }

        if let Err(variant_errors) = self.variants.validate() {
            errors.extend(variant_errors.errors().iter().cloned());
        }

        ValidationErrors::check(errors)
    }

    /// Deterministically pick the variant for `user`.
    ///
    /// See [`assignment::assign`] for the algorithm.
    pub fn variant_for_user(&self, user: &User) -> Result<&Variant, Error> {
        self.variant_for_user_with_sharder(user, &Md5Sharder)
    }

    /// Same as [`Feature::variant_for_user`] but with a custom `sharder`.
    pub fn variant_for_user_with_sharder(
        &self,
        user: &User,
        sharder: &impl Sharder,
    ) -> Result<&Variant, Error> {
        assignment::assign(user, &self.name, self.variants.as_slice(), sharder)
    }
}
