use std::collections::HashSet;

use derive_more::Into;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationErrors};

/// Maximum total weight of all variants in a feature.
pub const MAXIMUM_WEIGHT: u32 = 100;

/// One arm of an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    /// Assigned by the repository. `None` for variants that were not persisted yet.
    #[serde(default)]
    pub id: Option<i64>,
    /// Unique within a feature.
    pub name: String,
    /// Relative weight out of [`MAXIMUM_WEIGHT`].
    pub weight: u8,
}

impl Variant {
    /// Create a new, not yet persisted variant.
    pub fn new(name: impl Into<String>, weight: u8) -> Result<Variant, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::VariantNameRequired);
        }
        if u32::from(weight) > MAXIMUM_WEIGHT {
            return Err(ValidationError::WeightExceeded {
                total: weight.into(),
            });
        }

        Ok(Variant {
            id: None,
            name,
            weight,
        })
    }
}

/// Ordered variants of a feature.
///
/// The set never holds more than [`MAXIMUM_WEIGHT`] in total, and names are unique. Order is
/// significant: assignment walks the variants in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Into)]
#[serde(try_from = "Vec<Variant>", into = "Vec<Variant>")]
pub struct VariantSet(Vec<Variant>);

impl VariantSet {
    /// Create an empty set.
    pub fn empty() -> VariantSet {
        VariantSet::default()
    }

    /// Build a set from `variants`, rejecting it if any invariant does not hold.
    pub fn new(variants: impl IntoIterator<Item = Variant>) -> Result<VariantSet, ValidationErrors> {
        let set = VariantSet(variants.into_iter().collect());
        set.validate()?;
        Ok(set)
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> u32 {
        self.0.iter().map(|v| u32::from(v.weight)).sum()
    }

    /// Append `variant`. The set is left unchanged on error.
    pub fn add(&mut self, variant: Variant) -> Result<(), ValidationError> {
        if variant.name.is_empty() {
            return Err(ValidationError::VariantNameRequired);
        }

        let total = self.total_weight() + u32::from(variant.weight);
        if total > MAXIMUM_WEIGHT {
            return Err(ValidationError::WeightExceeded { total });
        }

        if self.get(&variant.name).is_some() {
            return Err(ValidationError::VariantAlreadyExists { name: variant.name });
        }

        self.0.push(variant);
        Ok(())
    }

    /// Check every invariant over the whole set and report all violations.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();

        if self.0.iter().any(|v| v.name.is_empty()) {
            errors.push(ValidationError::VariantNameRequired);
        }

        let total = self.total_weight();
        if total > MAXIMUM_WEIGHT {
            errors.push(ValidationError::WeightExceeded { total });
        }

        let mut seen = HashSet::with_capacity(self.0.len());
        let mut reported = HashSet::new();
        for name in self.names() {
            if !seen.insert(name) && reported.insert(name) {
                errors.push(ValidationError::VariantAlreadyExists {
                    name: name.to_owned(),
                });
            }
        }

        ValidationErrors::check(errors)
    }

    /// Stamp ids on all variants, in order. Names and weights are left alone.
    pub fn assign_ids(&mut self, mut next_id: impl FnMut() -> i64) {
        for variant in &mut self.0 {
            variant.id = Some(next_id());
        }
    }

    /// Find a variant by name.
    pub fn get(&self, name: &str) -> Option<&Variant> {
        self.0.iter().find(|v| v.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|v| v.name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variant> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Variant] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<Variant>> for VariantSet {
    type Error = ValidationErrors;

    fn try_from(value: Vec<Variant>) -> Result<Self, Self::Error> {
        VariantSet::new(value)
    }
}

impl<'a> IntoIterator for &'a VariantSet {
    type Item = &'a Variant;
    type IntoIter = std::slice::Iter<'a, Variant>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{Variant, VariantSet};
    use crate::error::ValidationError;

    fn variant(name: &str, weight: u8) -> Variant {
        Variant::new(name, weight).unwrap()
    }

    #[test]
    fn new_variant_requires_name_and_sane_weight() {
        assert_eq!(Variant::new("", 10), Err(ValidationError::VariantNameRequired));
        assert_eq!(
            Variant::new("a", 101),
            Err(ValidationError::WeightExceeded { total: 101 })
        );
    }

    #[test]
    fn add_rejects_weight_overflow_without_mutating() {
        let mut set = VariantSet::new([variant("a", 60), variant("b", 30)]).unwrap();

        assert_eq!(
            set.add(variant("c", 11)),
            Err(ValidationError::WeightExceeded { total: 101 })
        );
        assert_eq!(set.len(), 2);
        assert_eq!(set.total_weight(), 90);

        set.add(variant("c", 10)).unwrap();
        assert_eq!(set.total_weight(), 100);
    }

    #[test]
    fn add_rejects_duplicate_name_without_mutating() {
        let mut set = VariantSet::new([variant("a", 10)]).unwrap();

        assert_eq!(
            set.add(variant("a", 5)),
            Err(ValidationError::VariantAlreadyExists {
                name: "a".to_owned()
            })
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.total_weight(), 10);
    }

    #[test]
    fn add_preserves_order() {
        let mut set = VariantSet::empty();
        set.add(variant("z", 10)).unwrap();
        set.add(variant("a", 10)).unwrap();
        set.add(variant("m", 0)).unwrap();

        assert_eq!(set.names().collect::<Vec<_>>(), ["z", "a", "m"]);
    }

    #[test]
    fn validate_reports_every_violation() {
        // Bypass `add` to build a malformed set.
        let set = VariantSet(vec![
            variant("a", 60),
            variant("a", 50),
            variant("a", 0),
            variant("b", 0),
        ]);

        let errors = set.validate().unwrap_err();
        assert_eq!(
            errors.errors(),
            [
                ValidationError::WeightExceeded { total: 110 },
                ValidationError::VariantAlreadyExists {
                    name: "a".to_owned()
                },
            ]
        );
    }

    #[test]
    fn deserialization_enforces_invariants() {
        let ok: VariantSet =
            serde_json::from_str(r#"[{"name": "a", "weight": 40}, {"name": "b", "weight": 60}]"#)
                .unwrap();
        assert_eq!(ok.total_weight(), 100);

        let overweight = serde_json::from_str::<VariantSet>(
            r#"[{"name": "a", "weight": 70}, {"name": "b", "weight": 70}]"#,
        );
        assert!(overweight.is_err());
    }

    #[test]
    fn assign_ids_keeps_weights() {
        let mut set = VariantSet::new([variant("a", 40), variant("b", 60)]).unwrap();
        let mut next = 10;
        set.assign_ids(|| {
            next += 1;
            next
        });

        assert_eq!(set.iter().map(|v| v.id).collect::<Vec<_>>(), [Some(11), Some(12)]);
        assert_eq!(set.total_weight(), 100);
    }
}
