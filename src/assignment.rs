//! Deterministic assignment of users to variants.
//!
//! Assignment is a pure function of the user id, the feature name and the ordered variant list.
//! It performs no I/O and keeps no state, so it can be called from any thread.
use crate::{
    error::{Error, InvariantViolation},
    sharder::{user_feature_key, Sharder},
    variant::{Variant, MAXIMUM_WEIGHT},
    User,
};

/// Pick the variant for `user` in feature `feature_name`.
///
/// The user id and feature name are hashed into a bucket in `[0, 100)`. Variants are walked in
/// order while accumulating weights, and the first variant whose running total exceeds the bucket
/// is selected. Zero-weight variants never take part in the walk.
///
/// When the weights sum to less than 100, buckets in the uncovered tail resolve to the *last*
/// variant in order, whatever its weight.
///
/// # Errors
///
/// Returns [`Error::InvariantViolation`] if there are no variants or all weights are zero.
pub fn assign<'a>(
    user: &User,
    feature_name: &str,
    variants: &'a [Variant],
    sharder: &impl Sharder,
) -> Result<&'a Variant, Error> {
    let Some(last) = variants.last() else {
        log::error!(target: "splitter", feature = feature_name; "assignment on a feature with no variants");
        return Err(InvariantViolation::NoVariants {
            feature: feature_name.to_owned(),
        }
        .into());
    };

    if variants.iter().all(|v| v.weight == 0) {
        log::error!(target: "splitter", feature = feature_name; "assignment on a feature with zero total weight");
        return Err(InvariantViolation::ZeroTotalWeight {
            feature: feature_name.to_owned(),
        }
        .into());
    }

    let bucket = sharder.get_bucket(
        user_feature_key(user.id(), feature_name),
        u64::from(MAXIMUM_WEIGHT),
    );

    let mut cumulative = 0u64;
    let selected = variants
        .iter()
        .filter(|v| v.weight > 0)
        .find(|v| {
            cumulative += u64::from(v.weight);
            bucket < cumulative
        })
        .unwrap_or(last);

    log::trace!(target: "splitter",
                feature = feature_name,
                user:serde = user,
                bucket,
                variant = selected.name.as_str();
                "assigned variant");

    Ok(selected)
}
