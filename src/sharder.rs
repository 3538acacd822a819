//! Sharder implementation.
use crate::UserId;

/// Maps arbitrary bytes onto one of `total_buckets` buckets.
///
/// Implementations must be stable across processes and platforms: the same input always lands in
/// the same bucket.
pub trait Sharder {
    fn get_bucket(&self, input: impl AsRef<[u8]>, total_buckets: u64) -> u64;
}

/// The default (and only) sharder.
///
/// Uses the first 8 bytes of the MD5 digest interpreted as a little-endian integer.
pub struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_bucket(&self, input: impl AsRef<[u8]>, total_buckets: u64) -> u64 {
        let hash = md5::compute(input);
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.0[..8]);
        u64::from_le_bytes(head) % total_buckets
    }
}

/// Bytes hashed to place `user_id` in a bucket for `feature_name`: the id as fixed-width little-endian
/// followed by the raw name.
pub(crate) fn user_feature_key(user_id: UserId, feature_name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + feature_name.len());
    buf.extend_from_slice(&user_id.to_le_bytes());
    buf.extend_from_slice(feature_name.as_bytes());
    buf
}
