// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Domain-salted 64-bit hashing used to place keys into buckets and, within
//! a bucket, to assign each key a collision-free 24-bit fingerprint.

use std::hash::{BuildHasher, Hasher};

/// Hashes `key` salted by `domain`. Changing `domain` changes every key's
/// hash, which is how [`crate::compact`] resolves in-bucket collisions: it
/// searches for a domain under which no two keys in the bucket share a
/// truncated 24-bit hash.
pub fn hash_with_domain(key: &[u8], domain: u32) -> u64 {
    let build = ahash::RandomState::with_seeds(
        0x9E37_79B9_7F4A_7C15,
        domain as u64,
        0xBF58_476D_1CE4_E5B9,
        0x94D0_49BB_1331_11EB,
    );
    let mut hasher = build.build_hasher();
    hasher.write(key);
    hasher.finish()
}

/// Truncates a 64-bit hash to the 24-bit fingerprint stored in each bucket
/// entry.
pub fn truncate24(hash: u64) -> u32 {
    (hash & 0x00FF_FFFF) as u32
}

pub fn bucket_for(key: &[u8], num_buckets: u32) -> u32 {
    // A domain-independent hash (domain 0) is used only for bucket
    // placement; per-bucket collision resolution is domain-dependent.
    (hash_with_domain(key, 0) % num_buckets as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_changes_hash() {
        let key = b"some-key";
        assert_ne!(hash_with_domain(key, 0), hash_with_domain(key, 1));
    }

    #[test]
    fn truncate_is_bounded() {
        assert!(truncate24(u64::MAX) <= 0x00FF_FFFF);
    }
}
