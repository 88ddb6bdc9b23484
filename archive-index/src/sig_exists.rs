// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! A zero-false-positive membership filter over 64-bit hashes, used to
//! answer "does this signature appear in this epoch at all" cheaply before
//! falling through to the (more expensive) gSFA log or a full index probe.
//!
//! Unlike [`crate::compact`], this index stores no values, only whether a
//! key was a member of the build set. A single hash domain is searched for
//! the whole index (not per-bucket) so that every inserted key's 64-bit
//! hash is globally distinct; a membership test is then just "is this exact
//! hash present", which can never yield a false positive.

use crate::error::IndexError;
use crate::hash::hash_with_domain;
pub use crate::meta::IndexMetadata;

pub const MAGIC: &[u8; 8] = b"rdcesigx";
const HEADER_LEN: usize = 24;
const PREFIX_SPACE: usize = 1 << 16;
const PREFIX_DIR_ENTRY_LEN: usize = 12; // count:u32 + file_offset:u64
const MAX_DOMAIN_ATTEMPTS: u32 = 1_000;

fn prefix_of(hash: u64) -> u16 {
    (hash >> 48) as u16
}

pub struct SigExistsBuilder {
    keys: Vec<Vec<u8>>,
}

impl SigExistsBuilder {
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    pub fn push(&mut self, key: &[u8]) {
        self.keys.push(key.to_vec());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn seal(self, metadata: IndexMetadata) -> Result<Vec<u8>, IndexError> {
        let num_items = self.keys.len() as u32;
        let domain = find_collision_free_domain(&self.keys)?;

        let mut hashes: Vec<u64> = self.keys.iter().map(|k| hash_with_domain(k, domain)).collect();
        hashes.sort_unstable();

        let mut buckets: Vec<Vec<u64>> = vec![Vec::new(); PREFIX_SPACE];
        for h in hashes {
            buckets[prefix_of(h) as usize].push(h);
        }

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&domain.to_le_bytes());
        out.extend_from_slice(&num_items.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]); // reserved
        debug_assert_eq!(out.len(), HEADER_LEN);

        let mut file_offset = HEADER_LEN as u64 + (PREFIX_SPACE * PREFIX_DIR_ENTRY_LEN) as u64;
        let mut dir = Vec::with_capacity(PREFIX_SPACE * PREFIX_DIR_ENTRY_LEN);
        for bucket in &buckets {
            dir.extend_from_slice(&(bucket.len() as u32).to_le_bytes());
            dir.extend_from_slice(&file_offset.to_le_bytes());
            file_offset += (bucket.len() * 8) as u64;
        }
        out.extend_from_slice(&dir);

        for bucket in &buckets {
            for h in bucket {
                out.extend_from_slice(&h.to_le_bytes());
            }
        }

        out.extend_from_slice(&metadata.encode());

        Ok(out)
    }
}

impl Default for SigExistsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn find_collision_free_domain(keys: &[Vec<u8>]) -> Result<u32, IndexError> {
    let mut domain = 0u32;
    loop {
        let mut hashes: Vec<u64> = keys.iter().map(|k| hash_with_domain(k, domain)).collect();
        hashes.sort_unstable();
        if hashes.windows(2).all(|w| w[0] != w[1]) {
            return Ok(domain);
        }
        domain += 1;
        if domain > MAX_DOMAIN_ATTEMPTS {
            return Err(IndexError::BuildFailed(format!(
                "no collision-free hash domain found within {MAX_DOMAIN_ATTEMPTS} attempts for {} keys",
                keys.len()
            )));
        }
    }
}

pub struct SigExistsReader {
    bytes: Vec<u8>,
    domain: u32,
    num_items: u32,
    metadata: IndexMetadata,
}

impl SigExistsReader {
    pub fn parse(bytes: Vec<u8>) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN || &bytes[0..8] != MAGIC {
            return Err(IndexError::BadMagic {
                file: "signature-exists filter",
                expected: MAGIC,
                got: bytes.get(0..8).unwrap_or(&[]).to_vec(),
            });
        }
        let domain = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let num_items = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let dir_end = HEADER_LEN + PREFIX_SPACE * PREFIX_DIR_ENTRY_LEN;
        if bytes.len() < dir_end {
            return Err(IndexError::Corrupt("truncated prefix directory".into()));
        }

        let mut body_end = dir_end as u64;
        for prefix in 0..PREFIX_SPACE {
            let start = HEADER_LEN + prefix * PREFIX_DIR_ENTRY_LEN;
            let row = &bytes[start..start + PREFIX_DIR_ENTRY_LEN];
            let count = u32::from_le_bytes(row[0..4].try_into().unwrap());
            let offset = u64::from_le_bytes(row[4..12].try_into().unwrap());
            body_end = body_end.max(offset + count as u64 * 8);
        }
        let metadata = IndexMetadata::decode(
            bytes
                .get(body_end as usize..)
                .ok_or_else(|| IndexError::Corrupt("missing metadata trailer".into()))?,
        )?;

        Ok(Self {
            bytes,
            domain,
            num_items,
            metadata,
        })
    }

    pub fn num_items(&self) -> u32 {
        self.num_items
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    fn dir_entry(&self, prefix: u16) -> (u32, u64) {
        let start = HEADER_LEN + prefix as usize * PREFIX_DIR_ENTRY_LEN;
        let row = &self.bytes[start..start + PREFIX_DIR_ENTRY_LEN];
        (
            u32::from_le_bytes(row[0..4].try_into().unwrap()),
            u64::from_le_bytes(row[4..12].try_into().unwrap()),
        )
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let hash = hash_with_domain(key, self.domain);
        let prefix = prefix_of(hash);
        let (count, offset) = self.dir_entry(prefix);
        let start = offset as usize;
        let bucket = &self.bytes[start..start + count as usize * 8];
        bucket
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .binary_search(&hash)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> IndexMetadata {
        IndexMetadata {
            epoch: 3,
            root_cid: vec![4, 5, 6],
            network: "testnet".into(),
            index_kind: "sig_exists".into(),
        }
    }

    #[test]
    fn every_inserted_key_is_reported_present() {
        let mut builder = SigExistsBuilder::new();
        let keys: Vec<Vec<u8>> = (0u64..2_000).map(|i| i.to_le_bytes().to_vec()).collect();
        for k in &keys {
            builder.push(k);
        }
        let bytes = builder.seal(meta()).unwrap();
        let reader = SigExistsReader::parse(bytes).unwrap();
        assert_eq!(reader.num_items(), 2_000);
        assert_eq!(reader.metadata(), &meta());
        for k in &keys {
            assert!(reader.contains(k));
        }
    }

    #[test]
    fn absent_key_is_reported_absent() {
        let mut builder = SigExistsBuilder::new();
        builder.push(b"present-key-aaaaaaaaaaaaaaaaaaaa");
        let bytes = builder.seal(meta()).unwrap();
        let reader = SigExistsReader::parse(bytes).unwrap();
        assert!(!reader.contains(b"absent-key-bbbbbbbbbbbbbbbbbbbb"));
    }
}
