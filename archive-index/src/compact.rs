// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! The compact bucketed index: an order-preserving on-disk hash index
//! mapping fixed-width keys to fixed-width values. Two-level: a bucket
//! directory plus per-bucket sorted entries keyed by a truncated hash,
//! searched with an Eytzinger layout for cache-friendly binary search.
//!
//! This is the primary key→value index family; `cid_to_offset_and_size`,
//! `slot_to_cid`, and `signature_to_cid` are all instantiations of it with
//! different `(key_size, value_size)` pairs (see [`crate::instantiations`]).

use std::collections::HashMap;

use crate::error::IndexError;
use crate::hash::{bucket_for, hash_with_domain, truncate24};
pub use crate::meta::IndexMetadata;

pub const MAGIC: &[u8; 8] = b"rdcecidx";
const HEADER_LEN: usize = 32;
const BUCKET_HEADER_LEN: usize = 16; // domain:u32 + num_entries:u32 + file_offset:u64
const TARGET_BUCKET_SIZE: u32 = 10_000;
const MAX_DOMAIN_ATTEMPTS: u32 = 1_000;

/// Accumulates `(key, value)` pairs and seals them into the on-disk byte
/// layout described in the module docs.
pub struct CompactIndexBuilder {
    key_size: usize,
    value_size: usize,
    items: Vec<(Vec<u8>, Vec<u8>)>,
}

impl CompactIndexBuilder {
    pub fn new(key_size: usize, value_size: usize) -> Self {
        Self {
            key_size,
            value_size,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, key: &[u8], value: &[u8]) {
        assert_eq!(key.len(), self.key_size, "key width mismatch");
        assert_eq!(value.len(), self.value_size, "value width mismatch");
        self.items.push((key.to_vec(), value.to_vec()));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Builds the sealed index bytes: header, bucket directory, bucket
    /// bodies, then the metadata trailer.
    pub fn seal(self, metadata: IndexMetadata) -> Result<Vec<u8>, IndexError> {
        let num_items = self.items.len() as u32;
        let num_buckets = num_items.div_ceil(TARGET_BUCKET_SIZE).max(1);

        let mut buckets: Vec<Vec<(Vec<u8>, Vec<u8>)>> = vec![Vec::new(); num_buckets as usize];
        for (key, value) in self.items {
            let b = bucket_for(&key, num_buckets);
            buckets[b as usize].push((key, value));
        }

        let mut bucket_domains = Vec::with_capacity(buckets.len());
        let mut bucket_bodies: Vec<Vec<u8>> = Vec::with_capacity(buckets.len());

        for bucket in &buckets {
            let (domain, sorted) = seal_bucket(bucket, self.value_size)?;
            bucket_domains.push(domain);
            bucket_bodies.push(sorted);
        }

        let mut out = Vec::new();
        // Header.
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.key_size as u32).to_le_bytes());
        out.extend_from_slice(&(self.value_size as u32).to_le_bytes());
        out.extend_from_slice(&num_buckets.to_le_bytes());
        out.extend_from_slice(&num_items.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]); // reserved
        debug_assert_eq!(out.len(), HEADER_LEN);

        // Bucket directory.
        let mut file_offset = HEADER_LEN as u64 + (num_buckets as u64) * (BUCKET_HEADER_LEN as u64);
        for (i, body) in bucket_bodies.iter().enumerate() {
            out.extend_from_slice(&bucket_domains[i].to_le_bytes());
            out.extend_from_slice(&(buckets[i].len() as u32).to_le_bytes());
            out.extend_from_slice(&file_offset.to_le_bytes());
            file_offset += body.len() as u64;
        }

        // Bucket bodies.
        for body in &bucket_bodies {
            out.extend_from_slice(body);
        }

        // Metadata trailer.
        out.extend_from_slice(&metadata.encode());

        Ok(out)
    }
}

/// Finds a hash domain under which no two keys in `bucket` share a truncated
/// 24-bit fingerprint, sorts by fingerprint, and returns the Eytzinger-
/// ordered byte body alongside the winning domain.
fn seal_bucket(bucket: &[(Vec<u8>, Vec<u8>)], value_size: usize) -> Result<(u32, Vec<u8>), IndexError> {
    let mut domain = 0u32;
    let fingerprints = loop {
        let mut seen = HashMap::with_capacity(bucket.len());
        let mut ok = true;
        let mut fps = Vec::with_capacity(bucket.len());
        for (key, _) in bucket {
            let fp = truncate24(hash_with_domain(key, domain));
            if seen.insert(fp, ()).is_some() {
                ok = false;
                break;
            }
            fps.push(fp);
        }
        if ok {
            break fps;
        }
        domain += 1;
        if domain > MAX_DOMAIN_ATTEMPTS {
            return Err(IndexError::BuildFailed(format!(
                "no collision-free hash domain found within {MAX_DOMAIN_ATTEMPTS} attempts for a {}-entry bucket",
                bucket.len()
            )));
        }
    };

    let mut rows: Vec<Vec<u8>> = fingerprints
        .into_iter()
        .zip(bucket.iter())
        .map(|(fp, (_, value))| {
            let mut row = Vec::with_capacity(3 + value_size);
            row.extend_from_slice(&fp.to_le_bytes()[..3]);
            row.extend_from_slice(value);
            row
        })
        .collect();
    rows.sort_unstable_by(|a, b| a[..3].cmp(&b[..3]));

    let ordered = eytzinger_order(rows);
    let mut body = Vec::with_capacity(ordered.len() * (3 + value_size));
    for row in ordered {
        body.extend_from_slice(&row);
    }
    Ok((domain, body))
}

/// Reorders a sorted slice of rows into Eytzinger layout: an in-order
/// traversal of the implicit binary tree (children of `i` at `2i+1`,
/// `2i+2`) visits positions in ascending sorted order, so assigning the
/// sorted rows to those positions in traversal order yields the layout.
fn eytzinger_order(sorted: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    let n = sorted.len();
    let mut out: Vec<Option<Vec<u8>>> = vec![None; n];
    let mut src = sorted.into_iter();
    fn fill(out: &mut [Option<Vec<u8>>], src: &mut std::vec::IntoIter<Vec<u8>>, pos: usize) {
        if pos >= out.len() {
            return;
        }
        fill(out, src, 2 * pos + 1);
        out[pos] = src.next();
        fill(out, src, 2 * pos + 2);
    }
    fill(&mut out, &mut src, 0);
    out.into_iter().map(|o| o.expect("every slot filled by in-order traversal")).collect()
}

/// A sealed index loaded fully into memory; lookups are pure CPU-bound
/// Eytzinger search and never suspend.
pub struct CompactIndexReader {
    bytes: Vec<u8>,
    key_size: usize,
    value_size: usize,
    num_buckets: u32,
    num_items: u32,
    metadata: IndexMetadata,
}

struct BucketHeader {
    domain: u32,
    num_entries: u32,
    file_offset: u64,
}

impl CompactIndexReader {
    pub fn parse(bytes: Vec<u8>) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN || &bytes[0..8] != MAGIC {
            return Err(IndexError::BadMagic {
                file: "compact index",
                expected: MAGIC,
                got: bytes.get(0..8).unwrap_or(&[]).to_vec(),
            });
        }
        let key_size = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let value_size = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
        let num_buckets = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
        let num_items = u32::from_le_bytes(bytes[20..24].try_into().unwrap());

        let dir_len = num_buckets as usize * BUCKET_HEADER_LEN;
        let dir_end = HEADER_LEN + dir_len;
        let dir = bytes
            .get(HEADER_LEN..dir_end)
            .ok_or_else(|| IndexError::Corrupt("truncated bucket directory".into()))?;

        // Bucket bodies run from the end of the directory to the start of
        // the metadata trailer; the trailer's own offset isn't recorded
        // explicitly, so it is derived from the last bucket's extent.
        let mut last_end = dir_end as u64;
        for i in 0..num_buckets as usize {
            let row = &dir[i * BUCKET_HEADER_LEN..(i + 1) * BUCKET_HEADER_LEN];
            let num_entries = u32::from_le_bytes(row[4..8].try_into().unwrap());
            let file_offset = u64::from_le_bytes(row[8..16].try_into().unwrap());
            last_end = last_end.max(file_offset + num_entries as u64 * (3 + value_size) as u64);
        }
        let metadata = IndexMetadata::decode(
            bytes
                .get(last_end as usize..)
                .ok_or_else(|| IndexError::Corrupt("missing metadata trailer".into()))?,
        )?;

        Ok(Self {
            bytes,
            key_size,
            value_size,
            num_buckets,
            num_items,
            metadata,
        })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn num_items(&self) -> u32 {
        self.num_items
    }

    fn bucket_header(&self, bucket: u32) -> BucketHeader {
        let row_start = HEADER_LEN + bucket as usize * BUCKET_HEADER_LEN;
        let row = &self.bytes[row_start..row_start + BUCKET_HEADER_LEN];
        BucketHeader {
            domain: u32::from_le_bytes(row[0..4].try_into().unwrap()),
            num_entries: u32::from_le_bytes(row[4..8].try_into().unwrap()),
            file_offset: u64::from_le_bytes(row[8..16].try_into().unwrap()),
        }
    }

    /// Looks up `key`, returning `Ok(None)` on a clean miss. False positives
    /// are impossible: per-bucket domain selection guarantees every key in a
    /// bucket has a unique truncated hash.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexError> {
        if key.len() != self.key_size {
            return Err(IndexError::Corrupt(format!(
                "key length {} does not match index key_size {}",
                key.len(),
                self.key_size
            )));
        }
        let bucket = bucket_for(key, self.num_buckets);
        let header = self.bucket_header(bucket);
        if header.num_entries == 0 {
            return Ok(None);
        }
        let target = truncate24(hash_with_domain(key, header.domain));
        let stride = 3 + self.value_size;
        let body_start = header.file_offset as usize;

        let mut i = 0usize;
        while (i as u32) < header.num_entries {
            let row_start = body_start + i * stride;
            let row = &self.bytes[row_start..row_start + stride];
            let fp = u32::from_le_bytes([row[0], row[1], row[2], 0]);
            if fp == target {
                return Ok(Some(row[3..].to_vec()));
            } else if fp < target {
                i = 2 * i + 2;
            } else {
                i = 2 * i + 1;
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> IndexMetadata {
        IndexMetadata {
            epoch: 7,
            root_cid: vec![1, 2, 3],
            network: "testnet".into(),
            index_kind: "slot_to_cid".into(),
        }
    }

    #[test]
    fn insert_then_get_matches_for_every_key() {
        let mut builder = CompactIndexBuilder::new(8, 4);
        let mut expected = Vec::new();
        for i in 0u64..5_000 {
            let key = i.to_le_bytes();
            let value = (i as u32).to_le_bytes();
            builder.push(&key, &value);
            expected.push((key, value));
        }
        let bytes = builder.seal(meta()).unwrap();
        let reader = CompactIndexReader::parse(bytes).unwrap();
        assert_eq!(reader.metadata(), &meta());
        assert_eq!(reader.num_items(), 5_000);

        for (key, value) in &expected {
            assert_eq!(reader.get(key).unwrap().as_deref(), Some(value.as_slice()));
        }
    }

    #[test]
    fn missing_key_is_not_found() {
        let mut builder = CompactIndexBuilder::new(8, 4);
        builder.push(&1u64.to_le_bytes(), &1u32.to_le_bytes());
        let bytes = builder.seal(meta()).unwrap();
        let reader = CompactIndexReader::parse(bytes).unwrap();
        assert_eq!(reader.get(&2u64.to_le_bytes()).unwrap(), None);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = CompactIndexReader::parse(vec![0u8; 64]).unwrap_err();
        assert!(matches!(err, IndexError::BadMagic { .. }));
    }
}
