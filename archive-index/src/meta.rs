// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! The typed metadata trailer every sealed index carries: `{epoch, root_cid,
//! network, index_kind}`. The epoch handle cross-checks these fields across
//! every index it loads so a stale or swapped-in index file is caught at
//! startup rather than surfacing as a silently wrong answer later.

use crate::error::IndexError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    pub epoch: u64,
    pub root_cid: Vec<u8>,
    pub network: String,
    pub index_kind: String,
}

impl IndexMetadata {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.epoch.to_le_bytes());
        write_lp_bytes(&mut out, &self.root_cid);
        write_lp_bytes(&mut out, self.network.as_bytes());
        write_lp_bytes(&mut out, self.index_kind.as_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < 8 {
            return Err(IndexError::Corrupt("metadata trailer too short".into()));
        }
        let epoch = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let mut cursor = 8;
        let root_cid = read_lp_bytes(bytes, &mut cursor)?;
        let network = String::from_utf8(read_lp_bytes(bytes, &mut cursor)?)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        let index_kind = String::from_utf8(read_lp_bytes(bytes, &mut cursor)?)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        Ok(IndexMetadata {
            epoch,
            root_cid,
            network,
            index_kind,
        })
    }

    /// Checks that `self` agrees with another index's metadata on every
    /// field but `index_kind`, which legitimately differs per index type.
    pub fn cross_check(&self, other: &IndexMetadata) -> Result<(), IndexError> {
        if self.epoch != other.epoch {
            return Err(IndexError::MetadataMismatch {
                component: "epoch",
                expected: self.epoch.to_string(),
                got: other.epoch.to_string(),
            });
        }
        if self.root_cid != other.root_cid {
            return Err(IndexError::MetadataMismatch {
                component: "root_cid",
                expected: format!("{:?}", self.root_cid),
                got: format!("{:?}", other.root_cid),
            });
        }
        if self.network != other.network {
            return Err(IndexError::MetadataMismatch {
                component: "network",
                expected: self.network.clone(),
                got: other.network.clone(),
            });
        }
        Ok(())
    }
}

fn write_lp_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn read_lp_bytes(bytes: &[u8], cursor: &mut usize) -> Result<Vec<u8>, IndexError> {
    let len_bytes = bytes
        .get(*cursor..*cursor + 4)
        .ok_or_else(|| IndexError::Corrupt("truncated length-prefixed field".into()))?;
    let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
    *cursor += 4;
    let field = bytes
        .get(*cursor..*cursor + len)
        .ok_or_else(|| IndexError::Corrupt("truncated length-prefixed field".into()))?
        .to_vec();
    *cursor += len;
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_bytes() {
        let meta = IndexMetadata {
            epoch: 42,
            root_cid: vec![9, 9, 9],
            network: "mainnet".into(),
            index_kind: "cid_to_offset_and_size".into(),
        };
        let decoded = IndexMetadata::decode(&meta.encode()).unwrap();
        assert_eq!(meta, decoded);
    }

    #[test]
    fn cross_check_flags_mismatched_epoch() {
        let a = IndexMetadata {
            epoch: 1,
            root_cid: vec![],
            network: "mainnet".into(),
            index_kind: "a".into(),
        };
        let b = IndexMetadata { epoch: 2, ..a.clone() };
        assert!(matches!(a.cross_check(&b), Err(IndexError::MetadataMismatch { .. })));
    }
}
