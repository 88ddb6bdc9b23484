// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! The archive's content identifier: a CIDv1, raw-binary-codec, sha2-256 multihash.
//!
//! A plain payload CID is exactly 36 bytes (1 version + 1 codec + 2 multihash
//! prefix + 32 digest), matching the fixed-width CID columns used by the
//! index files in `archive-index`. The sentinel "no such link" CID is the
//! zero-length identity-hash CID and is intentionally shorter.

use cid::Cid as RawCid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CarError;

/// CIDv1 "raw binary" codec, per the multicodec table.
pub const RAW_CODEC: u64 = 0x55;
/// Identity multihash code, used only by the sentinel CID.
const IDENTITY_CODE: u64 = 0x00;

pub const FIXED_CID_LEN: usize = 36;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cid(RawCid);

impl Cid {
    /// Computes the archive CID of a payload: `sha256(payload)` framed as CIDv1/raw.
    pub fn from_payload(payload: &[u8]) -> Self {
        let digest = Code::Sha2_256.digest(payload);
        Cid(RawCid::new_v1(RAW_CODEC, digest))
    }

    /// The sentinel "no link" CID (`bafkqaaa`): CIDv1/raw over the empty identity hash.
    pub fn sentinel() -> Self {
        let digest = multihash_codetable::Multihash::wrap(IDENTITY_CODE, &[]).expect("empty identity hash is always valid");
        Cid(RawCid::new_v1(RAW_CODEC, digest))
    }

    pub fn is_sentinel(&self) -> bool {
        self.0.hash().code() == IDENTITY_CODE
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    /// The fixed 36-byte encoding used by index key/value columns. Only valid
    /// for ordinary (non-sentinel) payload CIDs.
    pub fn to_fixed_bytes(&self) -> Result<[u8; FIXED_CID_LEN], CarError> {
        let bytes = self.0.to_bytes();
        if bytes.len() != FIXED_CID_LEN {
            return Err(CarError::BadCid(format!(
                "expected a {FIXED_CID_LEN}-byte CID, got {} bytes (sentinel or non-sha256 CID?)",
                bytes.len()
            )));
        }
        let mut out = [0u8; FIXED_CID_LEN];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    pub fn from_fixed_bytes(bytes: &[u8; FIXED_CID_LEN]) -> Result<Self, CarError> {
        Self::try_from(&bytes[..])
    }
}

impl TryFrom<&[u8]> for Cid {
    type Error = CarError;

    fn try_from(bytes: &[u8]) -> Result<Self, CarError> {
        RawCid::try_from(bytes)
            .map(Cid)
            .map_err(|e| CarError::BadCid(e.to_string()))
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.0)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Cid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        Cid::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_cid_is_36_bytes() {
        let cid = Cid::from_payload(b"hello archive");
        assert_eq!(cid.to_bytes().len(), FIXED_CID_LEN);
        assert!(!cid.is_sentinel());
        let fixed = cid.to_fixed_bytes().unwrap();
        assert_eq!(Cid::from_fixed_bytes(&fixed).unwrap(), cid);
    }

    #[test]
    fn sentinel_is_recognized() {
        let sentinel = Cid::sentinel();
        assert!(sentinel.is_sentinel());
        assert_ne!(sentinel.to_bytes().len(), FIXED_CID_LEN);
    }

    #[test]
    fn same_payload_same_cid() {
        let a = Cid::from_payload(b"same");
        let b = Cid::from_payload(b"same");
        assert_eq!(a, b);
        let c = Cid::from_payload(b"different");
        assert_ne!(a, c);
    }
}
