// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Slot-to-blocktime vector: a fixed-size packed array of Unix timestamps,
//! one per slot in an epoch. Slots without a produced block (skipped slots)
//! store `0`.

use crate::error::IndexError;
pub use crate::meta::IndexMetadata;

pub const MAGIC: &[u8; 8] = b"rdcetime";
const HEADER_LEN: usize = 24;
pub const SLOTS_PER_EPOCH: u64 = 432_000;
pub const SKIPPED_SENTINEL: i64 = 0;

pub struct BlocktimeBuilder {
    slots: Vec<i64>,
}

impl BlocktimeBuilder {
    pub fn new(slots_per_epoch: u64) -> Self {
        Self {
            slots: vec![SKIPPED_SENTINEL; slots_per_epoch as usize],
        }
    }

    /// Sets the blocktime for `slot_in_epoch`, the slot's index relative to
    /// the epoch's first slot.
    pub fn set(&mut self, slot_in_epoch: u64, unix_timestamp: i64) -> Result<(), IndexError> {
        let idx = usize::try_from(slot_in_epoch)
            .map_err(|_| IndexError::Corrupt("slot index out of range".into()))?;
        let slot = self
            .slots
            .get_mut(idx)
            .ok_or_else(|| IndexError::Corrupt(format!("slot {slot_in_epoch} outside epoch bounds")))?;
        *slot = unix_timestamp;
        Ok(())
    }

    pub fn seal(self, metadata: IndexMetadata) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.slots.len() * 8);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.slots.len() as u64).to_le_bytes());
        out.extend_from_slice(&[0u8; 8]); // reserved
        debug_assert_eq!(out.len(), HEADER_LEN);
        for t in &self.slots {
            out.extend_from_slice(&t.to_le_bytes());
        }
        out.extend_from_slice(&metadata.encode());
        out
    }
}

pub struct BlocktimeReader {
    bytes: Vec<u8>,
    num_slots: u64,
    metadata: IndexMetadata,
}

impl BlocktimeReader {
    pub fn parse(bytes: Vec<u8>) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN || &bytes[0..8] != MAGIC {
            return Err(IndexError::BadMagic {
                file: "slot-to-blocktime vector",
                expected: MAGIC,
                got: bytes.get(0..8).unwrap_or(&[]).to_vec(),
            });
        }
        let num_slots = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        let values_end = HEADER_LEN as u64 + num_slots * 8;
        if (bytes.len() as u64) < values_end {
            return Err(IndexError::Corrupt("truncated blocktime vector".into()));
        }
        let metadata = IndexMetadata::decode(
            bytes
                .get(values_end as usize..)
                .ok_or_else(|| IndexError::Corrupt("missing metadata trailer".into()))?,
        )?;
        Ok(Self {
            bytes,
            num_slots,
            metadata,
        })
    }

    pub fn num_slots(&self) -> u64 {
        self.num_slots
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    /// Returns `None` if `slot_in_epoch` is out of range or was skipped.
    pub fn get(&self, slot_in_epoch: u64) -> Option<i64> {
        if slot_in_epoch >= self.num_slots {
            return None;
        }
        let start = HEADER_LEN + slot_in_epoch as usize * 8;
        let ts = i64::from_le_bytes(self.bytes[start..start + 8].try_into().unwrap());
        if ts == SKIPPED_SENTINEL {
            None
        } else {
            Some(ts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> IndexMetadata {
        IndexMetadata {
            epoch: 11,
            root_cid: vec![1],
            network: "mainnet".into(),
            index_kind: "slot_to_blocktime".into(),
        }
    }

    #[test]
    fn roundtrips_set_slots_and_reports_skipped_as_none() {
        let mut builder = BlocktimeBuilder::new(SLOTS_PER_EPOCH);
        builder.set(0, 1_600_000_000).unwrap();
        builder.set(5, 1_600_000_400).unwrap();
        let bytes = builder.seal(meta());
        let reader = BlocktimeReader::parse(bytes).unwrap();
        assert_eq!(reader.num_slots(), SLOTS_PER_EPOCH);
        assert_eq!(reader.metadata(), &meta());
        assert_eq!(reader.get(0), Some(1_600_000_000));
        assert_eq!(reader.get(5), Some(1_600_000_400));
        assert_eq!(reader.get(1), None);
    }

    #[test]
    fn out_of_range_slot_is_none() {
        let reader = BlocktimeReader::parse(BlocktimeBuilder::new(10).seal(meta())).unwrap();
        assert_eq!(reader.get(1_000), None);
    }

    #[test]
    fn rejects_truncated_vector() {
        let mut bytes = BlocktimeBuilder::new(10).seal(meta());
        bytes.truncate(bytes.len() - 4 - meta().encode().len());
        assert!(matches!(BlocktimeReader::parse(bytes), Err(IndexError::Corrupt(_))));
    }
}
