// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! get-signatures-for-address (gSFA): a per-address, newest-first log of
//! `(signature, slot, archive_offset, archive_size, flags)` records.
//!
//! Records arrive in slot order but are keyed by address, so the builder
//! shards by `hash(address) mod num_shards`, buffers each shard in memory,
//! and spills to a per-shard temp file once the buffer grows past its cap.
//! `close` streams each shard's spilled records back in, sorts and groups
//! them by address, and writes the sealed per-shard address directories
//! that the reader binary-searches.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::IndexError;
use crate::hash::{bucket_for, hash_with_domain};
pub use crate::meta::IndexMetadata;

pub const MAGIC: &[u8; 8] = b"rdcegsfa";
const HEADER_LEN: usize = 24;
const SHARD_DIR_ENTRY_LEN: usize = 16; // addr_dir_offset:u64 + addr_dir_count:u32 + reserved:u32
const ADDR_DIR_ENTRY_LEN: usize = 20; // addr_hash64:u64 + body_offset:u64 + body_len:u32
const ENTRY_LEN: usize = 8 + 6 + 3 + 1 + 64; // slot + offset48 + size24 + flags + signature
const KEY_DOMAIN: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GsfaEntry {
    pub signature: [u8; 64],
    pub slot: u64,
    pub archive_offset: u64, // fits in 48 bits
    pub archive_size: u32,   // fits in 24 bits
    pub flags: u8,
}

impl GsfaEntry {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.slot.to_le_bytes());
        out.extend_from_slice(&self.archive_offset.to_le_bytes()[..6]);
        out.extend_from_slice(&self.archive_size.to_le_bytes()[..3]);
        out.push(self.flags);
        out.extend_from_slice(&self.signature);
    }

    fn read(row: &[u8]) -> Self {
        let slot = u64::from_le_bytes(row[0..8].try_into().unwrap());
        let mut offset_bytes = [0u8; 8];
        offset_bytes[..6].copy_from_slice(&row[8..14]);
        let archive_offset = u64::from_le_bytes(offset_bytes);
        let mut size_bytes = [0u8; 4];
        size_bytes[..3].copy_from_slice(&row[14..17]);
        let archive_size = u32::from_le_bytes(size_bytes);
        let flags = row[17];
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&row[18..18 + 64]);
        Self {
            signature,
            slot,
            archive_offset,
            archive_size,
            flags,
        }
    }
}

pub const HAS_META: u8 = 1 << 0;
pub const IS_SUCCESS: u8 = 1 << 1;
pub const IS_VOTE: u8 = 1 << 2;

struct Shard {
    file: BufWriter<File>,
    buffered: usize,
    cap: usize,
}

/// Appends raw `(addr, entry)` rows to per-shard spill files; callers must
/// push in slot order so each shard's file is already slot-ordered.
pub struct GsfaBuilder {
    dir: PathBuf,
    num_shards: u32,
    shards: Vec<Shard>,
}

impl GsfaBuilder {
    pub fn new(dir: impl Into<PathBuf>, num_shards: u32, shard_buffer_cap: usize) -> Result<Self, IndexError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| IndexError::Io {
            path: dir.display().to_string(),
            cause: e.to_string(),
        })?;
        let mut shards = Vec::with_capacity(num_shards as usize);
        for i in 0..num_shards {
            let path = shard_path(&dir, i);
            let file = File::create(&path).map_err(|e| IndexError::Io {
                path: path.display().to_string(),
                cause: e.to_string(),
            })?;
            shards.push(Shard {
                file: BufWriter::new(file),
                buffered: 0,
                cap: shard_buffer_cap,
            });
        }
        Ok(Self {
            dir,
            num_shards,
            shards,
        })
    }

    pub fn push(&mut self, addr: &[u8], entry: GsfaEntry) -> Result<(), IndexError> {
        let shard_idx = bucket_for(addr, self.num_shards) as usize;
        let mut row = Vec::with_capacity(2 + addr.len() + ENTRY_LEN);
        row.extend_from_slice(&(addr.len() as u16).to_le_bytes());
        row.extend_from_slice(addr);
        entry.write(&mut row);

        let shard = &mut self.shards[shard_idx];
        shard.file.write_all(&row).map_err(|e| IndexError::Io {
            path: shard_path(&self.dir, shard_idx as u32).display().to_string(),
            cause: e.to_string(),
        })?;
        shard.buffered += row.len();
        if shard.buffered >= shard.cap {
            shard.file.flush().map_err(|e| IndexError::Io {
                path: shard_path(&self.dir, shard_idx as u32).display().to_string(),
                cause: e.to_string(),
            })?;
            shard.buffered = 0;
        }
        Ok(())
    }

    /// Performs the sort/merge and returns the sealed index bytes. Idempotent
    /// only in the sense that it consumes `self`; a failed build leaves the
    /// spill directory behind for inspection rather than retrying partially.
    pub fn close(mut self, metadata: IndexMetadata) -> Result<Vec<u8>, IndexError> {
        for shard in &mut self.shards {
            shard.file.flush().map_err(|e| IndexError::Io {
                path: self.dir.display().to_string(),
                cause: e.to_string(),
            })?;
        }

        let mut body_buf = Vec::new();
        let mut shard_addr_dirs: Vec<Vec<u8>> = Vec::with_capacity(self.num_shards as usize);
        let mut shard_addr_counts = Vec::with_capacity(self.num_shards as usize);

        for shard_idx in 0..self.num_shards {
            let path = shard_path(&self.dir, shard_idx);
            let records = read_shard_records(&path)?;
            let mut grouped = group_by_address(records);
            grouped.sort_by_key(|(addr, _)| hash_with_domain(addr, KEY_DOMAIN));

            let mut addr_dir = Vec::with_capacity(grouped.len() * ADDR_DIR_ENTRY_LEN);
            for (addr, mut entries) in grouped {
                entries.sort_by(|a, b| b.slot.cmp(&a.slot)); // newest first
                let body_offset = body_buf.len() as u64;
                body_buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
                for e in &entries {
                    e.write(&mut body_buf);
                }
                let body_len = body_buf.len() as u32 - body_offset as u32;

                addr_dir.extend_from_slice(&hash_with_domain(&addr, KEY_DOMAIN).to_le_bytes());
                addr_dir.extend_from_slice(&body_offset.to_le_bytes());
                addr_dir.extend_from_slice(&body_len.to_le_bytes());
            }
            shard_addr_counts.push((addr_dir.len() / ADDR_DIR_ENTRY_LEN) as u32);
            shard_addr_dirs.push(addr_dir);

            let _ = std::fs::remove_file(&path);
        }

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.num_shards.to_le_bytes());
        out.extend_from_slice(&(shard_addr_counts.iter().sum::<u32>()).to_le_bytes());
        out.extend_from_slice(&[0u8; 8]); // reserved
        debug_assert_eq!(out.len(), HEADER_LEN);

        let shard_dir_len = self.num_shards as usize * SHARD_DIR_ENTRY_LEN;
        let mut addr_dir_offset = (HEADER_LEN + shard_dir_len) as u64;
        for addr_dir in &shard_addr_dirs {
            addr_dir_offset += addr_dir.len() as u64;
        }
        // First pass computed total address-directory bytes; now lay out
        // shard directory entries pointing at each shard's own slice.
        let mut cursor = (HEADER_LEN + shard_dir_len) as u64;
        for (i, addr_dir) in shard_addr_dirs.iter().enumerate() {
            out.extend_from_slice(&cursor.to_le_bytes());
            out.extend_from_slice(&shard_addr_counts[i].to_le_bytes());
            out.extend_from_slice(&[0u8; 4]);
            cursor += addr_dir.len() as u64;
        }
        for addr_dir in &shard_addr_dirs {
            out.extend_from_slice(addr_dir);
        }
        let bodies_base = out.len() as u64;
        out.extend_from_slice(&(body_buf.len() as u64).to_le_bytes());
        out.extend_from_slice(&body_buf);

        // Body offsets recorded above were relative to body_buf; rebase them
        // to absolute file offsets now that bodies_base is known.
        let mut i = HEADER_LEN + shard_dir_len;
        for addr_dir in &shard_addr_dirs {
            let mut off = 0;
            while off < addr_dir.len() {
                let body_offset_pos = i + off + 8;
                let rel = u64::from_le_bytes(out[body_offset_pos..body_offset_pos + 8].try_into().unwrap());
                out[body_offset_pos..body_offset_pos + 8].copy_from_slice(&(rel + bodies_base + 8).to_le_bytes());
                off += ADDR_DIR_ENTRY_LEN;
            }
            i += addr_dir.len();
        }

        out.extend_from_slice(&metadata.encode());

        let _ = std::fs::remove_dir(&self.dir);
        Ok(out)
    }
}

fn shard_path(dir: &Path, shard_idx: u32) -> PathBuf {
    dir.join(format!("shard-{shard_idx:08}.spill"))
}

fn read_shard_records(path: &Path) -> Result<Vec<(Vec<u8>, GsfaEntry)>, IndexError> {
    let file = File::open(path).map_err(|e| IndexError::Io {
        path: path.display().to_string(),
        cause: e.to_string(),
    })?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(|e| IndexError::Io {
        path: path.display().to_string(),
        cause: e.to_string(),
    })?;

    let mut records = Vec::new();
    let mut cursor = 0;
    while cursor < buf.len() {
        let addr_len = u16::from_le_bytes(buf[cursor..cursor + 2].try_into().unwrap()) as usize;
        cursor += 2;
        let addr = buf[cursor..cursor + addr_len].to_vec();
        cursor += addr_len;
        let entry = GsfaEntry::read(&buf[cursor..cursor + ENTRY_LEN]);
        cursor += ENTRY_LEN;
        records.push((addr, entry));
    }
    Ok(records)
}

fn group_by_address(mut records: Vec<(Vec<u8>, GsfaEntry)>) -> Vec<(Vec<u8>, Vec<GsfaEntry>)> {
    records.sort_by(|a, b| a.0.cmp(&b.0));
    let mut grouped: Vec<(Vec<u8>, Vec<GsfaEntry>)> = Vec::new();
    for (addr, entry) in records {
        match grouped.last_mut() {
            Some((last_addr, entries)) if *last_addr == addr => entries.push(entry),
            _ => grouped.push((addr, vec![entry])),
        }
    }
    grouped
}

pub struct GsfaReader {
    bytes: Vec<u8>,
    num_shards: u32,
    metadata: IndexMetadata,
}

impl GsfaReader {
    pub fn parse(bytes: Vec<u8>) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN || &bytes[0..8] != MAGIC {
            return Err(IndexError::BadMagic {
                file: "gSFA directory",
                expected: MAGIC,
                got: bytes.get(0..8).unwrap_or(&[]).to_vec(),
            });
        }
        let num_shards = u32::from_le_bytes(bytes[8..12].try_into().unwrap());

        let mut bodies_base = 0u64;
        for shard_idx in 0..num_shards {
            let row_start = HEADER_LEN + shard_idx as usize * SHARD_DIR_ENTRY_LEN;
            let row = bytes
                .get(row_start..row_start + SHARD_DIR_ENTRY_LEN)
                .ok_or_else(|| IndexError::Corrupt("truncated shard directory".into()))?;
            let dir_offset = u64::from_le_bytes(row[0..8].try_into().unwrap());
            let dir_count = u32::from_le_bytes(row[8..12].try_into().unwrap());
            bodies_base = bodies_base.max(dir_offset + dir_count as u64 * ADDR_DIR_ENTRY_LEN as u64);
        }
        let body_len_bytes = bytes
            .get(bodies_base as usize..bodies_base as usize + 8)
            .ok_or_else(|| IndexError::Corrupt("missing body length prefix".into()))?;
        let body_len = u64::from_le_bytes(body_len_bytes.try_into().unwrap());
        let metadata_start = bodies_base as usize + 8 + body_len as usize;
        let metadata = IndexMetadata::decode(
            bytes
                .get(metadata_start..)
                .ok_or_else(|| IndexError::Corrupt("missing metadata trailer".into()))?,
        )?;

        Ok(Self {
            bytes,
            num_shards,
            metadata,
        })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    /// Returns the address's log, newest entry first, or `None` if the
    /// address was never pushed.
    pub fn get(&self, addr: &[u8]) -> Option<Vec<GsfaEntry>> {
        let shard_idx = bucket_for(addr, self.num_shards);
        let shard_row_start = HEADER_LEN + shard_idx as usize * SHARD_DIR_ENTRY_LEN;
        let shard_row = &self.bytes[shard_row_start..shard_row_start + SHARD_DIR_ENTRY_LEN];
        let dir_offset = u64::from_le_bytes(shard_row[0..8].try_into().unwrap()) as usize;
        let dir_count = u32::from_le_bytes(shard_row[8..12].try_into().unwrap());

        let target = hash_with_domain(addr, KEY_DOMAIN);
        let mut lo = 0u32;
        let mut hi = dir_count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let row_start = dir_offset + mid as usize * ADDR_DIR_ENTRY_LEN;
            let row = &self.bytes[row_start..row_start + ADDR_DIR_ENTRY_LEN];
            let key = u64::from_le_bytes(row[0..8].try_into().unwrap());
            if key == target {
                let body_offset = u64::from_le_bytes(row[8..16].try_into().unwrap()) as usize;
                let body_len = u32::from_le_bytes(row[16..20].try_into().unwrap()) as usize;
                return Some(decode_body(&self.bytes[body_offset..body_offset + body_len]));
            } else if key < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        None
    }
}

fn decode_body(body: &[u8]) -> Vec<GsfaEntry> {
    let count = u32::from_le_bytes(body[0..4].try_into().unwrap()) as usize;
    let mut entries = Vec::with_capacity(count);
    let mut cursor = 4;
    for _ in 0..count {
        entries.push(GsfaEntry::read(&body[cursor..cursor + ENTRY_LEN]));
        cursor += ENTRY_LEN;
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(slot: u64) -> GsfaEntry {
        GsfaEntry {
            signature: [slot as u8; 64],
            slot,
            archive_offset: slot * 100,
            archive_size: 128,
            flags: IS_SUCCESS,
        }
    }

    fn meta() -> IndexMetadata {
        IndexMetadata {
            epoch: 99,
            root_cid: vec![7],
            network: "testnet".into(),
            index_kind: "gsfa".into(),
        }
    }

    #[test]
    fn returns_newest_first_per_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = GsfaBuilder::new(dir.path(), 4, 64).unwrap();
        builder.push(b"addr-a", entry(10)).unwrap();
        builder.push(b"addr-b", entry(11)).unwrap();
        builder.push(b"addr-a", entry(12)).unwrap();
        builder.push(b"addr-a", entry(5)).unwrap();
        let bytes = builder.close(meta()).unwrap();

        let reader = GsfaReader::parse(bytes).unwrap();
        assert_eq!(reader.metadata(), &meta());
        let log = reader.get(b"addr-a").unwrap();
        assert_eq!(log.iter().map(|e| e.slot).collect::<Vec<_>>(), vec![12, 10, 5]);

        let other = reader.get(b"addr-b").unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].slot, 11);
    }

    #[test]
    fn unknown_address_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = GsfaBuilder::new(dir.path(), 2, 64).unwrap();
        builder.push(b"addr-a", entry(1)).unwrap();
        let bytes = builder.close(meta()).unwrap();
        let reader = GsfaReader::parse(bytes).unwrap();
        assert!(reader.get(b"addr-never-pushed").is_none());
    }
}
