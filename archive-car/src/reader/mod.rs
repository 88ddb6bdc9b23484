// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! The CARv1-shape archive reader: header parsing, sequential iteration (for
//! the index-build pipeline) and random `read_at` access (for serving),
//! backed by a local file, an HTTP range-reader, or a logical concatenation
//! of split pieces.

pub mod file;
pub mod http;
pub mod pieces;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::cid::Cid;
use crate::error::CarError;
use crate::varint::{read_uvarint_async, read_uvarint_sync};

/// Mirrors the upstream archive format's `MaxAllowedSectionSize`: a guard
/// against a malformed archive causing a huge allocation.
pub const MAX_SECTION_LEN: u64 = 32 << 20; // 32 MiB

#[derive(Debug, Serialize, Deserialize)]
struct CarHeaderWire {
    roots: Vec<Cid>,
    version: u64,
}

/// A parsed CAR header: its declared roots and the number of bytes it
/// occupied (the uvarint length prefix plus the `L` header bytes).
#[derive(Debug, Clone)]
pub struct CarHeader {
    pub roots: Vec<Cid>,
    pub header_size: u64,
}

/// Random-access contract implemented by each backend (local file, HTTP
/// range-reader, aggregated split pieces).
#[async_trait::async_trait]
pub trait ArchiveReader: Send + Sync {
    fn roots(&self) -> &[Cid];
    fn header_size(&self) -> u64;

    /// Reads exactly `len` bytes starting at `offset`. Never returns partial
    /// bytes: a short read is always an error.
    async fn read_at(&self, offset: u64, len: u64) -> Result<Bytes, CarError>;

    /// Reads one `(uvarint section_len, CID, payload)` section starting at
    /// `offset`, returning the CID, the payload bytes, and the total
    /// on-disk length of the section (uvarint prefix + CID + payload).
    async fn read_section_at(&self, offset: u64) -> Result<(Cid, Vec<u8>, u64), CarError> {
        read_section_at_via(self, offset).await
    }
}

/// Shared implementation of [`ArchiveReader::read_section_at`] built only on
/// top of `read_at`, so backends need not special-case it.
async fn read_section_at_via<R: ArchiveReader + ?Sized>(
    reader: &R,
    offset: u64,
) -> Result<(Cid, Vec<u8>, u64), CarError> {
    // Read a generous prefix to cover the uvarint + CID, then the exact
    // payload once the section length is known.
    const PREFIX_GUESS: u64 = 64;
    let prefix = reader.read_at(offset, PREFIX_GUESS).await?;
    let (section_len, varint_len) = read_uvarint_sync(&prefix)?;
    if section_len > MAX_SECTION_LEN {
        return Err(CarError::SectionTooLarge {
            offset,
            len: section_len,
            max: MAX_SECTION_LEN,
        });
    }
    let section_start = offset + varint_len as u64;
    let section = if (prefix.len() as u64) >= varint_len as u64 + section_len {
        prefix[varint_len..varint_len + section_len as usize].to_vec()
    } else {
        reader.read_at(section_start, section_len).await?.to_vec()
    };
    let cid = Cid::try_from(&section[..crate::cid::FIXED_CID_LEN.min(section.len())])?;
    let cid_len = cid.to_bytes().len();
    let payload = section[cid_len..].to_vec();
    let total_len = varint_len as u64 + section_len;
    Ok((cid, payload, total_len))
}

/// Parses the uvarint-prefixed CBOR header from the start of an async
/// stream. Empty roots with a single sentinel CID are accepted as a
/// placeholder (used while merging split pieces).
pub async fn parse_header<R>(reader: &mut R) -> Result<CarHeader, CarError>
where
    R: AsyncRead + Unpin,
{
    let len = read_uvarint_async(reader)
        .await?
        .ok_or_else(|| CarError::BadHeader("archive is empty".into()))?;
    if len > MAX_SECTION_LEN {
        return Err(CarError::BadHeader(format!(
            "header length {len} exceeds maximum {MAX_SECTION_LEN}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| CarError::BadHeader(e.to_string()))?;
    let wire: CarHeaderWire =
        cbor4ii::serde::from_slice(&buf).map_err(|e| CarError::BadHeader(e.to_string()))?;
    if wire.version != 1 {
        return Err(CarError::BadHeader(format!(
            "unsupported CAR version {}",
            wire.version
        )));
    }
    let placeholder = wire.roots.len() == 1 && wire.roots[0].is_sentinel();
    if wire.roots.is_empty() && !placeholder {
        return Err(CarError::BadHeader("CAR header has no roots".into()));
    }
    let varint_len = crate::varint::uvarint_len(len);
    Ok(CarHeader {
        roots: wire.roots,
        header_size: varint_len as u64 + len,
    })
}

/// Synchronous twin of [`parse_header`], used by backends that already hold
/// the header bytes in memory (e.g. the local-file backend during `open`).
pub fn parse_header_sync(bytes: &[u8]) -> Result<CarHeader, CarError> {
    let (len, varint_len) = read_uvarint_sync(bytes)?;
    if len > MAX_SECTION_LEN {
        return Err(CarError::BadHeader(format!(
            "header length {len} exceeds maximum {MAX_SECTION_LEN}"
        )));
    }
    let end = varint_len + len as usize;
    let body = bytes
        .get(varint_len..end)
        .ok_or_else(|| CarError::BadHeader("truncated header".into()))?;
    let wire: CarHeaderWire =
        cbor4ii::serde::from_slice(body).map_err(|e| CarError::BadHeader(e.to_string()))?;
    if wire.version != 1 {
        return Err(CarError::BadHeader(format!(
            "unsupported CAR version {}",
            wire.version
        )));
    }
    let placeholder = wire.roots.len() == 1 && wire.roots[0].is_sentinel();
    if wire.roots.is_empty() && !placeholder {
        return Err(CarError::BadHeader("CAR header has no roots".into()));
    }
    Ok(CarHeader {
        roots: wire.roots,
        header_size: varint_len as u64 + len,
    })
}

/// Sequential node: one `(CID, payload, raw_section_length)` tuple yielded
/// while scanning an archive front-to-back, used by the index-build
/// pipeline.
pub struct SequentialNode {
    pub cid: Cid,
    pub payload: Vec<u8>,
    pub raw_section_length: u64,
}

/// Iterates every section of an archive from a plain `AsyncRead` stream
/// (typically a buffered local file), in order, for indexing.
pub struct SequentialReader<R> {
    reader: R,
    header: CarHeader,
}

impl<R> SequentialReader<R>
where
    R: AsyncRead + Unpin,
{
    pub async fn new(mut reader: R) -> Result<Self, CarError> {
        let header = parse_header(&mut reader).await?;
        Ok(Self { reader, header })
    }

    pub fn roots(&self) -> &[Cid] {
        &self.header.roots
    }

    pub fn header_size(&self) -> u64 {
        self.header.header_size
    }

    /// Reads the next section, or `None` at a clean end of archive.
    pub async fn next_node(&mut self) -> Result<Option<SequentialNode>, CarError> {
        let section_len = match read_uvarint_async(&mut self.reader).await? {
            Some(l) => l,
            None => return Ok(None),
        };
        if section_len > MAX_SECTION_LEN {
            return Err(CarError::SectionTooLarge {
                offset: 0,
                len: section_len,
                max: MAX_SECTION_LEN,
            });
        }
        let varint_len = crate::varint::uvarint_len(section_len);
        let mut section = vec![0u8; section_len as usize];
        self.reader
            .read_exact(&mut section)
            .await
            .map_err(|e| CarError::Io {
                backend: "file",
                offset: 0,
                len: section_len,
                cause: e.to_string(),
            })?;
        let cid = Cid::try_from(&section[..crate::cid::FIXED_CID_LEN.min(section.len())])?;
        let cid_len = cid.to_bytes().len();
        let payload = section[cid_len..].to_vec();
        Ok(Some(SequentialNode {
            cid,
            payload,
            raw_section_length: varint_len as u64 + section_len,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::objects::{Epoch, Node};
    use crate::varint::write_uvarint_async;

    async fn build_test_archive() -> Vec<u8> {
        let epoch = Node::Epoch(Epoch {
            epoch: 0,
            network: "testnet".into(),
            subsets: vec![],
        });
        let payload = codec::encode_node(&epoch).unwrap();
        let cid = Cid::from_payload(&payload);

        let mut out = Vec::new();
        let header = CarHeaderWire {
            roots: vec![cid],
            version: 1,
        };
        let header_bytes = cbor4ii::serde::to_vec(Vec::new(), &header).unwrap();
        write_uvarint_async(&mut out, header_bytes.len() as u64)
            .await
            .unwrap();
        out.extend_from_slice(&header_bytes);

        let mut section = cid.to_bytes();
        section.extend_from_slice(&payload);
        write_uvarint_async(&mut out, section.len() as u64)
            .await
            .unwrap();
        out.extend_from_slice(&section);
        out
    }

    #[tokio::test]
    async fn sequential_roundtrip_matches_section_bytes() {
        let archive = build_test_archive().await;
        let total_len = archive.len() as u64;
        let cursor = std::io::Cursor::new(archive);
        let mut seq = SequentialReader::new(cursor).await.unwrap();
        assert_eq!(seq.roots().len(), 1);

        let mut sum = seq.header_size();
        let mut count = 0;
        while let Some(node) = seq.next_node().await.unwrap() {
            sum += node.raw_section_length;
            assert_eq!(Cid::from_payload(&node.payload), node.cid);
            count += 1;
        }
        assert_eq!(count, 1);
        assert_eq!(sum, total_len);
    }
}
