// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Aggregated split-piece archive backend: presents a logically contiguous
//! address space over an ordered list of remote pieces, each identified by a
//! piece CID that resolves to an HTTP URL through a pluggable [`PieceResolver`].

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use crate::cid::Cid;
use crate::error::CarError;
use crate::reader::http::fetch_range_with_retry;
use crate::reader::{parse_header, ArchiveReader, CarHeader};

/// One piece of the logical archive: its identity and byte length.
#[derive(Debug, Clone)]
pub struct Piece {
    pub cid: Cid,
    pub length: u64,
}

/// Resolves a piece CID to a fetchable HTTP URL.
pub trait PieceResolver: Send + Sync {
    fn resolve(&self, cid: &Cid) -> Result<String, CarError>;
}

/// Direct piece-CID → URL mapping, the simplest resolver.
#[derive(Default)]
pub struct DirectPieceMap(HashMap<Cid, String>);

impl DirectPieceMap {
    pub fn new(map: HashMap<Cid, String>) -> Self {
        Self(map)
    }
}

impl PieceResolver for DirectPieceMap {
    fn resolve(&self, cid: &Cid) -> Result<String, CarError> {
        self.0.get(cid).cloned().ok_or_else(|| CarError::Io {
            backend: "pieces",
            offset: 0,
            len: 0,
            cause: format!("no URL mapping for piece {cid}"),
        })
    }
}

/// Resolves piece CID → miner → multi-address → HTTP endpoint through a
/// pre-parsed deals-registry CSV (`piece_cid,miner_id,http_endpoint`).
#[derive(Default)]
pub struct DealsRegistry(HashMap<Cid, String>);

impl DealsRegistry {
    /// Parses a deals-registry CSV of `piece_cid,miner_id,http_endpoint` rows.
    pub fn from_csv(csv: &str) -> Result<Self, CarError> {
        let mut map = HashMap::new();
        for (lineno, line) in csv.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut cols = line.splitn(3, ',');
            let piece = cols.next().ok_or_else(|| {
                CarError::BadHeader(format!("deals registry row {lineno}: missing piece CID"))
            })?;
            let _miner = cols.next().ok_or_else(|| {
                CarError::BadHeader(format!("deals registry row {lineno}: missing miner id"))
            })?;
            let endpoint = cols.next().ok_or_else(|| {
                CarError::BadHeader(format!("deals registry row {lineno}: missing http endpoint"))
            })?;
            let cid = Cid::try_from(bs58::decode(piece.trim()).into_vec().map_err(|e| {
                CarError::BadCid(format!("row {lineno}: {e}"))
            })?.as_slice())?;
            map.insert(cid, endpoint.trim().to_string());
        }
        Ok(Self(map))
    }
}

impl PieceResolver for DealsRegistry {
    fn resolve(&self, cid: &Cid) -> Result<String, CarError> {
        self.0.get(cid).cloned().ok_or_else(|| CarError::Io {
            backend: "pieces",
            offset: 0,
            len: 0,
            cause: format!("no deal found for piece {cid}"),
        })
    }
}

pub struct PiecesArchiveReader {
    client: reqwest::Client,
    resolver: Box<dyn PieceResolver>,
    pieces: Vec<Piece>,
    /// Cumulative start offset of each piece in the logical address space.
    cumulative: Vec<u64>,
    header: CarHeader,
}

impl PiecesArchiveReader {
    pub async fn open(
        client: reqwest::Client,
        resolver: Box<dyn PieceResolver>,
        pieces: Vec<Piece>,
    ) -> Result<Self, CarError> {
        let mut cumulative = Vec::with_capacity(pieces.len());
        let mut acc = 0u64;
        for piece in &pieces {
            cumulative.push(acc);
            acc += piece.length;
        }
        let mut reader = PiecesArchiveReader {
            client,
            resolver,
            pieces,
            cumulative,
            header: CarHeader {
                roots: vec![],
                header_size: 0,
            },
        };
        let prefix = reader.read_at_uncached(0, 4096).await?;
        let mut cursor = std::io::Cursor::new(prefix.as_ref());
        reader.header = parse_header(&mut cursor).await?;
        Ok(reader)
    }

    fn locate(&self, offset: u64) -> Result<usize, CarError> {
        match self.cumulative.binary_search(&offset) {
            Ok(idx) => Ok(idx),
            Err(0) => Err(CarError::Io {
                backend: "pieces",
                offset,
                len: 0,
                cause: "offset precedes the first piece".into(),
            }),
            Err(idx) => Ok(idx - 1),
        }
    }

    async fn read_at_uncached(&self, offset: u64, len: u64) -> Result<Bytes, CarError> {
        let mut out = BytesMut::with_capacity(len as usize);
        let mut remaining = len;
        let mut cursor = offset;
        while remaining > 0 {
            let piece_idx = self.locate(cursor)?;
            let piece = self.pieces.get(piece_idx).ok_or_else(|| CarError::Io {
                backend: "pieces",
                offset: cursor,
                len: remaining,
                cause: "offset past the last piece".into(),
            })?;
            let piece_start = self.cumulative[piece_idx];
            let local_offset = cursor - piece_start;
            let available = piece.length - local_offset;
            let take = remaining.min(available);

            let url = self.resolver.resolve(&piece.cid)?;
            let chunk = fetch_range_with_retry(&self.client, &url, local_offset, take).await?;
            out.extend_from_slice(&chunk);

            cursor += take;
            remaining -= take;
        }
        Ok(out.freeze())
    }
}

#[async_trait::async_trait]
impl ArchiveReader for PiecesArchiveReader {
    fn roots(&self) -> &[Cid] {
        &self.header.roots
    }

    fn header_size(&self) -> u64 {
        self.header.header_size
    }

    async fn read_at(&self, offset: u64, len: u64) -> Result<Bytes, CarError> {
        self.read_at_uncached(offset, len).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_map_resolves() {
        let cid = Cid::from_payload(b"piece-a");
        let mut map = HashMap::new();
        map.insert(cid, "https://example.test/piece-a".to_string());
        let resolver = DirectPieceMap::new(map);
        assert_eq!(resolver.resolve(&cid).unwrap(), "https://example.test/piece-a");
        let other = Cid::from_payload(b"piece-b");
        assert!(resolver.resolve(&other).is_err());
    }
}
