// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Builds one [`EpochHandle`] from an [`EpochConfig`]: opens the configured
//! archive backend and fetches every index named in `indexes`.

use std::collections::HashMap;
use std::sync::Arc;

use archive_car::reader::file::FileArchiveReader;
use archive_car::reader::http::HttpArchiveReader;
use archive_car::reader::pieces::{DealsRegistry, DirectPieceMap, Piece, PieceResolver, PiecesArchiveReader};
use archive_car::{ArchiveReader, Cid};
use serde::Deserialize;

use crate::config::{DataSource, EpochConfig};
use crate::epoch::{fetch_bytes, EpochHandle, EpochIndexBytes};
use crate::errors::EngineError;

#[derive(Deserialize)]
struct PieceMetadataEntry {
    cid: String,
    length: u64,
}

fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

async fn open_reader(data: &DataSource) -> Result<Arc<dyn ArchiveReader>, EngineError> {
    match data {
        DataSource::Car { uri } => {
            if is_remote(uri) {
                let client = reqwest::Client::new();
                let reader = HttpArchiveReader::open(client, uri.clone())
                    .await
                    .map_err(EngineError::from)?;
                Ok(Arc::new(reader))
            } else {
                let reader = FileArchiveReader::open(uri).await.map_err(EngineError::from)?;
                Ok(Arc::new(reader))
            }
        }
        DataSource::CarFromPieces {
            metadata,
            deals,
            piece_to_uri,
        } => {
            let metadata_bytes = fetch_bytes(metadata).await?;
            let entries: Vec<PieceMetadataEntry> =
                serde_json::from_slice(&metadata_bytes).map_err(|e| EngineError::Config(format!("piece metadata: {e}")))?;
            let mut pieces = Vec::with_capacity(entries.len());
            for entry in entries {
                let cid_bytes = bs58::decode(&entry.cid)
                    .into_vec()
                    .map_err(|e| EngineError::Config(format!("piece cid {}: {e}", entry.cid)))?;
                let cid = Cid::try_from(cid_bytes.as_slice()).map_err(EngineError::from)?;
                pieces.push(Piece { cid, length: entry.length });
            }

            let resolver: Box<dyn PieceResolver> = if let Some(piece_to_uri) = piece_to_uri {
                let map_bytes = fetch_bytes(piece_to_uri).await?;
                let raw: HashMap<String, String> =
                    serde_json::from_slice(&map_bytes).map_err(|e| EngineError::Config(format!("piece_to_uri: {e}")))?;
                let mut map = HashMap::with_capacity(raw.len());
                for (cid_str, url) in raw {
                    let cid_bytes = bs58::decode(&cid_str)
                        .into_vec()
                        .map_err(|e| EngineError::Config(format!("piece_to_uri cid {cid_str}: {e}")))?;
                    let cid = Cid::try_from(cid_bytes.as_slice()).map_err(EngineError::from)?;
                    map.insert(cid, url);
                }
                Box::new(DirectPieceMap::new(map))
            } else {
                let deals_bytes = fetch_bytes(deals).await?;
                let csv = String::from_utf8(deals_bytes).map_err(|e| EngineError::Config(format!("deals registry: {e}")))?;
                Box::new(DealsRegistry::from_csv(&csv).map_err(EngineError::from)?)
            };

            let client = reqwest::Client::new();
            let reader = PiecesArchiveReader::open(client, resolver, pieces)
                .await
                .map_err(EngineError::from)?;
            Ok(Arc::new(reader))
        }
        DataSource::Filecoin { .. } => Err(EngineError::Config(
            "filecoin retrieval is an external collaborator; this engine only consumes a GetNodeByCid(cid) -> bytes capability, not configured here".into(),
        )),
    }
}

pub async fn load_epoch_handle(config: &EpochConfig, cache_budget_mib: usize) -> Result<Arc<EpochHandle>, EngineError> {
    let reader = open_reader(&config.data).await?;

    let cid_to_offset_and_size = match &config.indexes.cid_to_offset_and_size {
        Some(uri) => Some(fetch_bytes(uri).await?),
        None => None,
    };
    let cid_to_offset = None;
    let slot_to_cid = fetch_bytes(
        config
            .indexes
            .slot_to_cid
            .as_deref()
            .ok_or_else(|| EngineError::Config(format!("epoch {}: indexes.slot_to_cid is required", config.epoch)))?,
    )
    .await?;
    let signature_to_cid = fetch_bytes(
        config
            .indexes
            .sig_to_cid
            .as_deref()
            .ok_or_else(|| EngineError::Config(format!("epoch {}: indexes.sig_to_cid is required", config.epoch)))?,
    )
    .await?;
    let sig_exists = fetch_bytes(
        config
            .indexes
            .sig_exists
            .as_deref()
            .ok_or_else(|| EngineError::Config(format!("epoch {}: indexes.sig_exists is required", config.epoch)))?,
    )
    .await?;
    let slot_to_blocktime = fetch_bytes(
        config.indexes.slot_to_blocktime.as_deref().ok_or_else(|| {
            EngineError::Config(format!("epoch {}: indexes.slot_to_blocktime is required", config.epoch))
        })?,
    )
    .await?;
    let gsfa = match &config.indexes.gsfa {
        Some(uri) => Some(fetch_bytes(uri).await?),
        None => None,
    };

    let bytes = EpochIndexBytes {
        cid_to_offset_and_size,
        cid_to_offset,
        slot_to_cid,
        signature_to_cid,
        sig_exists,
        slot_to_blocktime,
        gsfa,
    };

    Ok(Arc::new(EpochHandle::load(reader, bytes, cache_budget_mib)?))
}
