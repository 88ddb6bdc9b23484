// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! The epoch handle: one archive reader plus every index for a single
//! epoch, cross-checked at construction and consulted through bounded
//! caches on every lookup.

use std::sync::Arc;

use archive_car::objects::{Block, DataFrame, Entry, InlineOr, Node, Rewards, Transaction};
use archive_car::{codec, ArchiveReader, CarError, Cid};
use archive_index::compact::CompactIndexReader;
use archive_index::gsfa::GsfaReader;
use archive_index::instantiations::{cid_to_offset, cid_to_offset_and_size, signature_to_cid, slot_to_cid};
use archive_index::sig_exists::SigExistsReader;
use archive_index::{blocktime::BlocktimeReader, IndexMetadata};

use crate::cache::EpochCaches;
use crate::errors::EngineError;

/// Raw bytes for every index a fully loaded epoch carries. The deprecated
/// offset-only variant and the gSFA log are optional.
pub struct EpochIndexBytes {
    pub cid_to_offset_and_size: Option<Vec<u8>>,
    pub cid_to_offset: Option<Vec<u8>>,
    pub slot_to_cid: Vec<u8>,
    pub signature_to_cid: Vec<u8>,
    pub sig_exists: Vec<u8>,
    pub slot_to_blocktime: Vec<u8>,
    pub gsfa: Option<Vec<u8>>,
}

pub struct EpochHandle {
    epoch: u64,
    network: String,
    reader: Arc<dyn ArchiveReader>,
    cid_to_offset_and_size: Option<CompactIndexReader>,
    cid_to_offset_fallback: Option<CompactIndexReader>,
    slot_to_cid: CompactIndexReader,
    signature_to_cid: CompactIndexReader,
    sig_exists: SigExistsReader,
    slot_to_blocktime: BlocktimeReader,
    gsfa: Option<GsfaReader>,
    caches: EpochCaches,
}

impl EpochHandle {
    pub fn load(
        reader: Arc<dyn ArchiveReader>,
        bytes: EpochIndexBytes,
        cache_budget_mib: usize,
    ) -> Result<Self, EngineError> {
        let slot_to_cid = CompactIndexReader::parse(bytes.slot_to_cid)?;
        let signature_to_cid = CompactIndexReader::parse(bytes.signature_to_cid)?;
        let sig_exists = SigExistsReader::parse(bytes.sig_exists)?;
        let slot_to_blocktime = BlocktimeReader::parse(bytes.slot_to_blocktime)?;
        let cid_to_offset_and_size = bytes
            .cid_to_offset_and_size
            .map(CompactIndexReader::parse)
            .transpose()?;
        let cid_to_offset_fallback = bytes.cid_to_offset.map(CompactIndexReader::parse).transpose()?;
        let gsfa = bytes.gsfa.map(GsfaReader::parse).transpose()?;

        if cid_to_offset_and_size.is_none() && cid_to_offset_fallback.is_none() {
            return Err(EngineError::Config(
                "epoch handle requires cid_to_offset_and_size or the deprecated cid_to_offset fallback".into(),
            ));
        }

        let reference = slot_to_cid.metadata().clone();
        for (index_name, other) in [
            ("signature_to_cid", Some(signature_to_cid.metadata())),
            ("sig_exists", Some(sig_exists.metadata())),
            ("slot_to_blocktime", Some(slot_to_blocktime.metadata())),
            (
                "cid_to_offset_and_size",
                cid_to_offset_and_size.as_ref().map(|r| r.metadata()),
            ),
            ("cid_to_offset", cid_to_offset_fallback.as_ref().map(|r| r.metadata())),
            ("gsfa", gsfa.as_ref().map(|r| r.metadata())),
        ]
        .into_iter()
        .filter_map(|(name, meta)| meta.map(|m| (name, m)))
        {
            if let Err(archive_index::IndexError::MetadataMismatch { component: field, expected, got }) =
                reference.cross_check(other)
            {
                return Err(EngineError::IndexMismatch {
                    component: index_name,
                    expected: format!("{field}={expected}"),
                    got: format!("{field}={got}"),
                });
            }
        }

        Ok(Self {
            epoch: reference.epoch,
            network: reference.network.clone(),
            reader,
            cid_to_offset_and_size,
            cid_to_offset_fallback,
            slot_to_cid,
            signature_to_cid,
            sig_exists,
            slot_to_blocktime,
            gsfa,
            caches: EpochCaches::with_budget_mib(cache_budget_mib),
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn root_cid(&self) -> &[u8] {
        &self.slot_to_cid.metadata().root_cid
    }

    pub fn metadata(&self) -> &IndexMetadata {
        self.slot_to_cid.metadata()
    }

    #[tracing::instrument(skip(self))]
    pub fn find_cid_from_slot(&self, slot: u64) -> Result<Cid, EngineError> {
        let key = slot_to_cid::encode_key(slot);
        let value = self
            .slot_to_cid
            .get(&key)?
            .ok_or_else(|| EngineError::not_found("slot", slot.to_string()))?;
        Ok(decode_fixed_cid(&value, "slot_to_cid")?)
    }

    #[tracing::instrument(skip(self, signature))]
    pub fn find_cid_from_signature(&self, signature: &[u8; 64]) -> Result<Option<Cid>, EngineError> {
        if !self.sig_exists.contains(signature) {
            return Ok(None);
        }
        let value = self.signature_to_cid.get(signature)?;
        value.map(|bytes| decode_fixed_cid(&bytes, "signature_to_cid")).transpose()
    }

    #[tracing::instrument(skip(self))]
    pub fn find_offset_and_size_from_cid(&self, cid: &Cid) -> Result<(u64, u32), EngineError> {
        let key = cid.to_fixed_bytes()?;
        if let Some(index) = &self.cid_to_offset_and_size {
            if let Some(value) = index.get(&key)? {
                return Ok(cid_to_offset_and_size::decode_value(&value));
            }
        }
        if let Some(index) = &self.cid_to_offset_fallback {
            if let Some(value) = index.get(&key)? {
                let offset = cid_to_offset::decode_value(&value);
                // The deprecated variant has no stored size; `0` signals
                // "unknown, derive it from the archive" to callers that
                // read the section directly instead of a fixed-length slice.
                return Ok((offset, 0));
            }
        }
        Err(EngineError::not_found("CID", cid.to_string()))
    }

    /// Reads and decodes the object at `cid`, consulting (and populating)
    /// the object cache.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_cid(&self, cid: Cid) -> Result<Node, EngineError> {
        if let Some(hit) = self.caches.objects.get(&cid) {
            return Ok(hit);
        }
        let (offset, _size) = self.find_offset_and_size_from_cid(&cid)?;
        let node = self
            .caches
            .objects
            .get_or_try_insert_with(cid, || async move {
                let (found_cid, payload, _) = self.reader.read_section_at(offset).await?;
                if found_cid != cid {
                    return Err(EngineError::Internal(format!(
                        "archive offset {offset} holds {found_cid}, expected {cid}"
                    )));
                }
                codec::decode_node(&payload).map_err(EngineError::from)
            })
            .await?;
        Ok(node)
    }

    pub async fn get_block(&self, slot: u64) -> Result<Block, EngineError> {
        let cid = self.find_cid_from_slot(slot)?;
        match self.resolve_cid(cid).await? {
            Node::Block(b) => Ok(b),
            other => Err(EngineError::Internal(format!(
                "slot {slot} resolved to a {:?}, expected Block",
                other.kind()
            ))),
        }
    }

    /// Resolves a signature to its transaction, fully reassembling any
    /// DataFrame-chained `data`/`metadata` field into inline bytes so callers
    /// never see an unresolved `InlineOr::Frame` CID.
    pub async fn get_transaction(&self, signature: &[u8; 64]) -> Result<Transaction, EngineError> {
        let cid = self
            .find_cid_from_signature(signature)?
            .ok_or_else(|| EngineError::not_found("signature", bs58::encode(signature).into_string()))?;
        let mut transaction = match self.resolve_cid(cid).await? {
            Node::Transaction(t) => t,
            other => {
                return Err(EngineError::Internal(format!(
                    "signature resolved to a {:?}, expected Transaction",
                    other.kind()
                )))
            }
        };
        transaction.data = InlineOr::Inline(self.resolve_inline_or(transaction.data).await?);
        transaction.metadata = InlineOr::Inline(self.resolve_inline_or(transaction.metadata).await?);
        Ok(transaction)
    }

    pub async fn get_entry_by_cid(&self, cid: Cid) -> Result<Entry, EngineError> {
        match self.resolve_cid(cid).await? {
            Node::Entry(e) => Ok(e),
            other => Err(EngineError::Internal(format!("expected Entry, got {:?}", other.kind()))),
        }
    }

    pub async fn get_rewards_by_cid(&self, cid: Cid) -> Result<Rewards, EngineError> {
        match self.resolve_cid(cid).await? {
            Node::Rewards(r) => Ok(r),
            other => Err(EngineError::Internal(format!("expected Rewards, got {:?}", other.kind()))),
        }
    }

    pub async fn get_data_frame_by_cid(&self, cid: Cid) -> Result<DataFrame, EngineError> {
        match self.resolve_cid(cid).await? {
            Node::DataFrame(f) => Ok(f),
            other => Err(EngineError::Internal(format!(
                "expected DataFrame, got {:?}",
                other.kind()
            ))),
        }
    }

    /// Resolves an inline-or-chained byte field (a Transaction's `Data` or
    /// `Metadata`) to its fully reassembled bytes.
    pub async fn resolve_inline_or(&self, field: InlineOr) -> Result<Vec<u8>, EngineError> {
        match field {
            InlineOr::Inline(bytes) => Ok(bytes),
            InlineOr::Frame(cid) => {
                let head = self.get_data_frame_by_cid(cid).await?;
                Ok(codec::resolve_data_frame_chain(self, head).await?)
            }
        }
    }

    pub fn get_blocktime(&self, slot_in_epoch: u64) -> Option<i64> {
        self.slot_to_blocktime.get(slot_in_epoch)
    }

    pub fn gsfa(&self) -> Option<&GsfaReader> {
        self.gsfa.as_ref()
    }

    pub fn header_size(&self) -> u64 {
        self.reader.header_size()
    }

    /// Used by the prefetch path to pull a contiguous range of the archive
    /// into the object cache ahead of decode.
    pub async fn read_at_from_car(&self, offset: u64, length: u64) -> Result<bytes::Bytes, EngineError> {
        Ok(self.reader.read_at(offset, length).await?)
    }
}

#[async_trait::async_trait]
impl codec::NodeResolver for EpochHandle {
    async fn resolve(&self, cid: &Cid) -> Result<Node, CarError> {
        self.resolve_cid(*cid).await.map_err(|e| match e {
            EngineError::BadArchive(car_err) => car_err,
            other => CarError::bad_object(None, other.to_string()),
        })
    }
}

fn decode_fixed_cid(bytes: &[u8], index_name: &'static str) -> Result<Cid, EngineError> {
    let array: [u8; archive_car::cid::FIXED_CID_LEN] = bytes
        .try_into()
        .map_err(|_| EngineError::Internal(format!("{index_name} value was not {} bytes", archive_car::cid::FIXED_CID_LEN)))?;
    Ok(Cid::from_fixed_bytes(&array)?)
}

/// Loads index or archive bytes from either a local filesystem path or an
/// HTTP(S) URI, as named in an epoch configuration document.
pub async fn fetch_bytes(uri: &str) -> Result<Vec<u8>, EngineError> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        let response = reqwest::get(uri)
            .await
            .map_err(|e| EngineError::Config(format!("fetching {uri}: {e}")))?;
        Ok(response
            .bytes()
            .await
            .map_err(|e| EngineError::Config(format!("reading body of {uri}: {e}")))?
            .to_vec())
    } else {
        Ok(tokio::fs::read(uri).await?)
    }
}
