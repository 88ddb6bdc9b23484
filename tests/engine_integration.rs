// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! End-to-end tests against a hand-built, in-memory single-epoch archive: a
//! `getBlock`/`getTransaction` round trip through a real [`EpochHandle`],
//! the `IndexMismatch` tamper-detection invariant, and the dispatcher's slot
//! routing.

use std::collections::HashMap;
use std::sync::Arc;

use archive_car::objects::{Block, InlineOr, Node, Transaction};
use archive_car::{ArchiveReader, CarError, Cid};
use archive_index::compact::CompactIndexBuilder;
use archive_index::instantiations::{cid_to_offset_and_size, slot_to_cid};
use archive_index::sig_exists::SigExistsBuilder;
use archive_index::{blocktime::BlocktimeBuilder, IndexMetadata};
use async_trait::async_trait;
use bytes::Bytes;

use epoch_archive::dispatcher::{epoch_for_slot, Dispatcher, TierLimits, SLOTS_PER_EPOCH};
use epoch_archive::epoch::{EpochHandle, EpochIndexBytes};

/// A test double standing in for a real archive backend: every object is
/// pre-encoded and keyed by an arbitrary offset chosen by the test, so no
/// actual CAR byte framing needs to be produced.
struct MockReader {
    sections: HashMap<u64, (Cid, Vec<u8>)>,
}

#[async_trait]
impl ArchiveReader for MockReader {
    fn roots(&self) -> &[Cid] {
        &[]
    }

    fn header_size(&self) -> u64 {
        0
    }

    async fn read_at(&self, _offset: u64, _len: u64) -> Result<Bytes, CarError> {
        Err(CarError::bad_object(None, "read_at is not used by this test double"))
    }

    async fn read_section_at(&self, offset: u64) -> Result<(Cid, Vec<u8>, u64), CarError> {
        let (cid, payload) = self
            .sections
            .get(&offset)
            .cloned()
            .ok_or_else(|| CarError::bad_object(None, format!("no section at offset {offset}")))?;
        let len = payload.len() as u64;
        Ok((cid, payload, len))
    }
}

fn meta(epoch: u64) -> IndexMetadata {
    IndexMetadata {
        epoch,
        root_cid: vec![0xAA; 36],
        network: "testnet".into(),
        index_kind: "test".into(),
    }
}

/// Builds a one-block, one-transaction epoch: a `Transaction`, referenced by
/// a `Block`, both resolvable through `cid_to_offset_and_size`/`slot_to_cid`,
/// with the transaction's signature reachable through `sig_exists` and
/// `signature_to_cid`.
fn build_single_block_epoch(epoch: u64) -> (Arc<EpochHandle>, [u8; 64], u64) {
    let signature = [7u8; 64];
    let tx = Node::Transaction(Transaction {
        slot: 100,
        position_index: Some(0),
        data: InlineOr::Inline(b"hello".to_vec()),
        metadata: InlineOr::Inline(vec![]),
    });
    let tx_bytes = archive_car::codec::encode_node(&tx).unwrap();
    let tx_cid = Cid::from_payload(&tx_bytes);

    let block = Node::Block(Block {
        slot: 100,
        parent_slot: 99,
        blocktime: 1_700_000_000,
        block_height: Some(100),
        rewards: Cid::sentinel(),
        entries: vec![],
    });
    let block_bytes = archive_car::codec::encode_node(&block).unwrap();
    let block_cid = Cid::from_payload(&block_bytes);

    let tx_offset = 0u64;
    let block_offset = 1_000u64;
    let mut sections = HashMap::new();
    sections.insert(tx_offset, (tx_cid, tx_bytes));
    sections.insert(block_offset, (block_cid, block_bytes));
    let reader: Arc<dyn ArchiveReader> = Arc::new(MockReader { sections });

    let mut cid_index = CompactIndexBuilder::new(
        cid_to_offset_and_size::KEY_SIZE,
        cid_to_offset_and_size::VALUE_SIZE,
    );
    cid_index.push(&tx_cid.to_fixed_bytes().unwrap(), &cid_to_offset_and_size::encode_value(tx_offset, 0));
    cid_index.push(
        &block_cid.to_fixed_bytes().unwrap(),
        &cid_to_offset_and_size::encode_value(block_offset, 0),
    );
    let cid_to_offset_and_size_bytes = cid_index.seal(meta(epoch)).unwrap();

    let mut slot_index = CompactIndexBuilder::new(slot_to_cid::KEY_SIZE, slot_to_cid::VALUE_SIZE);
    slot_index.push(&slot_to_cid::encode_key(100), &block_cid.to_fixed_bytes().unwrap());
    let slot_to_cid_bytes = slot_index.seal(meta(epoch)).unwrap();

    let mut sig_index = CompactIndexBuilder::new(64, 36);
    sig_index.push(&signature, &tx_cid.to_fixed_bytes().unwrap());
    let signature_to_cid_bytes = sig_index.seal(meta(epoch)).unwrap();

    let mut sig_exists = SigExistsBuilder::new();
    sig_exists.push(&signature);
    let sig_exists_bytes = sig_exists.seal(meta(epoch)).unwrap();

    let mut blocktime = BlocktimeBuilder::new(SLOTS_PER_EPOCH);
    blocktime.set(100, 1_700_000_000).unwrap();
    let blocktime_bytes = blocktime.seal(meta(epoch));

    let handle = EpochHandle::load(
        reader,
        EpochIndexBytes {
            cid_to_offset_and_size: Some(cid_to_offset_and_size_bytes),
            cid_to_offset: None,
            slot_to_cid: slot_to_cid_bytes,
            signature_to_cid: signature_to_cid_bytes,
            sig_exists: sig_exists_bytes,
            slot_to_blocktime: blocktime_bytes,
            gsfa: None,
        },
        16,
    )
    .unwrap();

    (Arc::new(handle), signature, 100)
}

#[tokio::test]
async fn get_block_and_get_transaction_round_trip() {
    let (handle, signature, slot) = build_single_block_epoch(0);

    let block = handle.get_block(slot).await.unwrap();
    assert_eq!(block.slot, 100);
    assert_eq!(block.blocktime, 1_700_000_000);

    let tx = handle.get_transaction(&signature).await.unwrap();
    assert_eq!(tx.slot, 100);
    assert_eq!(handle.get_blocktime(100), Some(1_700_000_000));
}

#[tokio::test]
async fn unknown_signature_is_rejected_by_sig_exists_without_touching_signature_to_cid() {
    let (handle, _signature, _slot) = build_single_block_epoch(0);
    let result = handle.find_cid_from_signature(&[9u8; 64]).unwrap();
    assert!(result.is_none());
}

#[test]
fn mismatched_epoch_metadata_is_rejected_at_construction() {
    let signature = [1u8; 64];
    let block_cid = Cid::from_payload(b"placeholder");

    let mut slot_index = CompactIndexBuilder::new(slot_to_cid::KEY_SIZE, slot_to_cid::VALUE_SIZE);
    slot_index.push(&slot_to_cid::encode_key(1), &block_cid.to_fixed_bytes().unwrap());
    let slot_to_cid_bytes = slot_index.seal(meta(0)).unwrap();

    let mut sig_index = CompactIndexBuilder::new(64, 36);
    sig_index.push(&signature, &block_cid.to_fixed_bytes().unwrap());
    // Built against epoch 1's metadata while slot_to_cid above is epoch 0's:
    // the two indexes must never be allowed to silently coexist.
    let signature_to_cid_bytes = sig_index.seal(meta(1)).unwrap();

    let mut sig_exists = SigExistsBuilder::new();
    sig_exists.push(&signature);
    let sig_exists_bytes = sig_exists.seal(meta(0)).unwrap();

    let mut blocktime = BlocktimeBuilder::new(SLOTS_PER_EPOCH);
    blocktime.set(1, 1).unwrap();
    let blocktime_bytes = blocktime.seal(meta(0));

    let reader: Arc<dyn ArchiveReader> = Arc::new(MockReader {
        sections: HashMap::new(),
    });

    let err = EpochHandle::load(
        reader,
        EpochIndexBytes {
            cid_to_offset_and_size: None,
            cid_to_offset: Some({
                let mut idx = CompactIndexBuilder::new(36, 6);
                idx.push(
                    &block_cid.to_fixed_bytes().unwrap(),
                    &archive_index::instantiations::cid_to_offset::encode_value(0),
                );
                idx.seal(meta(0)).unwrap()
            }),
            slot_to_cid: slot_to_cid_bytes,
            signature_to_cid: signature_to_cid_bytes,
            sig_exists: sig_exists_bytes,
            slot_to_blocktime: blocktime_bytes,
            gsfa: None,
        },
        16,
    )
    .expect_err("cross-epoch metadata mismatch must be rejected");

    match err {
        epoch_archive::EngineError::IndexMismatch { component, .. } => {
            assert_eq!(component, "signature_to_cid");
        }
        other => panic!("expected IndexMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn dispatcher_routes_by_slot_division() {
    let dispatcher = Dispatcher::new(TierLimits::default());
    let mut epochs = std::collections::BTreeMap::new();
    let (handle, _sig, _slot) = build_single_block_epoch(0);
    epochs.insert(0u64, handle);
    dispatcher.swap_epochs(epochs);

    assert_eq!(epoch_for_slot(SLOTS_PER_EPOCH - 1), 0);
    assert_eq!(epoch_for_slot(SLOTS_PER_EPOCH), 1);

    let block = dispatcher.get_block(100).await.unwrap();
    assert_eq!(block.slot, 100);

    let missing_epoch = epoch_for_slot(SLOTS_PER_EPOCH + 1);
    assert!(dispatcher.get_block(SLOTS_PER_EPOCH + 1).await.is_err());
    assert_eq!(missing_epoch, 1);
}
