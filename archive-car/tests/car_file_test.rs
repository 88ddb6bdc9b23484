// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;
use std::sync::Mutex;

use archive_car::codec::{self, NodeResolver};
use archive_car::objects::{DataFrame, Node};
use archive_car::{CarError, Cid};

struct MapResolver(Mutex<HashMap<Cid, Node>>);

#[async_trait::async_trait]
impl NodeResolver for MapResolver {
    async fn resolve(&self, cid: &Cid) -> Result<Node, CarError> {
        self.0
            .lock()
            .unwrap()
            .get(cid)
            .cloned()
            .ok_or_else(|| CarError::bad_object(None, "not found"))
    }
}

fn insert(map: &MapResolver, node: Node) -> Cid {
    let payload = codec::encode_node(&node).unwrap();
    let cid = Cid::from_payload(&payload);
    map.0.lock().unwrap().insert(cid, node);
    cid
}

#[tokio::test]
async fn dataframe_chain_reassembles_in_order() {
    let resolver = MapResolver(Mutex::new(HashMap::new()));

    let payload = b"the quick brown fox jumps over the lazy dog, many times over".to_vec();
    let mut frames = codec::split_into_frames(&payload, 10);

    // Link frames tail-to-head so each `next` points at an already-inserted CID.
    let mut next_cid = None;
    for frame in frames.iter_mut().rev() {
        frame.next = next_cid;
        let cid = insert(&resolver, Node::DataFrame(frame.clone()));
        next_cid = Some(cid);
    }

    let head = frames.into_iter().next().unwrap();
    let reassembled = codec::resolve_data_frame_chain(&resolver, head).await.unwrap();
    assert_eq!(reassembled, payload);
}

#[tokio::test]
async fn incomplete_chain_is_an_error() {
    let resolver = MapResolver(Mutex::new(HashMap::new()));
    let broken = DataFrame {
        index: 0,
        total: 3,
        hash: None,
        bytes: b"only frame".to_vec(),
        next: None,
    };
    let err = codec::resolve_data_frame_chain(&resolver, broken)
        .await
        .unwrap_err();
    assert!(matches!(err, CarError::IncompleteFrame { expected: 3, got: 1 }));
}

#[test]
fn rewards_roundtrip_zstd() {
    let protobuf_like = vec![0x0a, 0x03, b'f', b'o', b'o'];
    let compressed = zstd::stream::encode_all(&protobuf_like[..], 0).unwrap();
    let decompressed = codec::decompress_rewards(&compressed).unwrap();
    assert_eq!(decompressed, protobuf_like);
}

#[test]
fn transaction_metadata_prefers_protobuf() {
    let protobuf_like = vec![0x0a, 0x03, b'f', b'o', b'o'];
    let compressed = zstd::stream::encode_all(&protobuf_like[..], 0).unwrap();
    let (format, bytes) = codec::decode_transaction_metadata(&compressed).unwrap();
    assert_eq!(format, codec::MetaFormat::Protobuf);
    assert_eq!(bytes, protobuf_like);
}
