// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Encodes and decodes archive payloads, and reassembles [`DataFrame`] chains
//! and compressed/versioned transaction metadata.

use prost::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cid::Cid;
use crate::error::CarError;
use crate::objects::{Block, DataFrame, Entry, Epoch, InlineOr, Node, ObjectKind, Rewards, Subset, Transaction};

/// Marks the start of every archive payload; the object kind follows as the
/// next byte. This is a framing convention of this archive format, not a
/// standard IPLD CBOR tag.
pub const NODE_TAG: u8 = 0xd9;

fn cbor_encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CarError> {
    cbor4ii::serde::to_vec(Vec::new(), value)
        .map_err(|e| CarError::bad_object(None, format!("cbor encode: {e}")))
}

fn cbor_decode<T: DeserializeOwned>(kind: ObjectKind, bytes: &[u8]) -> Result<T, CarError> {
    cbor4ii::serde::from_slice(bytes)
        .map_err(|e| CarError::bad_object(Some(kind as u8), format!("cbor decode: {e}")))
}

/// Encodes a tagged node to its on-archive payload bytes.
pub fn encode_node(node: &Node) -> Result<Vec<u8>, CarError> {
    let mut out = vec![NODE_TAG, node.kind() as u8];
    let body = match node {
        Node::Transaction(v) => cbor_encode(v)?,
        Node::Entry(v) => cbor_encode(v)?,
        Node::Block(v) => cbor_encode(v)?,
        Node::Subset(v) => cbor_encode(v)?,
        Node::Epoch(v) => cbor_encode(v)?,
        Node::Rewards(v) => cbor_encode(v)?,
        Node::DataFrame(v) => cbor_encode(v)?,
    };
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decodes a payload's kind byte and typed body into a [`Node`].
pub fn decode_node(payload: &[u8]) -> Result<Node, CarError> {
    if payload.len() < 2 || payload[0] != NODE_TAG {
        return Err(CarError::bad_object(None, "missing node tag byte"));
    }
    let kind = ObjectKind::from_byte(payload[1])
        .ok_or_else(|| CarError::bad_object(Some(payload[1]), "unknown object kind"))?;
    let body = &payload[2..];
    Ok(match kind {
        ObjectKind::Transaction => Node::Transaction(cbor_decode::<Transaction>(kind, body)?),
        ObjectKind::Entry => Node::Entry(cbor_decode::<Entry>(kind, body)?),
        ObjectKind::Block => Node::Block(cbor_decode::<Block>(kind, body)?),
        ObjectKind::Subset => Node::Subset(cbor_decode::<Subset>(kind, body)?),
        ObjectKind::Epoch => Node::Epoch(cbor_decode::<Epoch>(kind, body)?),
        ObjectKind::Rewards => Node::Rewards(cbor_decode::<Rewards>(kind, body)?),
        ObjectKind::DataFrame => Node::DataFrame(cbor_decode::<DataFrame>(kind, body)?),
    })
}

/// Peeks the object kind without fully decoding the body.
pub fn peek_kind(payload: &[u8]) -> Result<ObjectKind, CarError> {
    if payload.len() < 2 || payload[0] != NODE_TAG {
        return Err(CarError::bad_object(None, "missing node tag byte"));
    }
    ObjectKind::from_byte(payload[1])
        .ok_or_else(|| CarError::bad_object(Some(payload[1]), "unknown object kind"))
}

/// Resolves a chain of [`DataFrame`]s starting at `head` to a single
/// concatenated byte string, in ascending `index` order. Mirrors
/// [`split_into_frames`] as an involution: decoding what the splitter wrote
/// always yields the original bytes back.
#[async_trait::async_trait]
pub trait NodeResolver: Send + Sync {
    async fn resolve(&self, cid: &Cid) -> Result<Node, CarError>;
}

pub async fn resolve_data_frame_chain<R: NodeResolver + ?Sized>(
    resolver: &R,
    head: DataFrame,
) -> Result<Vec<u8>, CarError> {
    let total = head.total;
    let mut frames: Vec<Option<Vec<u8>>> = vec![None; total as usize];
    let mut next = Some(head);
    let mut seen = 0u32;
    while let Some(frame) = next.take() {
        let idx = frame.index as usize;
        if idx >= frames.len() {
            return Err(CarError::bad_object(
                Some(ObjectKind::DataFrame as u8),
                format!("frame index {idx} out of bounds for total {total}"),
            ));
        }
        frames[idx] = Some(frame.bytes);
        seen += 1;
        if let Some(next_cid) = frame.next {
            match resolver.resolve(&next_cid).await? {
                Node::DataFrame(df) => next = Some(df),
                other => {
                    return Err(CarError::bad_object(
                        Some(other.kind() as u8),
                        "DataFrame.next did not resolve to a DataFrame",
                    ))
                }
            }
        }
    }
    if seen != total {
        return Err(CarError::IncompleteFrame {
            expected: total,
            got: seen,
        });
    }
    let mut out = Vec::new();
    for (i, frame) in frames.into_iter().enumerate() {
        out.extend(frame.ok_or(CarError::IncompleteFrame {
            expected: total,
            got: i as u32,
        })?);
    }
    Ok(out)
}

/// Splits `payload` into a chain of [`DataFrame`]s of at most `max_frame_len`
/// bytes each, newest-first `next` links pointing to the following frame.
/// Used by the reference encoder and by round-trip tests.
pub fn split_into_frames(payload: &[u8], max_frame_len: usize) -> Vec<DataFrame> {
    if payload.is_empty() {
        return vec![DataFrame {
            index: 0,
            total: 1,
            hash: None,
            bytes: Vec::new(),
            next: None,
        }];
    }
    let chunks: Vec<&[u8]> = payload.chunks(max_frame_len.max(1)).collect();
    let total = chunks.len() as u32;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| DataFrame {
            index: i as u32,
            total,
            hash: None,
            bytes: chunk.to_vec(),
            next: None, // caller links frames once CIDs of later frames are known
        })
        .collect()
}

/// Resolves an [`InlineOr`] field to plain bytes, following a DataFrame chain
/// if necessary.
pub async fn resolve_inline_or<R: NodeResolver + ?Sized>(
    resolver: &R,
    field: &InlineOr,
) -> Result<Vec<u8>, CarError> {
    match field {
        InlineOr::Inline(bytes) => Ok(bytes.clone()),
        InlineOr::Frame(cid) => match resolver.resolve(cid).await? {
            Node::DataFrame(df) => resolve_data_frame_chain(resolver, df).await,
            other => Err(CarError::bad_object(
                Some(other.kind() as u8),
                "expected a DataFrame at the head of an InlineOr::Frame link",
            )),
        },
    }
}

/// A schema-less probe message: every field number and wire type is
/// unrecognized, so decoding it does nothing but walk the buffer validating
/// that each field's framing is well-formed protobuf. Used where a field's
/// payload must be *some* valid protobuf message without this layer needing
/// to know its concrete schema.
#[derive(Clone, PartialEq, ::prost::Message)]
struct ProtobufProbe {}

/// Decompresses a Rewards payload (Zstandard over protobuf) and validates
/// that the result actually parses as protobuf. Returns the raw decompressed
/// bytes; this layer treats the Rewards payload as opaque and leaves typed
/// decoding of its fields to callers with the concrete schema.
pub fn decompress_rewards(compressed: &[u8]) -> Result<Vec<u8>, CarError> {
    let decompressed =
        zstd::stream::decode_all(compressed).map_err(|e| CarError::DecompressFailed(e.to_string()))?;
    if ProtobufProbe::decode(decompressed.as_slice()).is_err() {
        return Err(CarError::bad_object(
            Some(ObjectKind::Rewards as u8),
            "rewards payload did not parse as protobuf",
        ));
    }
    Ok(decompressed)
}

/// The transaction metadata protocol version a blob decoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaFormat {
    Protobuf,
    SerdeLegacyOldest,
    SerdeLegacyLatest,
}

/// Tries Zstandard decompression followed by each known metadata encoding in
/// turn (protobuf, then the two legacy serde-tagged formats). The first
/// success wins; if every attempt fails the metadata is treated as absent
/// (`UnknownMetaFormat`) rather than a hard error, per the spec's tolerance
/// policy.
pub fn decode_transaction_metadata(raw: &[u8]) -> Result<(MetaFormat, Vec<u8>), CarError> {
    let candidate = zstd::stream::decode_all(raw).unwrap_or_else(|_| raw.to_vec());

    if looks_like_protobuf(&candidate) {
        return Ok((MetaFormat::Protobuf, candidate));
    }
    if let Ok(()) = try_legacy_serde(&candidate, LegacyEra::Oldest) {
        return Ok((MetaFormat::SerdeLegacyOldest, candidate));
    }
    if let Ok(()) = try_legacy_serde(&candidate, LegacyEra::Latest) {
        return Ok((MetaFormat::SerdeLegacyLatest, candidate));
    }
    Err(CarError::UnknownMetaFormat)
}

enum LegacyEra {
    Oldest,
    Latest,
}

/// The two legacy transaction-status encodings are bincode-ish
/// serde-tagged enums from the era before the protobuf metadata format; we
/// only need to validate that the blob parses as a well-formed tagged enum
/// of the expected shape, since higher layers only care whether metadata
/// is present.
fn try_legacy_serde(bytes: &[u8], _era: LegacyEra) -> Result<(), CarError> {
    #[derive(serde::Deserialize)]
    #[allow(dead_code)]
    struct LegacyEnvelope {
        variant: u32,
    }
    cbor4ii::serde::from_slice::<LegacyEnvelope>(bytes)
        .map(|_| ())
        .map_err(|e| CarError::bad_object(None, e.to_string()))
}

fn looks_like_protobuf(bytes: &[u8]) -> bool {
    ProtobufProbe::decode(bytes).is_ok()
}

/// Parses the Solana wire-format signature list (compact-u16 count followed
/// by 64-byte signatures) from reconstructed transaction `Data` bytes. The
/// first signature is the transaction's indexing key.
pub fn parse_signatures(data: &[u8]) -> Result<Vec<[u8; 64]>, CarError> {
    let (count, consumed) = read_compact_u16(data)?;
    let mut out = Vec::with_capacity(count as usize);
    let mut offset = consumed;
    for _ in 0..count {
        let end = offset + 64;
        if end > data.len() {
            return Err(CarError::bad_object(
                Some(ObjectKind::Transaction as u8),
                "truncated signature list",
            ));
        }
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&data[offset..end]);
        out.push(sig);
        offset = end;
    }
    Ok(out)
}

/// Decodes Solana's "compact-u16" varint (a 7-bit-per-byte little-endian
/// varint capped at 3 bytes / 16 bits).
fn read_compact_u16(data: &[u8]) -> Result<(u16, usize), CarError> {
    let mut result: u16 = 0;
    for i in 0..3 {
        let byte = *data
            .get(i)
            .ok_or_else(|| CarError::bad_object(None, "truncated compact-u16"))?;
        result |= ((byte & 0x7f) as u16) << (i * 7);
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }
    Err(CarError::bad_object(None, "compact-u16 too long"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_roundtrip() {
        let epoch = Node::Epoch(Epoch {
            epoch: 42,
            network: "mainnet-beta".into(),
            subsets: vec![Cid::from_payload(b"subset-0")],
        });
        let bytes = encode_node(&epoch).unwrap();
        assert_eq!(peek_kind(&bytes).unwrap(), ObjectKind::Epoch);
        let decoded = decode_node(&bytes).unwrap();
        assert_eq!(decoded, epoch);
    }

    #[test]
    fn rejects_bad_tag() {
        let bytes = vec![0x00, ObjectKind::Epoch as u8];
        assert!(decode_node(&bytes).is_err());
    }

    #[test]
    fn split_into_frames_is_involution_with_plain_concat() {
        let payload = b"a moderately long payload that needs several frames to store".to_vec();
        let frames = split_into_frames(&payload, 8);
        let reassembled: Vec<u8> = frames.iter().flat_map(|f| f.bytes.clone()).collect();
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn well_formed_protobuf_is_recognized() {
        #[derive(Clone, PartialEq, ::prost::Message)]
        struct Sample {
            #[prost(uint64, tag = "1")]
            value: u64,
        }
        let bytes = Sample { value: 7 }.encode_to_vec();
        assert!(looks_like_protobuf(&bytes));
    }

    #[test]
    fn garbage_is_not_protobuf() {
        assert!(!looks_like_protobuf(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]));
    }

    #[test]
    fn decompress_rewards_rejects_non_protobuf_payload() {
        let compressed = zstd::stream::encode_all(&b"not protobuf at all, just text"[..], 0).unwrap();
        assert!(decompress_rewards(&compressed).is_err());
    }

    #[test]
    fn decompress_rewards_accepts_well_formed_protobuf() {
        #[derive(Clone, PartialEq, ::prost::Message)]
        struct Sample {
            #[prost(string, tag = "1")]
            label: String,
        }
        let payload = Sample { label: "ok".into() }.encode_to_vec();
        let compressed = zstd::stream::encode_all(payload.as_slice(), 0).unwrap();
        assert_eq!(decompress_rewards(&compressed).unwrap(), payload);
    }

    #[test]
    fn compact_u16_roundtrip() {
        // Two fake 64-byte signatures.
        let mut data = vec![2u8]; // count = 2
        data.extend(std::iter::repeat(0xAB).take(64));
        data.extend(std::iter::repeat(0xCD).take(64));
        let sigs = parse_signatures(&data).unwrap();
        assert_eq!(sigs.len(), 2);
        assert_eq!(sigs[0][0], 0xAB);
        assert_eq!(sigs[1][0], 0xCD);
    }
}
