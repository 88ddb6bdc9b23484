// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Errors produced while reading a CARv1-shape archive or decoding its objects.
#[derive(Debug, Error)]
pub enum CarError {
    #[error("failed to parse uvarint at offset {0}")]
    BadVarint(u64),

    #[error("section length {len} at offset {offset} exceeds the maximum allowed size {max}")]
    SectionTooLarge { offset: u64, len: u64, max: u64 },

    #[error("invalid CAR header: {0}")]
    BadHeader(String),

    #[error("malformed CID: {0}")]
    BadCid(String),

    #[error("bad object of kind {kind:?}: {reason}")]
    BadObject { kind: Option<u8>, reason: String },

    #[error("incomplete DataFrame chain: expected {expected} frames, assembled {got}")]
    IncompleteFrame { expected: u32, got: u32 },

    #[error("decompression failed: {0}")]
    DecompressFailed(String),

    #[error("unknown transaction metadata format")]
    UnknownMetaFormat,

    #[error("{backend} I/O error on range {offset}..{}: {cause}", offset + len)]
    Io {
        backend: &'static str,
        offset: u64,
        len: u64,
        cause: String,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl CarError {
    pub fn bad_object(kind: Option<u8>, reason: impl Into<String>) -> Self {
        CarError::BadObject {
            kind,
            reason: reason.into(),
        }
    }
}
