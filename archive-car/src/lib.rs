// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! CARv1-shape archive reader and object codec.
//!
//! This crate owns two of the engine's leaf components: the [`reader`]
//! module (sequential iteration and random `read_at` access over a local
//! file, an HTTP range endpoint, or aggregated split pieces) and the
//! [`codec`] module (typed decoding of the archive's tagged object model in
//! [`objects`], including DataFrame reassembly and transaction metadata
//! decompression).

pub mod cid;
pub mod codec;
pub mod error;
pub mod objects;
pub mod reader;
pub mod varint;

pub use cid::Cid;
pub use error::CarError;
pub use objects::{Block, DataFrame, Entry, Epoch, InlineOr, Node, ObjectKind, Rewards, Subset, Transaction};
pub use reader::{ArchiveReader, CarHeader, SequentialNode, SequentialReader};
