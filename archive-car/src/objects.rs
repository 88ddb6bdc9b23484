// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! The archive's tagged object model: `Epoch → Subset → Block → Entry → Transaction`,
//! plus the `Rewards` and `DataFrame` side-link objects.
//!
//! Decoding dispatches on the leading kind byte (see [`ObjectKind`]) — there is
//! no dynamic dispatch and the DAG is acyclic by construction: children are
//! always plain [`Cid`] links resolved through the archive index, never shared
//! ownership.

use serde::{Deserialize, Serialize};

use crate::cid::Cid;

/// The object kind tag, stored as the second byte of every payload (see
/// [`crate::codec`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectKind {
    Transaction = 0,
    Entry = 1,
    Block = 2,
    Subset = 3,
    Epoch = 4,
    Rewards = 5,
    DataFrame = 6,
}

impl ObjectKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => ObjectKind::Transaction,
            1 => ObjectKind::Entry,
            2 => ObjectKind::Block,
            3 => ObjectKind::Subset,
            4 => ObjectKind::Epoch,
            5 => ObjectKind::Rewards,
            6 => ObjectKind::DataFrame,
            _ => return None,
        })
    }
}

/// Either inline bytes or the head of a [`DataFrame`] chain, collapsed to
/// plain bytes once reassembled by [`crate::codec::resolve_data`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InlineOr {
    Inline(Vec<u8>),
    Frame(Cid),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Epoch {
    pub epoch: u64,
    pub network: String,
    pub subsets: Vec<Cid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subset {
    pub first_slot: u64,
    pub last_slot: u64,
    pub blocks: Vec<Cid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub slot: u64,
    pub parent_slot: u64,
    pub blocktime: i64,
    pub block_height: Option<u64>,
    /// [`Cid::sentinel`] when the block has no recorded rewards.
    pub rewards: Cid,
    pub entries: Vec<Cid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub entry_hash: Vec<u8>,
    pub num_hashes: u64,
    pub transactions: Vec<Cid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub slot: u64,
    pub position_index: Option<u64>,
    pub data: InlineOr,
    pub metadata: InlineOr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rewards {
    /// Zstandard-compressed protobuf payload, possibly chained across frames.
    pub data: InlineOr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataFrame {
    pub index: u32,
    pub total: u32,
    pub hash: Option<u64>,
    pub bytes: Vec<u8>,
    pub next: Option<Cid>,
}

/// A decoded, still-tagged archive object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Transaction(Transaction),
    Entry(Entry),
    Block(Block),
    Subset(Subset),
    Epoch(Epoch),
    Rewards(Rewards),
    DataFrame(DataFrame),
}

impl Node {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Node::Transaction(_) => ObjectKind::Transaction,
            Node::Entry(_) => ObjectKind::Entry,
            Node::Block(_) => ObjectKind::Block,
            Node::Subset(_) => ObjectKind::Subset,
            Node::Epoch(_) => ObjectKind::Epoch,
            Node::Rewards(_) => ObjectKind::Rewards,
            Node::DataFrame(_) => ObjectKind::DataFrame,
        }
    }
}
