// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! The top-level error taxonomy, composing the per-crate `thiserror` enums
//! from `archive-car` and `archive-index` via `#[from]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} {1} not found")]
    NotFound(&'static str, String),

    #[error("index mismatch on {component}: expected {expected}, got {got}")]
    IndexMismatch {
        component: &'static str,
        expected: String,
        got: String,
    },

    #[error("bad archive: {0}")]
    BadArchive(#[from] archive_car::CarError),

    #[error("index error: {0}")]
    Index(#[from] archive_index::IndexError),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("cancelled")]
    Cancelled,

    #[error("no handle available for epoch {0}")]
    Unavailable(u64),

    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound(kind, id.into())
    }

    /// Lookups surface `NotFound` without being logged as failures; this is
    /// how callers distinguish "absent" from "broken".
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(..))
    }
}
