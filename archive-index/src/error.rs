// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("bad magic bytes in {file}: expected {expected:?}, got {got:?}")]
    BadMagic {
        file: &'static str,
        expected: &'static [u8],
        got: Vec<u8>,
    },

    #[error("unsupported index version {0}")]
    VersionMismatch(u32),

    #[error("index metadata mismatch on {component}: expected {expected}, got {got}")]
    MetadataMismatch {
        component: &'static str,
        expected: String,
        got: String,
    },

    #[error("index is corrupt: {0}")]
    Corrupt(String),

    #[error("index build failed: {0}")]
    BuildFailed(String),

    #[error("I/O error building/reading index at {path}: {cause}")]
    Io { path: String, cause: String },
}
