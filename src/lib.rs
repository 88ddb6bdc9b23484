// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Engine library: loads per-epoch archives and indexes, dispatches
//! `getBlock`/`getTransaction`/`getSignaturesForAddress`/`getBlockTime`
//! lookups across them, and serves the result over JSON-RPC.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod epoch;
pub mod errors;
pub mod fetch;
pub mod job_group;
pub mod loader;
pub mod logging;
pub mod rpc;
pub mod watch;

pub use errors::EngineError;
