// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! JSON-RPC surface: a thin `jsonrpsee` server exposing the handful of
//! read-only methods this archive serves. gRPC and upstream-RPC proxying are
//! out of scope; `--grpc-listen`/`--proxy` are accepted by the CLI and
//! ignored.

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::server::{RpcModule, Server};
use jsonrpsee::types::{ErrorObject, ErrorObjectOwned};
use serde::Serialize;

use crate::dispatcher::Dispatcher;
use crate::errors::EngineError;

#[derive(Serialize)]
struct SignatureEntry {
    signature: String,
    slot: u64,
    err: bool,
}

impl From<archive_index::gsfa::GsfaEntry> for SignatureEntry {
    fn from(entry: archive_index::gsfa::GsfaEntry) -> Self {
        Self {
            signature: bs58::encode(entry.signature).into_string(),
            slot: entry.slot,
            err: entry.flags & archive_index::gsfa::IS_SUCCESS == 0,
        }
    }
}

const DEFAULT_SIGNATURES_LIMIT: usize = 1_000;

fn to_rpc_error(err: EngineError) -> ErrorObjectOwned {
    if err.is_not_found() {
        ErrorObject::owned(-32004, err.to_string(), None::<()>)
    } else {
        ErrorObject::owned(-32000, err.to_string(), None::<()>)
    }
}

fn decode_signature(s: &str) -> Result<[u8; 64], ErrorObjectOwned> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| ErrorObject::owned(-32602, format!("invalid signature: {e}"), None::<()>))?;
    bytes
        .try_into()
        .map_err(|_| ErrorObject::owned(-32602, "signature must decode to 64 bytes", None::<()>))
}

/// Builds the `RpcModule` wiring every method to the shared dispatcher. The
/// dispatcher is cheaply cloneable (an `Arc` internally via `ArcSwap`), so
/// each method closure captures its own handle.
pub fn build_module(dispatcher: Arc<Dispatcher>) -> RpcModule<Arc<Dispatcher>> {
    let mut module = RpcModule::new(dispatcher);

    module
        .register_async_method("getBlock", |params, dispatcher, _| async move {
            let slot: u64 = params.one()?;
            dispatcher.get_block(slot).await.map_err(to_rpc_error)
        })
        .expect("getBlock is registered exactly once");

    module
        .register_async_method("getTransaction", |params, dispatcher, _| async move {
            let signature: String = params.one()?;
            let signature = decode_signature(&signature)?;
            dispatcher.get_transaction(signature).await.map_err(to_rpc_error)
        })
        .expect("getTransaction is registered exactly once");

    module
        .register_method("getBlockTime", |params, dispatcher, _| {
            let slot: u64 = params.one()?;
            dispatcher.get_blocktime(slot).map_err(to_rpc_error)
        })
        .expect("getBlockTime is registered exactly once");

    module
        .register_method("getFirstAvailableBlock", |_params, dispatcher, _| {
            Ok::<_, ErrorObjectOwned>(dispatcher.first_available_block().unwrap_or(0))
        })
        .expect("getFirstAvailableBlock is registered exactly once");

    module
        .register_method("getSignaturesForAddress", |params, dispatcher, _| {
            let (address, limit): (String, Option<usize>) = params.parse()?;
            let addr_bytes = bs58::decode(&address)
                .into_vec()
                .map_err(|e| ErrorObject::owned(-32602, format!("invalid address: {e}"), None::<()>))?;
            let entries = dispatcher
                .get_signatures_for_address(&addr_bytes, limit.unwrap_or(DEFAULT_SIGNATURES_LIMIT));
            Ok::<_, ErrorObjectOwned>(entries.into_iter().map(SignatureEntry::from).collect::<Vec<_>>())
        })
        .expect("getSignaturesForAddress is registered exactly once");

    module
}

pub async fn serve(dispatcher: Arc<Dispatcher>, listen: SocketAddr) -> anyhow::Result<()> {
    let server = Server::builder().build(listen).await?;
    let module = build_module(dispatcher);
    let handle = server.start(module);
    tracing::info!(%listen, "JSON-RPC server listening");
    handle.stopped().await;
    Ok(())
}
