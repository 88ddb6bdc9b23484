// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Command-line surface: `clap` derive mirroring the teacher's own CLI
//! layout, a `rpc` subcommand that serves the JSON-RPC API and a
//! `check-config` subcommand that only validates an epoch-config directory.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "epoch-archive", about = "Serves historical blockchain archive data over JSON-RPC")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the JSON-RPC API.
    Rpc(RpcArgs),
    /// Validate an epoch-config directory without serving anything.
    CheckConfig(CheckConfigArgs),
}

#[derive(Parser)]
pub struct RpcArgs {
    /// Directory of per-epoch YAML configuration documents.
    #[arg(long, default_value = "configs")]
    pub config_dir: PathBuf,

    /// JSON-RPC HTTP listen address.
    #[arg(long, default_value = "127.0.0.1:8899")]
    pub listen: String,

    /// Reserved for a future gRPC surface; accepted and ignored.
    #[arg(long)]
    pub grpc_listen: Option<String>,

    /// Glob patterns selecting which config files to load.
    #[arg(long = "include")]
    pub include: Vec<String>,

    /// Glob patterns excluding config files that would otherwise match.
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,

    /// Re-scan the config directory and hot-swap epochs as files change.
    #[arg(long)]
    pub watch: bool,

    /// Raise the default log level to debug.
    #[arg(long)]
    pub debug: bool,

    /// Reserved for a future upstream-RPC proxy fallback; accepted and ignored.
    #[arg(long)]
    pub proxy: Option<String>,

    /// Reserved: the engine has no address-keyed index besides gSFA, so
    /// `getSignaturesForAddress` already only ever reads gSFA; accepted and
    /// ignored.
    #[arg(long)]
    pub gsfa_only_signatures: bool,

    /// Max concurrent epoch config loads during startup or a watch refresh.
    #[arg(long, default_value_t = 4)]
    pub epoch_load_concurrency: usize,

    /// Max concurrent epochs probed per signature-search tier.
    #[arg(long, default_value_t = 8)]
    pub epoch_search_concurrency: usize,

    /// Number of most-recent epochs searched first for a signature.
    #[arg(long, default_value_t = 10)]
    pub tier1_epoch_limit: usize,

    /// Number of next-most-recent epochs searched in the second tier.
    #[arg(long, default_value_t = 50)]
    pub tier2_epoch_limit: usize,

    /// Total cache budget, in MiB, shared across all loaded epochs.
    #[arg(long, default_value_t = 512)]
    pub max_cache: usize,

    /// Address of a Filecoin lotus-compatible API, for `car_from_pieces`
    /// data sources.
    #[arg(long)]
    pub filecoin_api_address: Option<String>,
}

#[derive(Parser)]
pub struct CheckConfigArgs {
    pub config_dir: PathBuf,

    #[arg(long = "include")]
    pub include: Vec<String>,

    #[arg(long = "exclude")]
    pub exclude: Vec<String>,
}
