// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Daemon entry point: parses the CLI, sets up logging, loads the epoch
//! config set, and either serves JSON-RPC or just validates the configs.

use std::sync::Arc;

use clap::Parser;

use epoch_archive::cli::{Cli, Commands};
use epoch_archive::config::ConfigMatcher;
use epoch_archive::dispatcher::{Dispatcher, TierLimits};
use epoch_archive::{logging, watch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig(args) => {
            logging::init(false);
            let matcher = ConfigMatcher::new(&args.include, &args.exclude)?;
            let configs = epoch_archive::config::load_epoch_configs(&args.config_dir, &matcher)?;
            println!("{} epoch config(s) validated", configs.len());
            Ok(())
        }
        Commands::Rpc(args) => {
            logging::init(args.debug);
            let matcher = ConfigMatcher::new(&args.include, &args.exclude)?;

            let tiers = TierLimits {
                tier1: args.tier1_epoch_limit,
                tier2: args.tier2_epoch_limit,
            };
            let dispatcher = Arc::new(Dispatcher::with_search_concurrency(
                tiers,
                args.epoch_search_concurrency,
            ));

            let count = watch::load_all(
                &dispatcher,
                &args.config_dir,
                &matcher,
                args.max_cache,
                args.epoch_load_concurrency,
            )
            .await?;
            tracing::info!(count, "loaded epoch configs");

            if args.watch {
                let dispatcher = dispatcher.clone();
                let config_dir = args.config_dir.clone();
                tokio::spawn(watch::watch_loop(
                    dispatcher,
                    config_dir,
                    matcher,
                    args.max_cache,
                    args.epoch_load_concurrency,
                ));
            }

            let listen: std::net::SocketAddr = args
                .listen
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid --listen address {}: {e}", args.listen))?;

            epoch_archive::rpc::serve(dispatcher, listen).await
        }
    }
}
