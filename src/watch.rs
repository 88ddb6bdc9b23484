// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Loads the epoch-config directory into a running [`Dispatcher`], and
//! optionally keeps it in sync by periodically re-scanning the directory
//! and atomically swapping in epochs whose config changed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::config::{load_epoch_configs, ConfigMatcher};
use crate::dispatcher::Dispatcher;
use crate::errors::EngineError;
use crate::loader::load_epoch_handle;

const WATCH_INTERVAL: Duration = Duration::from_secs(30);

/// Loads every matched epoch config under `config_dir`, building each
/// [`crate::epoch::EpochHandle`] with up to `load_concurrency` configs in
/// flight at once, and installs the resulting set on `dispatcher`.
pub async fn load_all(
    dispatcher: &Dispatcher,
    config_dir: &Path,
    matcher: &ConfigMatcher,
    cache_budget_mib: usize,
    load_concurrency: usize,
) -> Result<usize, EngineError> {
    let configs = load_epoch_configs(config_dir, matcher)?;
    let loaded = stream::iter(configs)
        .map(|config| async move {
            let epoch = config.epoch;
            match load_epoch_handle(&config, cache_budget_mib).await {
                Ok(handle) => Some((epoch, handle)),
                Err(e) => {
                    tracing::warn!(epoch, error = %e, "failed to load epoch, skipping");
                    None
                }
            }
        })
        .buffer_unordered(load_concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let epochs: BTreeMap<_, _> = loaded.into_iter().flatten().collect();
    let count = epochs.len();
    dispatcher.swap_epochs(epochs);
    Ok(count)
}

/// Re-scans `config_dir` on a fixed interval, reloading the whole epoch set
/// whenever it changes. Runs until `dispatcher`'s cancellation token fires.
pub async fn watch_loop(
    dispatcher: Arc<Dispatcher>,
    config_dir: std::path::PathBuf,
    matcher: ConfigMatcher,
    cache_budget_mib: usize,
    load_concurrency: usize,
) {
    let token = dispatcher.cancellation_token().clone();
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(WATCH_INTERVAL) => {}
        }
        match load_all(&dispatcher, &config_dir, &matcher, cache_budget_mib, load_concurrency).await {
            Ok(count) => tracing::info!(count, "reloaded epoch configs"),
            Err(e) => tracing::warn!(error = %e, "epoch config reload failed, keeping previous set"),
        }
    }
}
