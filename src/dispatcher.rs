// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! The multi-epoch dispatcher: routes a slot to its owning epoch by
//! division, and a signature to its owning epoch via tiered concurrent
//! search using the [`crate::job_group`] primitive.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use archive_car::objects::{Block, Transaction};

use crate::epoch::EpochHandle;
use crate::errors::EngineError;
use crate::job_group::{self, JobOutcome};

pub const SLOTS_PER_EPOCH: u64 = 432_000;

pub fn epoch_for_slot(slot: u64) -> u64 {
    slot / SLOTS_PER_EPOCH
}

pub struct TierLimits {
    pub tier1: usize,
    pub tier2: usize,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self { tier1: 10, tier2: 50 }
    }
}

/// Owns the epoch set, swapped atomically by the config watch loop. Readers
/// take a short-lived `Guard` to resolve a handle, then use it lock-free.
pub struct Dispatcher {
    epochs: ArcSwap<BTreeMap<u64, Arc<EpochHandle>>>,
    tiers: TierLimits,
    search_concurrency: usize,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(tiers: TierLimits) -> Self {
        Self::with_search_concurrency(tiers, 8)
    }

    /// `search_concurrency` bounds how many epochs within a single tier are
    /// probed at once (the `epoch_search_concurrency` CLI option).
    pub fn with_search_concurrency(tiers: TierLimits, search_concurrency: usize) -> Self {
        Self {
            epochs: ArcSwap::from_pointee(BTreeMap::new()),
            tiers,
            search_concurrency,
            cancel: CancellationToken::new(),
        }
    }

    /// Atomically replaces the epoch set. In-flight requests holding a
    /// previously loaded `Arc<EpochHandle>` keep using it until they finish;
    /// only new lookups see the swapped-in set.
    pub fn swap_epochs(&self, epochs: BTreeMap<u64, Arc<EpochHandle>>) {
        self.epochs.store(Arc::new(epochs));
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn handle_for_epoch(&self, epoch: u64) -> Result<Arc<EpochHandle>, EngineError> {
        self.epochs
            .load()
            .get(&epoch)
            .cloned()
            .ok_or(EngineError::Unavailable(epoch))
    }

    /// Descending epoch numbers currently loaded, most recent first — the
    /// order tiered signature search walks.
    fn epochs_newest_first(&self) -> Vec<Arc<EpochHandle>> {
        self.epochs.load().values().rev().cloned().collect()
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_block(&self, slot: u64) -> Result<Block, EngineError> {
        let handle = self.handle_for_epoch(epoch_for_slot(slot))?;
        handle.get_block(slot).await
    }

    pub fn get_blocktime(&self, slot: u64) -> Result<Option<i64>, EngineError> {
        let handle = self.handle_for_epoch(epoch_for_slot(slot))?;
        let slot_in_epoch = slot % SLOTS_PER_EPOCH;
        Ok(handle.get_blocktime(slot_in_epoch))
    }

    pub fn first_available_block(&self) -> Option<u64> {
        self.epochs.load().keys().next().map(|e| e * SLOTS_PER_EPOCH)
    }

    /// Gathers `addr`'s signature log across every loaded epoch that carries
    /// a gSFA index, newest epoch first, each epoch's own entries already
    /// newest-first, capped at `limit` total entries.
    pub fn get_signatures_for_address(
        &self,
        addr: &[u8],
        limit: usize,
    ) -> Vec<archive_index::gsfa::GsfaEntry> {
        let mut out = Vec::new();
        for handle in self.epochs_newest_first() {
            let Some(gsfa) = handle.gsfa() else { continue };
            if let Some(entries) = gsfa.get(addr) {
                out.extend(entries);
                if out.len() >= limit {
                    out.truncate(limit);
                    break;
                }
            }
        }
        out
    }

    /// Tiered concurrent search for the epoch holding `signature`: first the
    /// most recent `tier1` epochs, then the next `tier2`, then everything
    /// else. Each tier runs as one job group; the search stops at the first
    /// tier producing a hit.
    #[tracing::instrument(skip(self, signature))]
    pub async fn get_transaction(&self, signature: [u8; 64]) -> Result<Transaction, EngineError> {
        let all = self.epochs_newest_first();
        let (tier1, rest) = split_at(&all, self.tiers.tier1);
        let (tier2, tier3) = split_at(rest, self.tiers.tier2);

        for tier in [tier1, tier2, tier3] {
            if tier.is_empty() {
                continue;
            }
            match self.search_tier(tier, signature).await? {
                Some(tx) => return Ok(tx),
                None => continue,
            }
        }
        Err(EngineError::not_found(
            "signature",
            bs58::encode(signature).into_string(),
        ))
    }

    async fn search_tier(
        &self,
        tier: &[Arc<EpochHandle>],
        signature: [u8; 64],
    ) -> Result<Option<Transaction>, EngineError> {
        let jobs: Vec<_> = tier
            .iter()
            .cloned()
            .map(|handle| {
                move |token: CancellationToken| async move {
                    tokio::select! {
                        _ = token.cancelled() => Ok(None),
                        result = probe_epoch(handle, signature) => result,
                    }
                }
            })
            .collect();

        match job_group::run(&self.cancel, jobs, self.search_concurrency).await {
            JobOutcome::Hit(tx) => Ok(Some(tx)),
            JobOutcome::Miss => Ok(None),
            JobOutcome::AllFailed(errors) => Err(errors.into_iter().next().unwrap()),
        }
    }
}

async fn probe_epoch(
    handle: Arc<EpochHandle>,
    signature: [u8; 64],
) -> Result<Option<Transaction>, EngineError> {
    // The signature-exists filter (in-memory, zero false positives) gates
    // the more expensive signature_to_cid probe.
    match handle.find_cid_from_signature(&signature)? {
        None => Ok(None),
        Some(_) => handle.get_transaction(&signature).await.map(Some),
    }
}

fn split_at<T>(slice: &[T], at: usize) -> (&[T], &[T]) {
    if at >= slice.len() {
        (slice, &[])
    } else {
        slice.split_at(at)
    }
}
