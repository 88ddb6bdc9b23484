// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Parent-block prefetch: when a block is requested, its parent is resolved
//! and decoded eagerly into the object cache, since `getBlock`/`getEntry`
//! callers very often walk parent-to-child next.

use std::sync::Arc;

use crate::dispatcher::epoch_for_slot;
use crate::epoch::EpochHandle;
use crate::errors::EngineError;

/// Resolves `block_cid` for `slot` and returns the decoded block, having
/// first kicked off a best-effort prefetch of its parent block into the
/// object cache. Prefetch failures are swallowed: the eventual direct
/// `get_block` lookup on the parent slot is the source of truth, this is
/// purely a latency optimization.
pub async fn get_block_with_prefetch(
    handle: &Arc<EpochHandle>,
    epochs_by_number: impl Fn(u64) -> Option<Arc<EpochHandle>>,
    slot: u64,
) -> Result<archive_car::objects::Block, EngineError> {
    let block = handle.get_block(slot).await?;

    if block.parent_slot < block.slot {
        let parent_epoch_no = epoch_for_slot(block.parent_slot);
        if let Some(parent_epoch) = epochs_by_number(parent_epoch_no) {
            let parent_slot = block.parent_slot;
            tokio::spawn(async move {
                if let Err(e) = prefetch_parent(&parent_epoch, parent_slot).await {
                    tracing::debug!(error = %e, parent_slot, "parent prefetch skipped");
                }
            });
        }
    }

    Ok(block)
}

async fn prefetch_parent(epoch: &EpochHandle, parent_slot: u64) -> Result<(), EngineError> {
    let cid = epoch.find_cid_from_slot(parent_slot)?;
    epoch.resolve_cid(cid).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_slot_before_block_slot_is_a_precondition() {
        // parent_slot >= slot (e.g. the genesis block, or a malformed
        // archive) must never trigger a prefetch of the block itself.
        let parent_slot = 10u64;
        let slot = 10u64;
        assert!(!(parent_slot < slot));
    }
}
