#![forbid(unsafe_code)]

use trellis_contracts::common::TimestampMs;
use trellis_contracts::events::OutboundEvent;
use trellis_contracts::member::MemberId;
use trellis_contracts::package::{PackageRegistry, PackageTier};
use trellis_contracts::pair::PairId;
use trellis_contracts::pending::{PendingUnlockId, PendingUnlockStatus};
use trellis_storage::LedgerStore;

use crate::error::EngineError;

/// Seeds one pending unlock per registry tier above entry, referencing the
/// origin pair. Idempotent per (origin pair, target tier): retries return
/// the existing rows without new outbox traffic.
pub(crate) fn seed_pending_unlocks(
    s: &mut LedgerStore,
    registry: &PackageRegistry,
    origin_pair_id: PairId,
    node_member_id: &MemberId,
    now: TimestampMs,
) -> Result<Vec<PendingUnlockId>, EngineError> {
    let mut created = Vec::new();
    for target in registry.tiers_above_entry() {
        let before = s.pending_unlock_row_count();
        let pending_unlock_id =
            s.insert_pending_unlock_row(origin_pair_id, node_member_id.clone(), target, now)?;
        if s.pending_unlock_row_count() > before {
            s.append_outbound_event(
                OutboundEvent::PendingUnlockCreated {
                    pending_unlock_id,
                    origin_pair_id,
                    node_member_id: node_member_id.clone(),
                    target_package: target,
                },
                now,
            )?;
            created.push(pending_unlock_id);
        }
    }
    Ok(created)
}

/// Releases every pending unlock for (node, target tier). Called when a
/// pair at the target tier reaches PAID; the normal matching flow is the
/// payout, the unlock row is only flipped for discoverability.
pub(crate) fn release_pending_unlocks(
    s: &mut LedgerStore,
    node_member_id: &MemberId,
    target_package: PackageTier,
    now: TimestampMs,
) -> Result<Vec<PendingUnlockId>, EngineError> {
    let mut released = Vec::new();
    for pending_unlock_id in s.pending_unlocks_for(node_member_id, target_package) {
        s.release_pending_unlock(pending_unlock_id, now)?;
        s.append_outbound_event(
            OutboundEvent::PendingUnlockReleased {
                pending_unlock_id,
                node_member_id: node_member_id.clone(),
                target_package,
            },
            now,
        )?;
        released.push(pending_unlock_id);
    }
    Ok(released)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PendingUnlockCascade;

impl PendingUnlockCascade {
    /// Admin command: flips a PENDING row to RELEASED without crediting.
    pub fn manual_release(
        &self,
        store: &mut LedgerStore,
        pending_unlock_id: PendingUnlockId,
        now: TimestampMs,
    ) -> Result<(), EngineError> {
        let row = store
            .pending_unlock_row(pending_unlock_id)
            .ok_or(EngineError::NotFound {
                entity: "pending_unlock",
                key: format!("{}", pending_unlock_id.0),
            })?;
        if row.status != PendingUnlockStatus::Pending {
            return Err(EngineError::Storage(
                trellis_storage::StorageError::TransitionViolation {
                    table: "pending_unlocks",
                    key: format!("{}", pending_unlock_id.0),
                    from: row.status.as_str(),
                    to: PendingUnlockStatus::Released.as_str(),
                },
            ));
        }
        let node_member_id = row.node_member_id.clone();
        let target_package = row.target_package;
        store.transaction(|s| {
            s.release_pending_unlock(pending_unlock_id, now)?;
            s.append_outbound_event(
                OutboundEvent::PendingUnlockReleased {
                    pending_unlock_id,
                    node_member_id,
                    target_package,
                },
                now,
            )?;
            Ok::<(), EngineError>(())
        })
    }
}
