#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use trellis_contracts::common::TimestampMs;
use trellis_contracts::distribution::{
    DistributionKind, FundPool, FundPoolAllocationRecord,
};
use trellis_contracts::events::OutboundEvent;
use trellis_contracts::member::MemberId;
use trellis_contracts::package::PackageTier;
use trellis_contracts::pending::PendingUnlockId;
use trellis_storage::{LedgerStore, StorageError};

fn member(id: &str) -> MemberId {
    MemberId::new(id).unwrap()
}

#[test]
fn at_distdb_01_period_key_is_unique_per_kind() {
    let mut s = LedgerStore::new_in_memory();
    s.insert_distribution_run_row(
        DistributionKind::Royalty,
        Some("2025-01".to_string()),
        TimestampMs(10),
    )
    .unwrap();
    let err = s.insert_distribution_run_row(
        DistributionKind::Royalty,
        Some("2025-01".to_string()),
        TimestampMs(11),
    );
    assert!(matches!(err, Err(StorageError::DuplicateKey { .. })));
    // The same period under another kind is a different gate.
    assert!(s
        .insert_distribution_run_row(
            DistributionKind::FundPool,
            Some("2025-01".to_string()),
            TimestampMs(12),
        )
        .is_ok());
    // Event-driven level income never carries a period key.
    assert!(s
        .insert_distribution_run_row(DistributionKind::LevelIncome, None, TimestampMs(13))
        .is_ok());
}

#[test]
fn at_distdb_02_finish_is_single_shot() {
    let mut s = LedgerStore::new_in_memory();
    let run = s
        .insert_distribution_run_row(DistributionKind::LevelIncome, None, TimestampMs(10))
        .unwrap();
    s.finish_distribution_run(run, TimestampMs(20)).unwrap();
    let err = s.finish_distribution_run(run, TimestampMs(21));
    assert!(matches!(err, Err(StorageError::TransitionViolation { .. })));
}

#[test]
fn at_distdb_03_fund_allocation_unique_and_distributed_once() {
    let mut s = LedgerStore::new_in_memory();
    s.insert_fund_pool_allocation_row(
        FundPoolAllocationRecord::v1(FundPool::Car, "2025-01", Decimal::new(20, 0), TimestampMs(10))
            .unwrap(),
    )
    .unwrap();
    let err = s.insert_fund_pool_allocation_row(
        FundPoolAllocationRecord::v1(FundPool::Car, "2025-01", Decimal::new(30, 0), TimestampMs(11))
            .unwrap(),
    );
    assert!(matches!(err, Err(StorageError::DuplicateKey { .. })));

    s.mark_fund_pool_distributed(FundPool::Car, "2025-01").unwrap();
    let err = s.mark_fund_pool_distributed(FundPool::Car, "2025-01");
    assert!(matches!(err, Err(StorageError::TransitionViolation { .. })));
    assert!(s
        .fund_pool_allocation_row(FundPool::Car, "2025-01")
        .unwrap()
        .distributed);
}

#[test]
fn at_distdb_04_outbox_rows_keep_insertion_order() {
    let mut s = LedgerStore::new_in_memory();
    for i in 1..=3u64 {
        s.append_outbound_event(
            OutboundEvent::PendingUnlockCreated {
                pending_unlock_id: PendingUnlockId(i),
                origin_pair_id: trellis_contracts::pair::PairId(1),
                node_member_id: member("mbr_root"),
                target_package: PackageTier::Gold,
            },
            TimestampMs(100 + i),
        )
        .unwrap();
    }
    let ids: Vec<u64> = s.outbound_rows().iter().map(|r| r.outbound_event_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn at_distdb_05_rollback_discards_outbox_rows() {
    let mut s = LedgerStore::new_in_memory();
    let err: Result<(), StorageError> = s.transaction(|tx| {
        tx.append_outbound_event(
            OutboundEvent::PendingUnlockReleased {
                pending_unlock_id: PendingUnlockId(1),
                node_member_id: member("mbr_root"),
                target_package: PackageTier::Gold,
            },
            TimestampMs(100),
        )?;
        Err(StorageError::AppendOnlyViolation { table: "outbox" })
    });
    assert!(err.is_err());
    assert!(s.outbound_rows().is_empty());
}
