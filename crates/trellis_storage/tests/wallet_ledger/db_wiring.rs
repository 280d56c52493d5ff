#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use trellis_contracts::common::TimestampMs;
use trellis_contracts::member::{MemberId, MemberRecord};
use trellis_contracts::wallet::{
    AdminId, TransactionKind, TransactionStatus, WithdrawalStatus,
};
use trellis_storage::{LedgerStore, StorageError};

fn member(id: &str) -> MemberId {
    MemberId::new(id).unwrap()
}

fn seed_member(s: &mut LedgerStore, id: &str) {
    s.insert_member_row(MemberRecord::v1(member(id), None, TimestampMs(10)).unwrap())
        .unwrap();
}

fn credit(s: &mut LedgerStore, id: &str, amount: i64, status: TransactionStatus) {
    s.append_wallet_transaction(
        member(id),
        Decimal::new(amount, 0),
        TransactionKind::Credit,
        "adjustment:test",
        status,
        TimestampMs(20),
    )
    .unwrap();
}

#[test]
fn at_wal_db_01_balance_is_derived_over_non_reversed_rows() {
    let mut s = LedgerStore::new_in_memory();
    seed_member(&mut s, "mbr_a");
    credit(&mut s, "mbr_a", 100, TransactionStatus::Completed);
    credit(&mut s, "mbr_a", 50, TransactionStatus::Pending);
    let debit = s
        .append_wallet_transaction(
            member("mbr_a"),
            Decimal::new(30, 0),
            TransactionKind::Debit,
            "withdrawal:1",
            TransactionStatus::Pending,
            TimestampMs(21),
        )
        .unwrap();
    assert_eq!(s.derived_balance(&member("mbr_a")), Decimal::new(120, 0));

    s.transition_wallet_transaction(debit, TransactionStatus::Reversed)
        .unwrap();
    assert_eq!(s.derived_balance(&member("mbr_a")), Decimal::new(150, 0));
}

#[test]
fn at_wal_db_02_member_fk_enforced() {
    let mut s = LedgerStore::new_in_memory();
    let err = s.append_wallet_transaction(
        member("mbr_ghost"),
        Decimal::new(10, 0),
        TransactionKind::Credit,
        "pair:1",
        TransactionStatus::Completed,
        TimestampMs(20),
    );
    assert!(matches!(err, Err(StorageError::ForeignKeyViolation { .. })));
}

#[test]
fn at_wal_db_03_status_transitions_follow_the_matrix() {
    let mut s = LedgerStore::new_in_memory();
    seed_member(&mut s, "mbr_a");
    let tx = s
        .append_wallet_transaction(
            member("mbr_a"),
            Decimal::new(10, 0),
            TransactionKind::Debit,
            "withdrawal:1",
            TransactionStatus::Pending,
            TimestampMs(20),
        )
        .unwrap();
    s.transition_wallet_transaction(tx, TransactionStatus::Completed)
        .unwrap();
    let err = s.transition_wallet_transaction(tx, TransactionStatus::Pending);
    assert!(matches!(err, Err(StorageError::TransitionViolation { .. })));
    // Completed rows may still be reversed (compensating corrections).
    s.transition_wallet_transaction(tx, TransactionStatus::Reversed)
        .unwrap();
    let err = s.transition_wallet_transaction(tx, TransactionStatus::Completed);
    assert!(matches!(err, Err(StorageError::TransitionViolation { .. })));
}

#[test]
fn at_wal_db_04_append_only_enforced() {
    let mut s = LedgerStore::new_in_memory();
    seed_member(&mut s, "mbr_a");
    let tx = s
        .append_wallet_transaction(
            member("mbr_a"),
            Decimal::new(10, 0),
            TransactionKind::Credit,
            "pair:1",
            TransactionStatus::Completed,
            TimestampMs(20),
        )
        .unwrap();
    assert!(matches!(
        s.attempt_overwrite_wallet_transaction(tx),
        Err(StorageError::AppendOnlyViolation { .. })
    ));
}

#[test]
fn at_wal_db_05_withdrawal_cas_rejects_stale_expectations() {
    let mut s = LedgerStore::new_in_memory();
    seed_member(&mut s, "mbr_a");
    credit(&mut s, "mbr_a", 300, TransactionStatus::Completed);
    let request = s
        .insert_withdrawal_request_row(member("mbr_a"), Decimal::new(100, 0), TimestampMs(20))
        .unwrap();
    let reserve = s
        .append_wallet_transaction(
            member("mbr_a"),
            Decimal::new(100, 0),
            TransactionKind::Debit,
            "withdrawal:1",
            TransactionStatus::Pending,
            TimestampMs(21),
        )
        .unwrap();
    let admin = AdminId::new("adm_ops").unwrap();

    s.transition_withdrawal(
        request,
        WithdrawalStatus::Pending,
        WithdrawalStatus::Approved,
        Some(admin.clone()),
        Some(reserve),
        Some(TimestampMs(22)),
    )
    .unwrap();

    // Second processor still expects PENDING and must lose.
    let err = s.transition_withdrawal(
        request,
        WithdrawalStatus::Pending,
        WithdrawalStatus::Rejected,
        Some(admin),
        None,
        Some(TimestampMs(23)),
    );
    assert!(matches!(err, Err(StorageError::TransitionViolation { .. })));
    assert_eq!(
        s.withdrawal_row(request).unwrap().status,
        WithdrawalStatus::Approved
    );
}

#[test]
fn at_wal_db_06_failed_transaction_restores_the_journal() {
    let mut s = LedgerStore::new_in_memory();
    seed_member(&mut s, "mbr_a");
    credit(&mut s, "mbr_a", 100, TransactionStatus::Completed);
    let rows_before = s.wallet_rows().len();
    let balance_before = s.derived_balance(&member("mbr_a"));

    let err: Result<(), StorageError> = s.transaction(|tx| {
        tx.append_wallet_transaction(
            member("mbr_a"),
            Decimal::new(40, 0),
            TransactionKind::Debit,
            "withdrawal:9",
            TransactionStatus::Pending,
            TimestampMs(30),
        )?;
        // Unknown member aborts the unit of work after the first write.
        tx.append_wallet_transaction(
            member("mbr_ghost"),
            Decimal::new(40, 0),
            TransactionKind::Debit,
            "withdrawal:9",
            TransactionStatus::Pending,
            TimestampMs(30),
        )?;
        Ok(())
    });
    assert!(err.is_err());
    assert_eq!(s.wallet_rows().len(), rows_before);
    assert_eq!(s.derived_balance(&member("mbr_a")), balance_before);
}
