#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use trellis_contracts::common::{SettlementDate, TimestampMs, WindowIndex};
use trellis_contracts::member::{MemberId, MemberRecord};
use trellis_contracts::package::PackageTier;
use trellis_contracts::pair::{PairId, PairState};
use trellis_contracts::session::SessionRunId;
use trellis_storage::{LedgerStore, StorageError};

fn member(id: &str) -> MemberId {
    MemberId::new(id).unwrap()
}

fn seed_members(s: &mut LedgerStore, ids: &[&str]) {
    for id in ids {
        s.insert_member_row(MemberRecord::v1(member(id), None, TimestampMs(10)).unwrap())
            .unwrap();
    }
}

fn seed_session(s: &mut LedgerStore, day: u8, window: u8) -> SessionRunId {
    s.insert_session_run_row(
        SettlementDate::v1(2025, 1, day).unwrap(),
        WindowIndex::new(window).unwrap(),
        TimestampMs(100),
    )
    .unwrap()
}

fn seed_pair(s: &mut LedgerStore, session: SessionRunId) -> PairId {
    s.insert_pair_row(
        member("mbr_root"),
        PackageTier::Silver,
        session,
        member("mbr_a"),
        member("mbr_b"),
        TimestampMs(110),
    )
    .unwrap()
}

#[test]
fn at_sess_db_01_window_key_is_unique() {
    let mut s = LedgerStore::new_in_memory();
    seed_session(&mut s, 1, 3);
    let err = s.insert_session_run_row(
        SettlementDate::v1(2025, 1, 1).unwrap(),
        WindowIndex::new(3).unwrap(),
        TimestampMs(101),
    );
    assert!(matches!(err, Err(StorageError::DuplicateKey { .. })));
    // A different window on the same date is fine.
    assert!(s
        .insert_session_run_row(
            SettlementDate::v1(2025, 1, 1).unwrap(),
            WindowIndex::new(4).unwrap(),
            TimestampMs(102),
        )
        .is_ok());
}

#[test]
fn at_sess_db_02_finish_is_single_shot() {
    let mut s = LedgerStore::new_in_memory();
    let session = seed_session(&mut s, 1, 1);
    s.finish_session_run(session, TimestampMs(200)).unwrap();
    assert!(s
        .session_run_row(session)
        .unwrap()
        .finished_at
        .is_some());
    let err = s.finish_session_run(session, TimestampMs(201));
    assert!(matches!(err, Err(StorageError::TransitionViolation { .. })));
}

#[test]
fn at_pair_db_01_pair_insert_checks_foreign_keys() {
    let mut s = LedgerStore::new_in_memory();
    seed_members(&mut s, &["mbr_root", "mbr_a", "mbr_b"]);
    let err = s.insert_pair_row(
        member("mbr_root"),
        PackageTier::Silver,
        SessionRunId(99),
        member("mbr_a"),
        member("mbr_b"),
        TimestampMs(110),
    );
    assert!(matches!(err, Err(StorageError::ForeignKeyViolation { .. })));

    let session = seed_session(&mut s, 1, 1);
    let err = s.insert_pair_row(
        member("mbr_root"),
        PackageTier::Silver,
        session,
        member("mbr_ghost"),
        member("mbr_b"),
        TimestampMs(110),
    );
    assert!(matches!(err, Err(StorageError::ForeignKeyViolation { .. })));
}

#[test]
fn at_pair_db_02_transitions_follow_the_matrix() {
    let mut s = LedgerStore::new_in_memory();
    seed_members(&mut s, &["mbr_root", "mbr_a", "mbr_b"]);
    let session = seed_session(&mut s, 1, 1);
    let pair = seed_pair(&mut s, session);

    // GREEN -> PAID is the only move from a fresh row.
    let err = s.transition_pair(pair, PairState::Green, None, None);
    assert!(matches!(err, Err(StorageError::TransitionViolation { .. })));
    let err = s.transition_pair(pair, PairState::Red, None, None);
    assert!(matches!(err, Err(StorageError::TransitionViolation { .. })));

    s.transition_pair(
        pair,
        PairState::Paid,
        Some(Decimal::new(10, 0)),
        Some(TimestampMs(120)),
    )
    .unwrap();
    assert_eq!(s.pair_row(pair).unwrap().state, PairState::Paid);

    // PAID is terminal.
    let err = s.transition_pair(
        pair,
        PairState::Paid,
        Some(Decimal::new(10, 0)),
        Some(TimestampMs(121)),
    );
    assert!(matches!(err, Err(StorageError::TransitionViolation { .. })));
}

#[test]
fn at_pair_db_03_session_index_counts_pairs() {
    let mut s = LedgerStore::new_in_memory();
    seed_members(&mut s, &["mbr_root", "mbr_a", "mbr_b"]);
    let session = seed_session(&mut s, 1, 1);
    assert_eq!(
        s.pairs_in_session(&member("mbr_root"), PackageTier::Silver, session),
        0
    );
    seed_pair(&mut s, session);
    seed_pair(&mut s, session);
    assert_eq!(
        s.pairs_in_session(&member("mbr_root"), PackageTier::Silver, session),
        2
    );
    assert_eq!(
        s.pairs_in_session(&member("mbr_root"), PackageTier::Gold, session),
        0
    );
}

#[test]
fn at_pair_db_04_node_cursor_is_monotone() {
    let mut s = LedgerStore::new_in_memory();
    seed_members(&mut s, &["mbr_root"]);
    s.activate_package_row(&member("mbr_root"), PackageTier::Silver, TimestampMs(20))
        .unwrap();
    let first = seed_session(&mut s, 1, 1);
    let second = seed_session(&mut s, 1, 2);

    s.note_pair_paid(&member("mbr_root"), PackageTier::Silver, first)
        .unwrap();
    s.note_pair_paid(&member("mbr_root"), PackageTier::Silver, first)
        .unwrap();
    let node = s
        .binary_node_row(&member("mbr_root"), PackageTier::Silver)
        .unwrap();
    assert_eq!(node.pairs_paid_this_session, 2);

    // A later session resets the counter; an earlier one is rejected.
    s.note_pair_paid(&member("mbr_root"), PackageTier::Silver, second)
        .unwrap();
    let node = s
        .binary_node_row(&member("mbr_root"), PackageTier::Silver)
        .unwrap();
    assert_eq!(node.session_cursor, Some(second));
    assert_eq!(node.pairs_paid_this_session, 1);
    let err = s.note_pair_paid(&member("mbr_root"), PackageTier::Silver, first);
    assert!(matches!(err, Err(StorageError::TransitionViolation { .. })));
}

#[test]
fn at_pair_db_05_node_counters_rebuild_from_pair_rows() {
    let mut s = LedgerStore::new_in_memory();
    seed_members(&mut s, &["mbr_root", "mbr_a", "mbr_b"]);
    s.activate_package_row(&member("mbr_root"), PackageTier::Silver, TimestampMs(20))
        .unwrap();
    let session = seed_session(&mut s, 1, 1);
    let pair = seed_pair(&mut s, session);
    s.transition_pair(
        pair,
        PairState::Paid,
        Some(Decimal::new(10, 0)),
        Some(TimestampMs(120)),
    )
    .unwrap();
    s.note_pair_paid(&member("mbr_root"), PackageTier::Silver, session)
        .unwrap();

    let before = s
        .binary_node_row(&member("mbr_root"), PackageTier::Silver)
        .unwrap()
        .clone();
    s.rebuild_node_counters_from_pairs();
    s.rebuild_pair_session_index_from_rows();
    let after = s
        .binary_node_row(&member("mbr_root"), PackageTier::Silver)
        .unwrap();
    assert_eq!(&before, after);
    assert_eq!(
        s.pairs_in_session(&member("mbr_root"), PackageTier::Silver, session),
        1
    );
}
