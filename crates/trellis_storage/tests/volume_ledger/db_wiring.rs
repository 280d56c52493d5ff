#![forbid(unsafe_code)]

use trellis_contracts::common::TimestampMs;
use trellis_contracts::member::{MemberId, MemberRecord};
use trellis_contracts::package::PackageTier;
use trellis_contracts::session::SessionRunId;
use trellis_contracts::volume::{VolumeEventId, VolumeEventInput, VolumeSource};
use trellis_storage::{LedgerStore, StorageError, VolumeClaim};

fn member(id: &str) -> MemberId {
    MemberId::new(id).unwrap()
}

fn seed_member(s: &mut LedgerStore, id: &str) {
    s.insert_member_row(MemberRecord::v1(member(id), None, TimestampMs(10)).unwrap())
        .unwrap();
}

fn pv_input(id: &str, pv: u32, key: Option<&str>) -> VolumeEventInput {
    VolumeEventInput::v1(
        member(id),
        Some(PackageTier::Silver),
        pv,
        0,
        VolumeSource::Order,
        TimestampMs(20),
        key.map(ToString::to_string),
    )
    .unwrap()
}

#[test]
fn at_vol_db_01_member_fk_enforced() {
    let mut s = LedgerStore::new_in_memory();
    let err = s.append_volume_event(pv_input("mbr_ghost", 35, None));
    assert!(matches!(err, Err(StorageError::ForeignKeyViolation { .. })));
}

#[test]
fn at_vol_db_02_idempotency_dedupe_works() {
    let mut s = LedgerStore::new_in_memory();
    seed_member(&mut s, "mbr_a");
    let first = s.append_volume_event(pv_input("mbr_a", 35, Some("idem_1"))).unwrap();
    let second = s.append_volume_event(pv_input("mbr_a", 35, Some("idem_1"))).unwrap();
    assert_eq!(first, second);
    assert_eq!(s.volume_rows().len(), 1);
    // Totals projection is not double-counted on the retry either.
    assert_eq!(s.member_row(&member("mbr_a")).unwrap().pv_total, 35);
}

#[test]
fn at_vol_db_03_claim_markers_set_exactly_once() {
    let mut s = LedgerStore::new_in_memory();
    seed_member(&mut s, "mbr_a");
    s.insert_session_run_row(
        trellis_contracts::common::SettlementDate::v1(2025, 1, 1).unwrap(),
        trellis_contracts::common::WindowIndex::new(1).unwrap(),
        TimestampMs(15),
    )
    .unwrap();
    let ev = s.append_volume_event(pv_input("mbr_a", 35, None)).unwrap();

    s.claim_volume_events(&[ev], VolumeClaim::PairSession(SessionRunId(1)))
        .unwrap();
    let err = s.claim_volume_events(&[ev], VolumeClaim::PairSession(SessionRunId(1)));
    assert!(matches!(err, Err(StorageError::TransitionViolation { .. })));
    assert_eq!(
        s.volume_row(ev).unwrap().session_run_id,
        Some(SessionRunId(1))
    );
}

#[test]
fn at_vol_db_04_claim_is_validate_then_apply() {
    let mut s = LedgerStore::new_in_memory();
    seed_member(&mut s, "mbr_a");
    let ev = s.append_volume_event(pv_input("mbr_a", 35, None)).unwrap();
    // One good id plus one missing id: nothing may be stamped.
    let err = s.claim_volume_events(
        &[ev, VolumeEventId(999)],
        VolumeClaim::PairSession(SessionRunId(1)),
    );
    assert!(matches!(err, Err(StorageError::NotFound { .. })));
    assert!(s.volume_row(ev).unwrap().session_run_id.is_none());
}

#[test]
fn at_vol_db_05_append_only_enforced() {
    let mut s = LedgerStore::new_in_memory();
    seed_member(&mut s, "mbr_a");
    let ev = s.append_volume_event(pv_input("mbr_a", 35, None)).unwrap();
    assert!(matches!(
        s.attempt_overwrite_volume_event(ev),
        Err(StorageError::AppendOnlyViolation { .. })
    ));
}

#[test]
fn at_vol_db_06_projections_rebuild_from_ledger() {
    let mut s = LedgerStore::new_in_memory();
    seed_member(&mut s, "mbr_a");
    seed_member(&mut s, "mbr_b");
    s.append_volume_event(pv_input("mbr_a", 35, Some("k1"))).unwrap();
    s.append_volume_event(pv_input("mbr_a", 70, Some("k2"))).unwrap();
    s.append_volume_event(pv_input("mbr_b", 35, None)).unwrap();

    let totals_before: Vec<(u64, u64)> = s
        .member_rows()
        .map(|m| (m.pv_total, m.bv_total))
        .collect();
    s.rebuild_member_volume_totals_from_ledger();
    s.rebuild_volume_idempotency_index_from_ledger();
    let totals_after: Vec<(u64, u64)> = s
        .member_rows()
        .map(|m| (m.pv_total, m.bv_total))
        .collect();
    assert_eq!(totals_before, totals_after);

    // The rebuilt idempotency index still dedupes.
    let before = s.volume_rows().len();
    s.append_volume_event(pv_input("mbr_a", 35, Some("k1"))).unwrap();
    assert_eq!(s.volume_rows().len(), before);
}

#[test]
fn at_vol_db_07_sponsor_entry_fk_enforced() {
    let mut s = LedgerStore::new_in_memory();
    seed_member(&mut s, "mbr_a");
    let ev = s.append_volume_event(pv_input("mbr_a", 35, None)).unwrap();
    let err = s.append_sponsor_volume_entry(
        member("mbr_ghost"),
        member("mbr_a"),
        ev,
        1,
        35,
        TimestampMs(21),
    );
    assert!(matches!(err, Err(StorageError::ForeignKeyViolation { .. })));
}
