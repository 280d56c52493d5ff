#![forbid(unsafe_code)]

use trellis_contracts::common::TimestampMs;
use trellis_contracts::member::{MemberId, MemberRecord, TreeSide};
use trellis_contracts::package::PackageTier;
use trellis_storage::{LedgerStore, StorageError};

fn member(id: &str) -> MemberId {
    MemberId::new(id).unwrap()
}

fn insert_member(s: &mut LedgerStore, id: &str, sponsor: Option<&str>) {
    s.insert_member_row(MemberRecord::v1(member(id), sponsor.map(member), TimestampMs(10)).unwrap())
        .unwrap();
}

#[test]
fn at_dir_db_01_duplicate_member_rejected() {
    let mut s = LedgerStore::new_in_memory();
    insert_member(&mut s, "mbr_root", None);
    let err = s.insert_member_row(
        MemberRecord::v1(member("mbr_root"), None, TimestampMs(11)).unwrap(),
    );
    assert!(matches!(err, Err(StorageError::DuplicateKey { .. })));
}

#[test]
fn at_dir_db_02_sponsor_fk_enforced() {
    let mut s = LedgerStore::new_in_memory();
    let err = s.insert_member_row(
        MemberRecord::v1(member("mbr_a"), Some(member("mbr_ghost")), TimestampMs(10)).unwrap(),
    );
    assert!(matches!(err, Err(StorageError::ForeignKeyViolation { .. })));
}

#[test]
fn at_dir_db_03_placement_slot_single_occupancy() {
    let mut s = LedgerStore::new_in_memory();
    insert_member(&mut s, "mbr_root", None);
    insert_member(&mut s, "mbr_a", Some("mbr_root"));
    insert_member(&mut s, "mbr_b", Some("mbr_root"));

    s.set_placement(&member("mbr_a"), &member("mbr_root"), TreeSide::Left)
        .unwrap();
    let err = s.set_placement(&member("mbr_b"), &member("mbr_root"), TreeSide::Left);
    assert!(matches!(err, Err(StorageError::DuplicateKey { .. })));

    // A placed member cannot be re-placed either.
    let err = s.set_placement(&member("mbr_a"), &member("mbr_root"), TreeSide::Right);
    assert!(matches!(err, Err(StorageError::DuplicateKey { .. })));
}

#[test]
fn at_dir_db_04_descendant_count_and_leg_attribution() {
    let mut s = LedgerStore::new_in_memory();
    insert_member(&mut s, "mbr_root", None);
    for (id, parent, side) in [
        ("mbr_a", "mbr_root", TreeSide::Left),
        ("mbr_b", "mbr_root", TreeSide::Right),
        ("mbr_c", "mbr_a", TreeSide::Left),
    ] {
        insert_member(&mut s, id, Some("mbr_root"));
        s.set_placement(&member(id), &member(parent), side).unwrap();
    }

    assert_eq!(s.descendant_count(&member("mbr_root")), 3);
    assert_eq!(s.descendant_count(&member("mbr_a")), 1);
    assert_eq!(s.descendant_count(&member("mbr_b")), 0);

    assert_eq!(s.leg_of(&member("mbr_root"), &member("mbr_c")), Some(TreeSide::Left));
    assert_eq!(s.leg_of(&member("mbr_root"), &member("mbr_b")), Some(TreeSide::Right));
    assert_eq!(s.leg_of(&member("mbr_a"), &member("mbr_b")), None);
    // A node is not on its own leg.
    assert_eq!(s.leg_of(&member("mbr_root"), &member("mbr_root")), None);
}

#[test]
fn at_dir_db_05_activation_creates_node_once() {
    let mut s = LedgerStore::new_in_memory();
    insert_member(&mut s, "mbr_root", None);
    s.activate_package_row(&member("mbr_root"), PackageTier::Silver, TimestampMs(20))
        .unwrap();
    assert!(s
        .binary_node_row(&member("mbr_root"), PackageTier::Silver)
        .is_some());
    assert!(s
        .member_row(&member("mbr_root"))
        .unwrap()
        .active_packages
        .contains(&PackageTier::Silver));

    let err = s.activate_package_row(&member("mbr_root"), PackageTier::Silver, TimestampMs(21));
    assert!(matches!(err, Err(StorageError::DuplicateKey { .. })));
}

#[test]
fn at_dir_db_06_transaction_rolls_back_directory_writes() {
    let mut s = LedgerStore::new_in_memory();
    insert_member(&mut s, "mbr_root", None);

    let err: Result<(), StorageError> = s.transaction(|tx| {
        tx.insert_member_row(
            MemberRecord::v1(member("mbr_a"), Some(member("mbr_root")), TimestampMs(10)).unwrap(),
        )?;
        tx.activate_package_row(&member("mbr_a"), PackageTier::Silver, TimestampMs(20))?;
        // Second activation aborts the whole unit of work.
        tx.activate_package_row(&member("mbr_a"), PackageTier::Silver, TimestampMs(21))
    });
    assert!(err.is_err());
    assert!(s.member_row(&member("mbr_a")).is_none());
    assert!(s.binary_node_row(&member("mbr_a"), PackageTier::Silver).is_none());
}
