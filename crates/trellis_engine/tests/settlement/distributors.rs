#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use trellis_contracts::common::TimestampMs;
use trellis_contracts::config::CompPlanConfig;
use trellis_contracts::distribution::FundPool;
use trellis_contracts::member::{MemberId, Rank};
use trellis_contracts::package::PackageRegistry;
use trellis_contracts::volume::VolumeSource;
use trellis_contracts::wallet::AdminId;
use trellis_engine::distributors::{
    FundPoolDistributor, LevelIncomeDistributor, RoyaltyDistributor,
};
use trellis_engine::placement::{PlacementResolver, RegisterMemberInput};
use trellis_engine::volume::VolumeLedgerOps;
use trellis_engine::wallet::{wallet_statement, WithdrawalOps};
use trellis_engine::EngineError;
use trellis_storage::LedgerStore;

fn member(id: &str) -> MemberId {
    MemberId::new(id).unwrap()
}

fn seed_network(store: &mut LedgerStore) {
    let resolver = PlacementResolver;
    for (id, sponsor) in [
        ("mbr_root", None),
        ("mbr_a", Some("mbr_root")),
        ("mbr_b", Some("mbr_a")),
    ] {
        let input = RegisterMemberInput::v1(
            member(id),
            sponsor.map(member),
            None,
            TimestampMs(10),
        )
        .unwrap();
        resolver.register_member(store, &input).unwrap();
    }
}

/// One order feeds every distributor exactly once: level income walks the
/// chain immediately, royalty and the pools claim the same BV under their
/// own period markers, and the earned income funds a withdrawal.
#[test]
fn order_bv_flows_through_every_distributor() {
    let registry = PackageRegistry::standard_v1();
    let mut config = CompPlanConfig::standard_v1();
    config.min_withdrawal = Decimal::new(10, 0);
    let mut store = LedgerStore::new_in_memory();
    seed_network(&mut store);
    store.set_member_rank(&member("mbr_root"), Rank::FourStar).unwrap();

    let ops = VolumeLedgerOps {
        registry: &registry,
        config: &config,
    };
    ops.credit_bv(
        &mut store,
        &member("mbr_b"),
        2000,
        VolumeSource::Order,
        Some("order:1001".to_string()),
        TimestampMs(100),
    )
    .unwrap();

    // Level income: mbr_a at level 1 (5%), mbr_root at level 2 (2%).
    let level = LevelIncomeDistributor { config: &config }
        .run(&mut store, TimestampMs(200))
        .unwrap();
    assert_eq!(level.events_processed, 1);
    assert_eq!(store.derived_balance(&member("mbr_a")), Decimal::new(100, 0));
    assert_eq!(store.derived_balance(&member("mbr_root")), Decimal::new(40, 0));

    // Royalty over the same 2000 gross: root is FourStar (1+2+3+4 = 10%).
    let royalty = RoyaltyDistributor { config: &config }
        .run(&mut store, "2025-01", TimestampMs(300))
        .unwrap();
    let root_royalty = royalty
        .credited
        .iter()
        .find(|(m, _)| m == &member("mbr_root"))
        .map(|(_, amount)| *amount)
        .unwrap();
    assert_eq!(root_royalty, Decimal::new(200, 0));
    // Star portion tracked against the lifetime cap.
    assert_eq!(
        store.member_row(&member("mbr_root")).unwrap().star_royalty_earned,
        Decimal::new(20, 0)
    );

    // Fund pools: allocation carves the period once, distribution is its
    // own explicit step.
    let funds = FundPoolDistributor { config: &config };
    let allocation = funds
        .allocate_period(&mut store, "2025-01", TimestampMs(400))
        .unwrap();
    assert_eq!(allocation.total_bv, 2000);
    let car = funds
        .distribute_pool(&mut store, FundPool::Car, "2025-01", TimestampMs(401))
        .unwrap();
    assert_eq!(car.credited, vec![(member("mbr_root"), Decimal::new(40, 0))]);

    // Withdraw part of the earned income through the full workflow.
    let withdrawals = WithdrawalOps { config: &config };
    let admin = AdminId::new("adm_ops").unwrap();
    let balance = store.derived_balance(&member("mbr_root"));
    let request = withdrawals
        .request_withdrawal(&mut store, &member("mbr_root"), Decimal::new(100, 0), TimestampMs(500))
        .unwrap();
    withdrawals
        .approve_withdrawal(&mut store, request, &admin, TimestampMs(501))
        .unwrap();
    withdrawals
        .mark_withdrawal_paid(&mut store, request, &admin, TimestampMs(502))
        .unwrap();
    assert_eq!(
        store.derived_balance(&member("mbr_root")),
        balance - Decimal::new(100, 0)
    );
    let statement = wallet_statement(&store, &member("mbr_root"));
    assert_eq!(statement.pending_debits, Decimal::ZERO);
}

/// Re-running every distributor credits nothing twice: level income finds
/// no unclaimed events, period-driven runs hit their uniqueness gates.
#[test]
fn distributor_reruns_never_double_credit() {
    let registry = PackageRegistry::standard_v1();
    let config = CompPlanConfig::standard_v1();
    let mut store = LedgerStore::new_in_memory();
    seed_network(&mut store);

    let ops = VolumeLedgerOps {
        registry: &registry,
        config: &config,
    };
    ops.credit_bv(
        &mut store,
        &member("mbr_b"),
        1000,
        VolumeSource::Order,
        Some("order:1".to_string()),
        TimestampMs(100),
    )
    .unwrap();

    LevelIncomeDistributor { config: &config }
        .run(&mut store, TimestampMs(200))
        .unwrap();
    RoyaltyDistributor { config: &config }
        .run(&mut store, "2025-01", TimestampMs(300))
        .unwrap();
    FundPoolDistributor { config: &config }
        .allocate_period(&mut store, "2025-01", TimestampMs(400))
        .unwrap();
    let wallet_rows = store.wallet_rows().len();

    let level_rerun = LevelIncomeDistributor { config: &config }
        .run(&mut store, TimestampMs(500))
        .unwrap();
    assert!(level_rerun.credited.is_empty());
    let royalty_rerun =
        RoyaltyDistributor { config: &config }.run(&mut store, "2025-01", TimestampMs(501));
    assert!(matches!(
        royalty_rerun,
        Err(EngineError::DuplicatePeriod { .. })
    ));
    let alloc_rerun = FundPoolDistributor { config: &config }.allocate_period(
        &mut store,
        "2025-01",
        TimestampMs(502),
    );
    assert!(matches!(alloc_rerun, Err(EngineError::DuplicatePeriod { .. })));
    assert_eq!(store.wallet_rows().len(), wallet_rows);
}
