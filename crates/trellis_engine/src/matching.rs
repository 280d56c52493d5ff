#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use trellis_contracts::common::TimestampMs;
use trellis_contracts::config::{CompPlanConfig, PairSplitPolicy};
use trellis_contracts::events::OutboundEvent;
use trellis_contracts::member::{MemberId, TreeSide};
use trellis_contracts::package::{PackageRegistry, PackageTier};
use trellis_contracts::pair::{PairId, PairState};
use trellis_contracts::pending::PendingUnlockId;
use trellis_contracts::session::SessionRunId;
use trellis_contracts::volume::VolumeEventId;
use trellis_contracts::wallet::{TransactionKind, TransactionStatus};
use trellis_storage::{LedgerStore, VolumeClaim};

use crate::cascade;
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionMatchOutcome {
    pub session_run_id: SessionRunId,
    pub pairs_formed: u32,
    pub volume_consumed: u64,
    pub amount_paid: Decimal,
    pub pair_ids: Vec<PairId>,
    pub unlocks_created: Vec<PendingUnlockId>,
    pub unlocks_released: Vec<PendingUnlockId>,
}

impl SessionMatchOutcome {
    fn empty(session_run_id: SessionRunId) -> Self {
        Self {
            session_run_id,
            pairs_formed: 0,
            volume_consumed: 0,
            amount_paid: Decimal::ZERO,
            pair_ids: Vec::new(),
            unlocks_created: Vec::new(),
            unlocks_released: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct NodeMatchResult {
    pairs_formed: u32,
    volume_consumed: u64,
    amount_paid: Decimal,
    pair_ids: Vec<PairId>,
    unlocks_created: Vec<PendingUnlockId>,
    unlocks_released: Vec<PendingUnlockId>,
}

/// Consumes unmatched PV per (node, package) under the session cap, forms
/// pairs, and pays them. Each node is one atomic unit of work: PV claim,
/// pair rows, wallet credits, cascade rows and outbox entries commit
/// together or not at all.
#[derive(Debug, Clone, Copy)]
pub struct PairMatchingEngine<'a> {
    pub registry: &'a PackageRegistry,
    pub config: &'a CompPlanConfig,
}

impl PairMatchingEngine<'_> {
    pub fn run_session(
        &self,
        store: &mut LedgerStore,
        session_run_id: SessionRunId,
        now: TimestampMs,
    ) -> Result<SessionMatchOutcome, EngineError> {
        let run = store
            .session_run_row(session_run_id)
            .ok_or(EngineError::NotFound {
                entity: "session_run",
                key: format!("{}", session_run_id.0),
            })?;
        if run.finished_at.is_some() {
            return Err(EngineError::AlreadyProcessed { session_run_id });
        }

        let mut outcome = SessionMatchOutcome::empty(session_run_id);
        for (node_member_id, package) in store.binary_node_keys() {
            let result = store.transaction(|s| {
                self.match_node(s, &node_member_id, package, session_run_id, now)
            })?;
            if let Some(result) = result {
                outcome.pairs_formed += result.pairs_formed;
                outcome.volume_consumed += result.volume_consumed;
                outcome.amount_paid += result.amount_paid;
                outcome.pair_ids.extend(result.pair_ids);
                outcome.unlocks_created.extend(result.unlocks_created);
                outcome.unlocks_released.extend(result.unlocks_released);
            }
        }
        Ok(outcome)
    }

    fn match_node(
        &self,
        s: &mut LedgerStore,
        node_member_id: &MemberId,
        package: PackageTier,
        session_run_id: SessionRunId,
        now: TimestampMs,
    ) -> Result<Option<NodeMatchResult>, EngineError> {
        // Tier not sold in this deployment: nothing to match.
        let Some(spec) = self.registry.spec(package) else {
            return Ok(None);
        };
        let pkg_pv = u64::from(spec.pv);
        let pair_income = spec.pair_income;
        let cap_per_session = spec.cap_per_session;

        // Re-entrant run guard: a resumed session skips nodes that already
        // formed pairs under this session run.
        if s.pairs_in_session(node_member_id, package, session_run_id) > 0 {
            return Ok(None);
        }
        let pairs_already = s
            .binary_node_row(node_member_id, package)
            .filter(|n| n.session_cursor == Some(session_run_id))
            .map(|n| n.pairs_paid_this_session)
            .unwrap_or(0);
        let cap_remaining = cap_per_session.saturating_sub(pairs_already);
        if cap_remaining == 0 {
            return Ok(None);
        }

        let (left_events, right_events) = self.unconsumed_leg_events(s, node_member_id, package);
        let left_pv: u64 = left_events.iter().map(|(_, pv, _)| u64::from(*pv)).sum();
        let right_pv: u64 = right_events.iter().map(|(_, pv, _)| u64::from(*pv)).sum();

        let possible_pairs = (left_pv / pkg_pv)
            .min(right_pv / pkg_pv)
            .min(u64::from(cap_remaining));
        if possible_pairs == 0 {
            return Ok(None);
        }
        let needed = possible_pairs * pkg_pv;

        let (left_ids, left_consumed, left_member) = take_fifo(&left_events, needed);
        let (right_ids, right_consumed, right_member) = take_fifo(&right_events, needed);
        let mut claimed = left_ids;
        claimed.extend(right_ids);
        s.claim_volume_events(&claimed, VolumeClaim::PairSession(session_run_id))?;

        let mut result = NodeMatchResult {
            volume_consumed: left_consumed + right_consumed,
            ..NodeMatchResult::default()
        };
        for _ in 0..possible_pairs {
            let pair_id = s.insert_pair_row(
                node_member_id.clone(),
                package,
                session_run_id,
                left_member.clone(),
                right_member.clone(),
                now,
            )?;
            self.pay_pair(s, pair_id, &left_member, &right_member, pair_income, now)?;
            s.transition_pair(pair_id, PairState::Paid, Some(pair_income), Some(now))?;
            s.note_pair_paid(node_member_id, package, session_run_id)?;
            s.append_outbound_event(
                OutboundEvent::PairMatched {
                    pair_id,
                    node_member_id: node_member_id.clone(),
                    package,
                    session_run_id,
                    left_member_id: left_member.clone(),
                    right_member_id: right_member.clone(),
                    amount_paid: pair_income,
                },
                now,
            )?;
            result.pairs_formed += 1;
            result.amount_paid += pair_income;
            result.pair_ids.push(pair_id);

            if package == PackageTier::entry() {
                let created = cascade::seed_pending_unlocks(
                    s,
                    self.registry,
                    pair_id,
                    node_member_id,
                    now,
                )?;
                result.unlocks_created.extend(created);
            } else {
                let released =
                    cascade::release_pending_unlocks(s, node_member_id, package, now)?;
                result.unlocks_released.extend(released);
            }
        }
        Ok(Some(result))
    }

    /// Unconsumed PV events of this package attributed to the node's legs,
    /// oldest first. A member's own events never count toward its legs.
    fn unconsumed_leg_events(
        &self,
        s: &LedgerStore,
        node_member_id: &MemberId,
        package: PackageTier,
    ) -> (
        Vec<(VolumeEventId, u32, MemberId)>,
        Vec<(VolumeEventId, u32, MemberId)>,
    ) {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for ev in s.volume_rows() {
            if ev.session_run_id.is_some() || ev.pv == 0 || ev.package != Some(package) {
                continue;
            }
            if &ev.member_id == node_member_id {
                continue;
            }
            match s.leg_of(node_member_id, &ev.member_id) {
                Some(TreeSide::Left) => {
                    left.push((ev.volume_event_id, ev.pv, ev.member_id.clone()))
                }
                Some(TreeSide::Right) => {
                    right.push((ev.volume_event_id, ev.pv, ev.member_id.clone()))
                }
                None => {}
            }
        }
        (left, right)
    }

    fn pay_pair(
        &self,
        s: &mut LedgerStore,
        pair_id: PairId,
        left_member: &MemberId,
        right_member: &MemberId,
        pair_income: Decimal,
        now: TimestampMs,
    ) -> Result<(), EngineError> {
        let reference = format!("pair:{}", pair_id.0);
        let payouts: Vec<(MemberId, Decimal)> = match self.config.split_policy {
            PairSplitPolicy::EvenSplit => {
                let half = pair_income / Decimal::from(2);
                vec![(left_member.clone(), half), (right_member.clone(), half)]
            }
            PairSplitPolicy::FullToLeft => vec![(left_member.clone(), pair_income)],
            PairSplitPolicy::FullToRight => vec![(right_member.clone(), pair_income)],
        };
        for (member_id, amount) in payouts {
            let wallet_transaction_id = s.append_wallet_transaction(
                member_id.clone(),
                amount,
                TransactionKind::Credit,
                reference.clone(),
                TransactionStatus::Completed,
                now,
            )?;
            s.append_outbound_event(
                OutboundEvent::WalletEntryRecorded {
                    wallet_transaction_id,
                    member_id,
                    amount,
                    kind: TransactionKind::Credit,
                    status: TransactionStatus::Completed,
                    reference: reference.clone(),
                },
                now,
            )?;
        }
        Ok(())
    }
}

/// Oldest-first prefix whose PV sum covers `needed`. The representative leg
/// member is the member of the oldest consumed event. Callers guarantee the
/// leg sum covers `needed`, so the prefix is never empty.
fn take_fifo(
    events: &[(VolumeEventId, u32, MemberId)],
    needed: u64,
) -> (Vec<VolumeEventId>, u64, MemberId) {
    let mut ids = Vec::new();
    let mut consumed = 0u64;
    for (id, pv, _) in events {
        if consumed >= needed {
            break;
        }
        ids.push(*id);
        consumed += u64::from(*pv);
    }
    let representative = events
        .first()
        .map(|(_, _, member)| member.clone())
        .expect("leg sum covers needed, so the leg holds at least one event");
    (ids, consumed, representative)
}
