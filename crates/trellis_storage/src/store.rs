#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use trellis_contracts::common::{ContractViolation, SettlementDate, TimestampMs, WindowIndex};
use trellis_contracts::distribution::{
    DistributionKind, DistributionRunId, DistributionRunRecord, FundPool, FundPoolAllocationRecord,
};
use trellis_contracts::events::{OutboundEvent, OutboundEventRecord};
use trellis_contracts::member::{BinaryNodeRecord, MemberId, MemberRecord, Rank, TreeSide};
use trellis_contracts::package::PackageTier;
use trellis_contracts::pair::{is_allowed_pair_transition, PairId, PairRecord, PairState};
use trellis_contracts::pending::{PendingUnlockId, PendingUnlockRecord, PendingUnlockStatus};
use trellis_contracts::session::{SessionRunId, SessionRunRecord};
use trellis_contracts::volume::{
    SponsorVolumeEntry, VolumeEvent, VolumeEventId, VolumeEventInput,
};
use trellis_contracts::wallet::{
    is_allowed_transaction_transition, is_allowed_withdrawal_transition, AdminId, TransactionKind,
    TransactionStatus, WalletTransactionId, WalletTransactionRecord, WithdrawalRequestId,
    WithdrawalRequestRecord, WithdrawalStatus,
};
use trellis_contracts::Validate;

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    DuplicateKey {
        table: &'static str,
        key: String,
    },
    ForeignKeyViolation {
        table: &'static str,
        key: String,
    },
    AppendOnlyViolation {
        table: &'static str,
    },
    TransitionViolation {
        table: &'static str,
        key: String,
        from: &'static str,
        to: &'static str,
    },
    NotFound {
        table: &'static str,
        key: String,
    },
    ContractViolation(ContractViolation),
}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

/// Which consumption marker a claim stamps onto a volume event. Each marker
/// is set exactly once; claiming an already-claimed event is a transition
/// violation, never a silent overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeClaim {
    PairSession(SessionRunId),
    LevelIncome(DistributionRunId),
    Royalty(DistributionRunId),
    FundPool(DistributionRunId),
}

/// In-memory reference implementation of the transactional ledger store.
/// Tables are BTreeMaps and append-only Vec ledgers; `transaction` gives
/// all-or-nothing semantics by snapshotting the whole store value.
#[derive(Debug, Clone, Default)]
pub struct LedgerStore {
    members: BTreeMap<MemberId, MemberRecord>,
    binary_nodes: BTreeMap<(MemberId, PackageTier), BinaryNodeRecord>,

    volume_ledger: Vec<VolumeEvent>,
    next_volume_event_id: u64,
    // Write idempotency: (member_id, idempotency_key) -> deterministic no-op on retry.
    volume_idempotency_index: BTreeMap<(MemberId, String), VolumeEventId>,

    sponsor_volume_ledger: Vec<SponsorVolumeEntry>,
    next_sponsor_entry_id: u64,

    // Unique (date, window_index) is the exactly-once gate for window runs.
    session_runs: BTreeMap<(SettlementDate, WindowIndex), SessionRunRecord>,
    session_run_index: BTreeMap<SessionRunId, (SettlementDate, WindowIndex)>,
    next_session_run_id: u64,

    pairs: BTreeMap<PairId, PairRecord>,
    pair_session_index: BTreeMap<(MemberId, PackageTier, SessionRunId), Vec<PairId>>,
    next_pair_id: u64,

    pending_unlocks: BTreeMap<PendingUnlockId, PendingUnlockRecord>,
    // Dedupe: at most one unlock per (origin pair, target tier).
    pending_unlock_index: BTreeMap<(PairId, PackageTier), PendingUnlockId>,
    next_pending_unlock_id: u64,

    wallet_ledger: Vec<WalletTransactionRecord>,
    next_wallet_transaction_id: u64,

    withdrawal_requests: BTreeMap<WithdrawalRequestId, WithdrawalRequestRecord>,
    next_withdrawal_request_id: u64,

    distribution_runs: BTreeMap<DistributionRunId, DistributionRunRecord>,
    // Unique (kind, period_key) mirrors the session-window gate for
    // period-driven distributor batches.
    distribution_period_index: BTreeMap<(DistributionKind, String), DistributionRunId>,
    next_distribution_run_id: u64,

    fund_pool_allocations: BTreeMap<(FundPool, String), FundPoolAllocationRecord>,

    outbox: Vec<OutboundEventRecord>,
    next_outbound_event_id: u64,
}

impl LedgerStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    /// All-or-nothing unit of work. On `Err` the store is restored to its
    /// pre-transaction state; partial application never survives.
    pub fn transaction<T, E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        let snapshot = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                *self = snapshot;
                Err(err)
            }
        }
    }

    // ------------------------
    // Network directory (members + placement tree).
    // ------------------------

    pub fn insert_member_row(&mut self, record: MemberRecord) -> Result<(), StorageError> {
        record.validate()?;
        if record.placement_parent.is_some()
            || record.left_child.is_some()
            || record.right_child.is_some()
        {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "member_record.placement_parent",
                    reason: "fresh rows are placed via set_placement",
                },
            ));
        }
        if self.members.contains_key(&record.member_id) {
            return Err(StorageError::DuplicateKey {
                table: "members",
                key: record.member_id.as_str().to_string(),
            });
        }
        if let Some(sponsor) = &record.sponsor_id {
            if !self.members.contains_key(sponsor) {
                return Err(StorageError::ForeignKeyViolation {
                    table: "members.sponsor_id",
                    key: sponsor.as_str().to_string(),
                });
            }
        }
        self.members.insert(record.member_id.clone(), record);
        Ok(())
    }

    pub fn member_row(&self, member_id: &MemberId) -> Option<&MemberRecord> {
        self.members.get(member_id)
    }

    pub fn member_rows(&self) -> impl Iterator<Item = &MemberRecord> {
        self.members.values()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn set_member_rank(&mut self, member_id: &MemberId, rank: Rank) -> Result<(), StorageError> {
        let record = self.members.get_mut(member_id).ok_or(StorageError::NotFound {
            table: "members",
            key: member_id.as_str().to_string(),
        })?;
        record.rank = rank;
        Ok(())
    }

    /// Occupies `(parent, side)` with `child`. The slot and the child's own
    /// placement are both single-assignment.
    pub fn set_placement(
        &mut self,
        child_id: &MemberId,
        parent_id: &MemberId,
        side: TreeSide,
    ) -> Result<(), StorageError> {
        let child = self.members.get(child_id).ok_or(StorageError::ForeignKeyViolation {
            table: "members.placement_child",
            key: child_id.as_str().to_string(),
        })?;
        if child.placement_parent.is_some() {
            return Err(StorageError::DuplicateKey {
                table: "members.placement",
                key: child_id.as_str().to_string(),
            });
        }
        let parent = self.members.get(parent_id).ok_or(StorageError::ForeignKeyViolation {
            table: "members.placement_parent",
            key: parent_id.as_str().to_string(),
        })?;
        let slot = match side {
            TreeSide::Left => &parent.left_child,
            TreeSide::Right => &parent.right_child,
        };
        if slot.is_some() {
            return Err(StorageError::DuplicateKey {
                table: "members.placement_slot",
                key: format!("{}:{}", parent_id.as_str(), side.as_str()),
            });
        }
        // Cycle guard: the parent chain above `parent` must not pass
        // through the child being placed.
        let mut cursor = Some(parent_id.clone());
        while let Some(current) = cursor {
            if &current == child_id {
                return Err(StorageError::ContractViolation(
                    ContractViolation::InvalidValue {
                        field: "members.placement_parent",
                        reason: "placement would create a cycle",
                    },
                ));
            }
            cursor = self
                .members
                .get(&current)
                .and_then(|r| r.placement_parent.clone());
        }

        let parent = self
            .members
            .get_mut(parent_id)
            .expect("parent presence checked above");
        match side {
            TreeSide::Left => parent.left_child = Some(child_id.clone()),
            TreeSide::Right => parent.right_child = Some(child_id.clone()),
        }
        let child = self
            .members
            .get_mut(child_id)
            .expect("child presence checked above");
        child.placement_parent = Some(parent_id.clone());
        child.placement_side = Some(side);
        Ok(())
    }

    pub fn descendant_count(&self, member_id: &MemberId) -> u64 {
        let mut count = 0u64;
        let mut queue = vec![member_id.clone()];
        while let Some(current) = queue.pop() {
            if let Some(record) = self.members.get(&current) {
                for child in [&record.left_child, &record.right_child].into_iter().flatten() {
                    count += 1;
                    queue.push(child.clone());
                }
            }
        }
        count
    }

    /// Which leg of `node` the descendant hangs under, if any.
    pub fn leg_of(&self, node_id: &MemberId, member_id: &MemberId) -> Option<TreeSide> {
        let mut current = self.members.get(member_id)?;
        loop {
            let parent_id = current.placement_parent.as_ref()?;
            if parent_id == node_id {
                return current.placement_side;
            }
            current = self.members.get(parent_id)?;
        }
    }

    pub fn add_star_royalty_delta(
        &mut self,
        member_id: &MemberId,
        delta: Decimal,
    ) -> Result<(), StorageError> {
        let record = self.members.get_mut(member_id).ok_or(StorageError::NotFound {
            table: "members",
            key: member_id.as_str().to_string(),
        })?;
        let next = record.star_royalty_earned + delta;
        if next < Decimal::ZERO {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "member_record.star_royalty_earned",
                    reason: "compensating delta must not push below zero",
                },
            ));
        }
        record.star_royalty_earned = next;
        Ok(())
    }

    pub fn activate_package_row(
        &mut self,
        member_id: &MemberId,
        package: PackageTier,
        created_at: TimestampMs,
    ) -> Result<(), StorageError> {
        let record = self.members.get(member_id).ok_or(StorageError::ForeignKeyViolation {
            table: "binary_nodes.member_id",
            key: member_id.as_str().to_string(),
        })?;
        if record.active_packages.contains(&package) {
            return Err(StorageError::DuplicateKey {
                table: "binary_nodes",
                key: format!("{}:{}", member_id.as_str(), package.as_str()),
            });
        }
        let node = BinaryNodeRecord::v1(member_id.clone(), package, created_at)?;
        self.binary_nodes
            .insert((member_id.clone(), package), node);
        let record = self
            .members
            .get_mut(member_id)
            .expect("member presence checked above");
        record.active_packages.insert(package);
        Ok(())
    }

    pub fn binary_node_row(
        &self,
        member_id: &MemberId,
        package: PackageTier,
    ) -> Option<&BinaryNodeRecord> {
        self.binary_nodes.get(&(member_id.clone(), package))
    }

    /// Matching iterates these keys; BTreeMap order makes every run walk
    /// nodes in the same deterministic sequence.
    pub fn binary_node_keys(&self) -> Vec<(MemberId, PackageTier)> {
        self.binary_nodes.keys().cloned().collect()
    }

    /// Advances the node's session cursor. The cursor is monotone: a claim
    /// for an earlier session than the cursor is a violation.
    pub fn note_pair_paid(
        &mut self,
        member_id: &MemberId,
        package: PackageTier,
        session_run_id: SessionRunId,
    ) -> Result<(), StorageError> {
        let key = (member_id.clone(), package);
        let node = self.binary_nodes.get_mut(&key).ok_or(StorageError::NotFound {
            table: "binary_nodes",
            key: format!("{}:{}", member_id.as_str(), package.as_str()),
        })?;
        match node.session_cursor {
            Some(cursor) if cursor == session_run_id => {
                node.pairs_paid_this_session = node.pairs_paid_this_session.saturating_add(1);
            }
            Some(cursor) if cursor > session_run_id => {
                return Err(StorageError::TransitionViolation {
                    table: "binary_nodes.session_cursor",
                    key: format!("{}:{}", member_id.as_str(), package.as_str()),
                    from: "later session",
                    to: "earlier session",
                });
            }
            _ => {
                node.session_cursor = Some(session_run_id);
                node.pairs_paid_this_session = 1;
            }
        }
        Ok(())
    }

    // ------------------------
    // Volume ledger (append-only PV/BV credits + advisory sponsor entries).
    // ------------------------

    pub fn append_volume_event(
        &mut self,
        input: VolumeEventInput,
    ) -> Result<VolumeEventId, StorageError> {
        input.validate()?;
        if !self.members.contains_key(&input.member_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "volume_ledger.member_id",
                key: input.member_id.as_str().to_string(),
            });
        }
        if let Some(key) = &input.idempotency_key {
            let idx = (input.member_id.clone(), key.clone());
            if let Some(existing) = self.volume_idempotency_index.get(&idx) {
                // Deterministic no-op on retry.
                return Ok(*existing);
            }
        }

        self.next_volume_event_id = self.next_volume_event_id.saturating_add(1);
        let volume_event_id = VolumeEventId(self.next_volume_event_id);
        let row = VolumeEvent::from_input_v1(volume_event_id, input)?;
        if let Some(key) = &row.idempotency_key {
            self.volume_idempotency_index
                .insert((row.member_id.clone(), key.clone()), volume_event_id);
        }
        let member = self
            .members
            .get_mut(&row.member_id)
            .expect("member presence checked above");
        member.pv_total = member.pv_total.saturating_add(u64::from(row.pv));
        member.bv_total = member.bv_total.saturating_add(row.bv);
        self.volume_ledger.push(row);
        Ok(volume_event_id)
    }

    pub fn volume_rows(&self) -> &[VolumeEvent] {
        &self.volume_ledger
    }

    pub fn volume_row(&self, volume_event_id: VolumeEventId) -> Option<&VolumeEvent> {
        self.volume_ledger
            .iter()
            .find(|e| e.volume_event_id == volume_event_id)
    }

    /// Stamps a consumption marker on every listed event, validate-then-
    /// apply: if any event is missing or already claimed for that marker,
    /// nothing is stamped.
    pub fn claim_volume_events(
        &mut self,
        ids: &[VolumeEventId],
        claim: VolumeClaim,
    ) -> Result<(), StorageError> {
        for id in ids {
            let row = self.volume_row(*id).ok_or(StorageError::NotFound {
                table: "volume_ledger",
                key: format!("{}", id.0),
            })?;
            let already = match claim {
                VolumeClaim::PairSession(_) => row.session_run_id.is_some(),
                VolumeClaim::LevelIncome(_) => row.level_run_id.is_some(),
                VolumeClaim::Royalty(_) => row.royalty_run_id.is_some(),
                VolumeClaim::FundPool(_) => row.fund_run_id.is_some(),
            };
            if already {
                return Err(StorageError::TransitionViolation {
                    table: "volume_ledger",
                    key: format!("{}", id.0),
                    from: "UNCLAIMED",
                    to: "CLAIMED",
                });
            }
        }
        for row in self.volume_ledger.iter_mut() {
            if !ids.contains(&row.volume_event_id) {
                continue;
            }
            match claim {
                VolumeClaim::PairSession(s) => row.session_run_id = Some(s),
                VolumeClaim::LevelIncome(r) => row.level_run_id = Some(r),
                VolumeClaim::Royalty(r) => row.royalty_run_id = Some(r),
                VolumeClaim::FundPool(r) => row.fund_run_id = Some(r),
            }
        }
        Ok(())
    }

    pub fn attempt_overwrite_volume_event(
        &mut self,
        _volume_event_id: VolumeEventId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "volume_ledger",
        })
    }

    pub fn append_sponsor_volume_entry(
        &mut self,
        ancestor_id: MemberId,
        origin_member_id: MemberId,
        volume_event_id: VolumeEventId,
        level: u8,
        pv: u32,
        created_at: TimestampMs,
    ) -> Result<u64, StorageError> {
        if !self.members.contains_key(&ancestor_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "sponsor_volume_ledger.ancestor_id",
                key: ancestor_id.as_str().to_string(),
            });
        }
        self.next_sponsor_entry_id = self.next_sponsor_entry_id.saturating_add(1);
        let entry = SponsorVolumeEntry::v1(
            self.next_sponsor_entry_id,
            ancestor_id,
            origin_member_id,
            volume_event_id,
            level,
            pv,
            created_at,
        )?;
        let entry_id = entry.entry_id;
        self.sponsor_volume_ledger.push(entry);
        Ok(entry_id)
    }

    pub fn sponsor_volume_rows(&self) -> &[SponsorVolumeEntry] {
        &self.sponsor_volume_ledger
    }

    // ------------------------
    // Session runs (unique per (date, window_index)).
    // ------------------------

    pub fn insert_session_run_row(
        &mut self,
        date: SettlementDate,
        window_index: WindowIndex,
        started_at: TimestampMs,
    ) -> Result<SessionRunId, StorageError> {
        if self.session_runs.contains_key(&(date, window_index)) {
            return Err(StorageError::DuplicateKey {
                table: "session_runs",
                key: format!(
                    "{}-{:02}-{:02}:w{}",
                    date.year,
                    date.month,
                    date.day,
                    window_index.get()
                ),
            });
        }
        self.next_session_run_id = self.next_session_run_id.saturating_add(1);
        let session_run_id = SessionRunId(self.next_session_run_id);
        let record = SessionRunRecord::v1(session_run_id, date, window_index, started_at)?;
        self.session_runs.insert((date, window_index), record);
        self.session_run_index
            .insert(session_run_id, (date, window_index));
        Ok(session_run_id)
    }

    pub fn session_run_by_window(
        &self,
        date: SettlementDate,
        window_index: WindowIndex,
    ) -> Option<&SessionRunRecord> {
        self.session_runs.get(&(date, window_index))
    }

    pub fn session_run_row(&self, session_run_id: SessionRunId) -> Option<&SessionRunRecord> {
        let key = self.session_run_index.get(&session_run_id)?;
        self.session_runs.get(key)
    }

    pub fn finish_session_run(
        &mut self,
        session_run_id: SessionRunId,
        finished_at: TimestampMs,
    ) -> Result<(), StorageError> {
        let key = *self
            .session_run_index
            .get(&session_run_id)
            .ok_or(StorageError::NotFound {
                table: "session_runs",
                key: format!("{}", session_run_id.0),
            })?;
        let record = self
            .session_runs
            .get_mut(&key)
            .expect("index entry implies row");
        if record.finished_at.is_some() {
            return Err(StorageError::TransitionViolation {
                table: "session_runs",
                key: format!("{}", session_run_id.0),
                from: "COMPLETED",
                to: "COMPLETED",
            });
        }
        let mut updated = record.clone();
        updated.finished_at = Some(finished_at);
        updated.validate()?;
        *record = updated;
        Ok(())
    }

    // ------------------------
    // Pair ledger (guarded RED -> GREEN -> PAID transitions).
    // ------------------------

    pub fn insert_pair_row(
        &mut self,
        node_member_id: MemberId,
        package: PackageTier,
        session_run_id: SessionRunId,
        left_member_id: MemberId,
        right_member_id: MemberId,
        created_at: TimestampMs,
    ) -> Result<PairId, StorageError> {
        for member in [&node_member_id, &left_member_id, &right_member_id] {
            if !self.members.contains_key(member) {
                return Err(StorageError::ForeignKeyViolation {
                    table: "pairs.member_id",
                    key: member.as_str().to_string(),
                });
            }
        }
        if self.session_run_row(session_run_id).is_none() {
            return Err(StorageError::ForeignKeyViolation {
                table: "pairs.session_run_id",
                key: format!("{}", session_run_id.0),
            });
        }
        self.next_pair_id = self.next_pair_id.saturating_add(1);
        let pair_id = PairId(self.next_pair_id);
        let record = PairRecord::v1(
            pair_id,
            node_member_id.clone(),
            package,
            session_run_id,
            left_member_id,
            right_member_id,
            created_at,
        )?;
        self.pairs.insert(pair_id, record);
        self.pair_session_index
            .entry((node_member_id, package, session_run_id))
            .or_default()
            .push(pair_id);
        Ok(pair_id)
    }

    pub fn pair_row(&self, pair_id: PairId) -> Option<&PairRecord> {
        self.pairs.get(&pair_id)
    }

    pub fn pair_rows(&self) -> impl Iterator<Item = &PairRecord> {
        self.pairs.values()
    }

    pub fn pairs_in_session(
        &self,
        node_member_id: &MemberId,
        package: PackageTier,
        session_run_id: SessionRunId,
    ) -> usize {
        self.pair_session_index
            .get(&(node_member_id.clone(), package, session_run_id))
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn transition_pair(
        &mut self,
        pair_id: PairId,
        to: PairState,
        amount_paid: Option<Decimal>,
        paid_at: Option<TimestampMs>,
    ) -> Result<(), StorageError> {
        let record = self.pairs.get_mut(&pair_id).ok_or(StorageError::NotFound {
            table: "pairs",
            key: format!("{}", pair_id.0),
        })?;
        if !is_allowed_pair_transition(record.state, to) {
            return Err(StorageError::TransitionViolation {
                table: "pairs",
                key: format!("{}", pair_id.0),
                from: record.state.as_str(),
                to: to.as_str(),
            });
        }
        let mut updated = record.clone();
        updated.state = to;
        if to == PairState::Paid {
            updated.amount_paid = amount_paid;
            updated.paid_at = paid_at;
        }
        updated.validate()?;
        *record = updated;
        Ok(())
    }

    // ------------------------
    // Pending unlocks (idempotent per (origin pair, target tier)).
    // ------------------------

    pub fn insert_pending_unlock_row(
        &mut self,
        origin_pair_id: PairId,
        node_member_id: MemberId,
        target_package: PackageTier,
        created_at: TimestampMs,
    ) -> Result<PendingUnlockId, StorageError> {
        if !self.pairs.contains_key(&origin_pair_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "pending_unlocks.origin_pair_id",
                key: format!("{}", origin_pair_id.0),
            });
        }
        let idx = (origin_pair_id, target_package);
        if let Some(existing) = self.pending_unlock_index.get(&idx) {
            // Deterministic no-op on retry.
            return Ok(*existing);
        }
        self.next_pending_unlock_id = self.next_pending_unlock_id.saturating_add(1);
        let pending_unlock_id = PendingUnlockId(self.next_pending_unlock_id);
        let record = PendingUnlockRecord::v1(
            pending_unlock_id,
            origin_pair_id,
            node_member_id,
            target_package,
            created_at,
        )?;
        self.pending_unlocks.insert(pending_unlock_id, record);
        self.pending_unlock_index.insert(idx, pending_unlock_id);
        Ok(pending_unlock_id)
    }

    pub fn pending_unlock_row(&self, id: PendingUnlockId) -> Option<&PendingUnlockRecord> {
        self.pending_unlocks.get(&id)
    }

    pub fn pending_unlock_rows(&self) -> impl Iterator<Item = &PendingUnlockRecord> {
        self.pending_unlocks.values()
    }

    pub fn pending_unlock_row_count(&self) -> usize {
        self.pending_unlocks.len()
    }

    pub fn pending_unlocks_for(
        &self,
        node_member_id: &MemberId,
        target_package: PackageTier,
    ) -> Vec<PendingUnlockId> {
        self.pending_unlocks
            .values()
            .filter(|r| {
                r.status == PendingUnlockStatus::Pending
                    && &r.node_member_id == node_member_id
                    && r.target_package == target_package
            })
            .map(|r| r.pending_unlock_id)
            .collect()
    }

    pub fn release_pending_unlock(
        &mut self,
        id: PendingUnlockId,
        released_at: TimestampMs,
    ) -> Result<(), StorageError> {
        let record = self.pending_unlocks.get_mut(&id).ok_or(StorageError::NotFound {
            table: "pending_unlocks",
            key: format!("{}", id.0),
        })?;
        if record.status != PendingUnlockStatus::Pending {
            return Err(StorageError::TransitionViolation {
                table: "pending_unlocks",
                key: format!("{}", id.0),
                from: record.status.as_str(),
                to: PendingUnlockStatus::Released.as_str(),
            });
        }
        let mut updated = record.clone();
        updated.status = PendingUnlockStatus::Released;
        updated.released_at = Some(released_at);
        updated.validate()?;
        *record = updated;
        Ok(())
    }

    // ------------------------
    // Wallet ledger (append-only journal; balance is always derived).
    // ------------------------

    pub fn append_wallet_transaction(
        &mut self,
        member_id: MemberId,
        amount: Decimal,
        kind: TransactionKind,
        reference: impl Into<String>,
        status: TransactionStatus,
        created_at: TimestampMs,
    ) -> Result<WalletTransactionId, StorageError> {
        if !self.members.contains_key(&member_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "wallet_ledger.member_id",
                key: member_id.as_str().to_string(),
            });
        }
        self.next_wallet_transaction_id = self.next_wallet_transaction_id.saturating_add(1);
        let wallet_transaction_id = WalletTransactionId(self.next_wallet_transaction_id);
        let record = WalletTransactionRecord::v1(
            wallet_transaction_id,
            member_id,
            amount,
            kind,
            reference,
            status,
            created_at,
        )?;
        self.wallet_ledger.push(record);
        Ok(wallet_transaction_id)
    }

    pub fn wallet_rows(&self) -> &[WalletTransactionRecord] {
        &self.wallet_ledger
    }

    pub fn wallet_row(&self, id: WalletTransactionId) -> Option<&WalletTransactionRecord> {
        self.wallet_ledger
            .iter()
            .find(|r| r.wallet_transaction_id == id)
    }

    pub fn transition_wallet_transaction(
        &mut self,
        id: WalletTransactionId,
        to: TransactionStatus,
    ) -> Result<(), StorageError> {
        let record = self
            .wallet_ledger
            .iter_mut()
            .find(|r| r.wallet_transaction_id == id)
            .ok_or(StorageError::NotFound {
                table: "wallet_ledger",
                key: format!("{}", id.0),
            })?;
        if !is_allowed_transaction_transition(record.status, to) {
            return Err(StorageError::TransitionViolation {
                table: "wallet_ledger",
                key: format!("{}", id.0),
                from: record.status.as_str(),
                to: to.as_str(),
            });
        }
        record.status = to;
        Ok(())
    }

    pub fn attempt_overwrite_wallet_transaction(
        &mut self,
        _id: WalletTransactionId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "wallet_ledger",
        })
    }

    /// sum(CREDIT) - sum(DEBIT) over non-REVERSED rows. PENDING debits
    /// reserve funds, so they count against the balance.
    pub fn derived_balance(&self, member_id: &MemberId) -> Decimal {
        let mut balance = Decimal::ZERO;
        for row in &self.wallet_ledger {
            if &row.member_id != member_id || row.status == TransactionStatus::Reversed {
                continue;
            }
            match row.kind {
                TransactionKind::Credit => balance += row.amount,
                TransactionKind::Debit => balance -= row.amount,
            }
        }
        balance
    }

    // ------------------------
    // Withdrawal requests (compare-and-set forward machine).
    // ------------------------

    pub fn insert_withdrawal_request_row(
        &mut self,
        member_id: MemberId,
        amount: Decimal,
        created_at: TimestampMs,
    ) -> Result<WithdrawalRequestId, StorageError> {
        if !self.members.contains_key(&member_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "withdrawal_requests.member_id",
                key: member_id.as_str().to_string(),
            });
        }
        self.next_withdrawal_request_id = self.next_withdrawal_request_id.saturating_add(1);
        let withdrawal_request_id = WithdrawalRequestId(self.next_withdrawal_request_id);
        let record =
            WithdrawalRequestRecord::v1(withdrawal_request_id, member_id, amount, created_at)?;
        self.withdrawal_requests
            .insert(withdrawal_request_id, record);
        Ok(withdrawal_request_id)
    }

    pub fn withdrawal_row(&self, id: WithdrawalRequestId) -> Option<&WithdrawalRequestRecord> {
        self.withdrawal_requests.get(&id)
    }

    pub fn withdrawal_rows(&self) -> impl Iterator<Item = &WithdrawalRequestRecord> {
        self.withdrawal_requests.values()
    }

    /// Compare-and-set transition: fails if the row is not in
    /// `expected_from` (a concurrent processor won the race) or if the
    /// transition is not in the forward matrix.
    pub fn transition_withdrawal(
        &mut self,
        id: WithdrawalRequestId,
        expected_from: WithdrawalStatus,
        to: WithdrawalStatus,
        processed_by: Option<AdminId>,
        reserve_transaction_id: Option<WalletTransactionId>,
        processed_at: Option<TimestampMs>,
    ) -> Result<(), StorageError> {
        let record = self
            .withdrawal_requests
            .get_mut(&id)
            .ok_or(StorageError::NotFound {
                table: "withdrawal_requests",
                key: format!("{}", id.0),
            })?;
        if record.status != expected_from {
            return Err(StorageError::TransitionViolation {
                table: "withdrawal_requests",
                key: format!("{}", id.0),
                from: record.status.as_str(),
                to: to.as_str(),
            });
        }
        if !is_allowed_withdrawal_transition(record.status, to) {
            return Err(StorageError::TransitionViolation {
                table: "withdrawal_requests",
                key: format!("{}", id.0),
                from: record.status.as_str(),
                to: to.as_str(),
            });
        }
        let mut updated = record.clone();
        updated.status = to;
        if processed_by.is_some() {
            updated.processed_by = processed_by;
        }
        if reserve_transaction_id.is_some() {
            updated.reserve_transaction_id = reserve_transaction_id;
        }
        if processed_at.is_some() {
            updated.processed_at = processed_at;
        }
        updated.validate()?;
        *record = updated;
        Ok(())
    }

    // ------------------------
    // Distribution runs + fund pool allocations.
    // ------------------------

    pub fn insert_distribution_run_row(
        &mut self,
        kind: DistributionKind,
        period_key: Option<String>,
        started_at: TimestampMs,
    ) -> Result<DistributionRunId, StorageError> {
        if let Some(period) = &period_key {
            if self
                .distribution_period_index
                .contains_key(&(kind, period.clone()))
            {
                return Err(StorageError::DuplicateKey {
                    table: "distribution_runs",
                    key: format!("{}:{}", kind.as_str(), period),
                });
            }
        }
        self.next_distribution_run_id = self.next_distribution_run_id.saturating_add(1);
        let distribution_run_id = DistributionRunId(self.next_distribution_run_id);
        let record =
            DistributionRunRecord::v1(distribution_run_id, kind, period_key.clone(), started_at)?;
        self.distribution_runs.insert(distribution_run_id, record);
        if let Some(period) = period_key {
            self.distribution_period_index
                .insert((kind, period), distribution_run_id);
        }
        Ok(distribution_run_id)
    }

    pub fn distribution_run_row(
        &self,
        id: DistributionRunId,
    ) -> Option<&DistributionRunRecord> {
        self.distribution_runs.get(&id)
    }

    pub fn finish_distribution_run(
        &mut self,
        id: DistributionRunId,
        finished_at: TimestampMs,
    ) -> Result<(), StorageError> {
        let record = self.distribution_runs.get_mut(&id).ok_or(StorageError::NotFound {
            table: "distribution_runs",
            key: format!("{}", id.0),
        })?;
        if record.finished_at.is_some() {
            return Err(StorageError::TransitionViolation {
                table: "distribution_runs",
                key: format!("{}", id.0),
                from: "COMPLETED",
                to: "COMPLETED",
            });
        }
        let mut updated = record.clone();
        updated.finished_at = Some(finished_at);
        updated.validate()?;
        *record = updated;
        Ok(())
    }

    pub fn insert_fund_pool_allocation_row(
        &mut self,
        record: FundPoolAllocationRecord,
    ) -> Result<(), StorageError> {
        record.validate()?;
        let key = (record.pool, record.period_key.clone());
        if self.fund_pool_allocations.contains_key(&key) {
            return Err(StorageError::DuplicateKey {
                table: "fund_pool_allocations",
                key: format!("{}:{}", record.pool.as_str(), record.period_key),
            });
        }
        self.fund_pool_allocations.insert(key, record);
        Ok(())
    }

    pub fn fund_pool_allocation_row(
        &self,
        pool: FundPool,
        period_key: &str,
    ) -> Option<&FundPoolAllocationRecord> {
        self.fund_pool_allocations
            .get(&(pool, period_key.to_string()))
    }

    pub fn mark_fund_pool_distributed(
        &mut self,
        pool: FundPool,
        period_key: &str,
    ) -> Result<(), StorageError> {
        let record = self
            .fund_pool_allocations
            .get_mut(&(pool, period_key.to_string()))
            .ok_or(StorageError::NotFound {
                table: "fund_pool_allocations",
                key: format!("{}:{}", pool.as_str(), period_key),
            })?;
        if record.distributed {
            return Err(StorageError::TransitionViolation {
                table: "fund_pool_allocations",
                key: format!("{}:{}", pool.as_str(), period_key),
                from: "DISTRIBUTED",
                to: "DISTRIBUTED",
            });
        }
        record.distributed = true;
        Ok(())
    }

    // ------------------------
    // Outbound event outbox.
    // ------------------------

    pub fn append_outbound_event(
        &mut self,
        event: OutboundEvent,
        created_at: TimestampMs,
    ) -> Result<u64, StorageError> {
        self.next_outbound_event_id = self.next_outbound_event_id.saturating_add(1);
        let record = OutboundEventRecord::v1(self.next_outbound_event_id, created_at, event)?;
        let id = record.outbound_event_id;
        self.outbox.push(record);
        Ok(id)
    }

    pub fn outbound_rows(&self) -> &[OutboundEventRecord] {
        &self.outbox
    }

    // ------------------------
    // Projection rebuilds (audit: projections are pure ledger derivations).
    // ------------------------

    pub fn rebuild_member_volume_totals_from_ledger(&mut self) {
        for member in self.members.values_mut() {
            member.pv_total = 0;
            member.bv_total = 0;
        }
        let totals: Vec<(MemberId, u32, u64)> = self
            .volume_ledger
            .iter()
            .map(|e| (e.member_id.clone(), e.pv, e.bv))
            .collect();
        for (member_id, pv, bv) in totals {
            if let Some(member) = self.members.get_mut(&member_id) {
                member.pv_total = member.pv_total.saturating_add(u64::from(pv));
                member.bv_total = member.bv_total.saturating_add(bv);
            }
        }
    }

    pub fn rebuild_volume_idempotency_index_from_ledger(&mut self) {
        self.volume_idempotency_index.clear();
        for row in &self.volume_ledger {
            if let Some(key) = &row.idempotency_key {
                self.volume_idempotency_index
                    .insert((row.member_id.clone(), key.clone()), row.volume_event_id);
            }
        }
    }

    pub fn rebuild_node_counters_from_pairs(&mut self) {
        for ((member_id, package), node) in self.binary_nodes.iter_mut() {
            let mut latest: Option<SessionRunId> = None;
            for pair in self.pairs.values() {
                if &pair.node_member_id == member_id
                    && pair.package == *package
                    && pair.state == PairState::Paid
                {
                    latest = match latest {
                        Some(cur) if cur >= pair.session_run_id => Some(cur),
                        _ => Some(pair.session_run_id),
                    };
                }
            }
            node.session_cursor = latest;
            node.pairs_paid_this_session = match latest {
                Some(session) => self
                    .pairs
                    .values()
                    .filter(|p| {
                        p.node_member_id == *member_id
                            && p.package == *package
                            && p.state == PairState::Paid
                            && p.session_run_id == session
                    })
                    .count() as u16,
                None => 0,
            };
        }
    }

    pub fn rebuild_pair_session_index_from_rows(&mut self) {
        self.pair_session_index.clear();
        let mut ordered: Vec<&PairRecord> = self.pairs.values().collect();
        ordered.sort_by_key(|p| p.pair_id);
        let entries: Vec<((MemberId, PackageTier, SessionRunId), PairId)> = ordered
            .into_iter()
            .map(|p| {
                (
                    (p.node_member_id.clone(), p.package, p.session_run_id),
                    p.pair_id,
                )
            })
            .collect();
        for (key, pair_id) in entries {
            self.pair_session_index.entry(key).or_default().push(pair_id);
        }
    }
}
