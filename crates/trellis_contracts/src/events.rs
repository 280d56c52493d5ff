#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use crate::common::{ContractViolation, SettlementDate, TimestampMs, Validate, WindowIndex};
use crate::member::MemberId;
use crate::package::PackageTier;
use crate::pair::PairId;
use crate::pending::PendingUnlockId;
use crate::session::SessionRunId;
use crate::wallet::{
    TransactionKind, TransactionStatus, WalletTransactionId, WithdrawalRequestId, WithdrawalStatus,
};

/// Outbound envelope for the (out-of-scope) notification collaborator.
/// Rows are appended to the outbox in the same transaction as the state
/// change they describe and drained by the consumer.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum OutboundEvent {
    PairMatched {
        pair_id: PairId,
        node_member_id: MemberId,
        package: PackageTier,
        session_run_id: SessionRunId,
        left_member_id: MemberId,
        right_member_id: MemberId,
        amount_paid: Decimal,
    },
    PendingUnlockCreated {
        pending_unlock_id: PendingUnlockId,
        origin_pair_id: PairId,
        node_member_id: MemberId,
        target_package: PackageTier,
    },
    PendingUnlockReleased {
        pending_unlock_id: PendingUnlockId,
        node_member_id: MemberId,
        target_package: PackageTier,
    },
    WalletEntryRecorded {
        wallet_transaction_id: WalletTransactionId,
        member_id: MemberId,
        amount: Decimal,
        kind: TransactionKind,
        status: TransactionStatus,
        reference: String,
    },
    WithdrawalStatusChanged {
        withdrawal_request_id: WithdrawalRequestId,
        member_id: MemberId,
        amount: Decimal,
        status: WithdrawalStatus,
    },
    SessionSummary {
        session_run_id: SessionRunId,
        date: SettlementDate,
        window_index: WindowIndex,
        pairs_formed: u32,
        volume_consumed: u64,
        amount_paid: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutboundEventRecord {
    pub outbound_event_id: u64,
    pub created_at: TimestampMs,
    pub event: OutboundEvent,
}

impl OutboundEventRecord {
    pub fn v1(
        outbound_event_id: u64,
        created_at: TimestampMs,
        event: OutboundEvent,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            outbound_event_id,
            created_at,
            event,
        };
        record.validate()?;
        Ok(record)
    }
}

impl Validate for OutboundEventRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.created_at.validate()
    }
}
