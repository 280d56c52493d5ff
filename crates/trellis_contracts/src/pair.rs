#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use crate::common::{ContractViolation, TimestampMs, Validate};
use crate::member::MemberId;
use crate::package::PackageTier;
use crate::session::SessionRunId;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PairId(pub u64);

/// RED is a transient audit label; pairs are inserted GREEN and move to
/// PAID in the same run. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PairState {
    Red,
    Green,
    Paid,
}

impl PairState {
    pub fn as_str(self) -> &'static str {
        match self {
            PairState::Red => "RED",
            PairState::Green => "GREEN",
            PairState::Paid => "PAID",
        }
    }
}

pub fn is_allowed_pair_transition(from: PairState, to: PairState) -> bool {
    matches!(
        (from, to),
        (PairState::Red, PairState::Green) | (PairState::Green, PairState::Paid)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairRecord {
    pub pair_id: PairId,
    pub node_member_id: MemberId,
    pub package: PackageTier,
    pub session_run_id: SessionRunId,
    pub left_member_id: MemberId,
    pub right_member_id: MemberId,
    pub state: PairState,
    pub amount_paid: Option<Decimal>,
    pub created_at: TimestampMs,
    pub paid_at: Option<TimestampMs>,
}

impl PairRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        pair_id: PairId,
        node_member_id: MemberId,
        package: PackageTier,
        session_run_id: SessionRunId,
        left_member_id: MemberId,
        right_member_id: MemberId,
        created_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            pair_id,
            node_member_id,
            package,
            session_run_id,
            left_member_id,
            right_member_id,
            state: PairState::Green,
            amount_paid: None,
            created_at,
            paid_at: None,
        };
        record.validate()?;
        Ok(record)
    }
}

impl Validate for PairRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.node_member_id.validate()?;
        self.left_member_id.validate()?;
        self.right_member_id.validate()?;
        if self.left_member_id == self.right_member_id {
            return Err(ContractViolation::InvalidValue {
                field: "pair_record.right_member_id",
                reason: "legs must be funded by distinct members",
            });
        }
        match self.state {
            PairState::Paid => {
                if self.amount_paid.is_none() || self.paid_at.is_none() {
                    return Err(ContractViolation::InvalidValue {
                        field: "pair_record.amount_paid",
                        reason: "PAID pair must carry amount_paid and paid_at",
                    });
                }
            }
            PairState::Red | PairState::Green => {
                if self.amount_paid.is_some() || self.paid_at.is_some() {
                    return Err(ContractViolation::InvalidValue {
                        field: "pair_record.amount_paid",
                        reason: "unpaid pair must not carry payout fields",
                    });
                }
            }
        }
        if let Some(amount) = self.amount_paid {
            if amount <= Decimal::ZERO {
                return Err(ContractViolation::InvalidValue {
                    field: "pair_record.amount_paid",
                    reason: "must be > 0",
                });
            }
        }
        self.created_at.validate()?;
        Ok(())
    }
}
