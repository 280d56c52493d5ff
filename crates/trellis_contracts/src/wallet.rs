#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use crate::common::{validate_id_token, ContractViolation, TimestampMs, Validate};
use crate::member::MemberId;

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
pub struct WalletTransactionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TransactionKind {
    Credit,
    Debit,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Credit => "CREDIT",
            TransactionKind::Debit => "DEBIT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Reversed => "REVERSED",
        }
    }
}

pub fn is_allowed_transaction_transition(
    from: TransactionStatus,
    to: TransactionStatus,
) -> bool {
    matches!(
        (from, to),
        (TransactionStatus::Pending, TransactionStatus::Completed)
            | (TransactionStatus::Pending, TransactionStatus::Reversed)
            | (TransactionStatus::Completed, TransactionStatus::Reversed)
    )
}

/// Append-only journal row. Balances are derived from these rows, never
/// stored; corrections are REVERSED flips plus compensating entries.
/// Zero amounts are permitted for audit-only rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletTransactionRecord {
    pub wallet_transaction_id: WalletTransactionId,
    pub member_id: MemberId,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub reference: String,
    pub status: TransactionStatus,
    pub created_at: TimestampMs,
}

impl WalletTransactionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        wallet_transaction_id: WalletTransactionId,
        member_id: MemberId,
        amount: Decimal,
        kind: TransactionKind,
        reference: impl Into<String>,
        status: TransactionStatus,
        created_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            wallet_transaction_id,
            member_id,
            amount,
            kind,
            reference: reference.into(),
            status,
            created_at,
        };
        record.validate()?;
        Ok(record)
    }
}

impl Validate for WalletTransactionRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.member_id.validate()?;
        if self.amount < Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "wallet_transaction_record.amount",
                reason: "must be >= 0 (direction is carried by kind)",
            });
        }
        validate_id_token("wallet_transaction_record.reference", &self.reference, 128)?;
        self.created_at.validate()?;
        Ok(())
    }
}

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
pub struct WithdrawalRequestId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl WithdrawalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "PENDING",
            WithdrawalStatus::Approved => "APPROVED",
            WithdrawalStatus::Rejected => "REJECTED",
            WithdrawalStatus::Paid => "PAID",
        }
    }
}

/// Strict forward machine. PENDING -> PAID is the forced-completion path.
pub fn is_allowed_withdrawal_transition(from: WithdrawalStatus, to: WithdrawalStatus) -> bool {
    matches!(
        (from, to),
        (WithdrawalStatus::Pending, WithdrawalStatus::Approved)
            | (WithdrawalStatus::Pending, WithdrawalStatus::Rejected)
            | (WithdrawalStatus::Pending, WithdrawalStatus::Paid)
            | (WithdrawalStatus::Approved, WithdrawalStatus::Paid)
    )
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct AdminId(String);

impl AdminId {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = v.into();
        validate_id_token("admin_id", &v, 64)?;
        Ok(Self(v))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequestRecord {
    pub withdrawal_request_id: WithdrawalRequestId,
    pub member_id: MemberId,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    pub reserve_transaction_id: Option<WalletTransactionId>,
    pub processed_by: Option<AdminId>,
    pub created_at: TimestampMs,
    pub processed_at: Option<TimestampMs>,
}

impl WithdrawalRequestRecord {
    pub fn v1(
        withdrawal_request_id: WithdrawalRequestId,
        member_id: MemberId,
        amount: Decimal,
        created_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            withdrawal_request_id,
            member_id,
            amount,
            status: WithdrawalStatus::Pending,
            reserve_transaction_id: None,
            processed_by: None,
            created_at,
            processed_at: None,
        };
        record.validate()?;
        Ok(record)
    }
}

impl Validate for WithdrawalRequestRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.member_id.validate()?;
        if self.amount <= Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "withdrawal_request_record.amount",
                reason: "must be > 0",
            });
        }
        match self.status {
            WithdrawalStatus::Pending => {
                if self.processed_by.is_some()
                    || self.processed_at.is_some()
                    || self.reserve_transaction_id.is_some()
                {
                    return Err(ContractViolation::InvalidValue {
                        field: "withdrawal_request_record.processed_by",
                        reason: "PENDING request must carry no processing fields",
                    });
                }
            }
            WithdrawalStatus::Rejected => {
                if self.processed_by.is_none() || self.reserve_transaction_id.is_some() {
                    return Err(ContractViolation::InvalidValue {
                        field: "withdrawal_request_record.reserve_transaction_id",
                        reason: "REJECTED request must carry admin but no reservation",
                    });
                }
            }
            WithdrawalStatus::Approved | WithdrawalStatus::Paid => {
                if self.processed_by.is_none() || self.reserve_transaction_id.is_none() {
                    return Err(ContractViolation::InvalidValue {
                        field: "withdrawal_request_record.reserve_transaction_id",
                        reason: "APPROVED/PAID request must carry admin and reservation",
                    });
                }
            }
        }
        if self.processed_at.is_some() != self.processed_by.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "withdrawal_request_record.processed_at",
                reason: "must be set together with processed_by",
            });
        }
        self.created_at.validate()?;
        Ok(())
    }
}
