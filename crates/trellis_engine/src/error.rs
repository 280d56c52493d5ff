#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use trellis_contracts::common::{ContractViolation, ReasonCodeId};
use trellis_contracts::distribution::DistributionKind;
use trellis_contracts::member::{MemberId, TreeSide};
use trellis_contracts::package::PackageTier;
use trellis_contracts::session::SessionRunId;
use trellis_storage::StorageError;

pub mod reason_codes {
    use trellis_contracts::common::ReasonCodeId;

    // Engine failure-code namespace. Stable values for outbound consumers.
    pub const VALIDATION_FAILED: ReasonCodeId = ReasonCodeId(0x5452_0101);
    pub const INVALID_AMOUNT: ReasonCodeId = ReasonCodeId(0x5452_0102);
    pub const SLOT_OCCUPIED: ReasonCodeId = ReasonCodeId(0x5452_0103);
    pub const ALREADY_PROCESSED: ReasonCodeId = ReasonCodeId(0x5452_0104);
    pub const DUPLICATE_PERIOD: ReasonCodeId = ReasonCodeId(0x5452_0105);
    pub const INSUFFICIENT_BALANCE: ReasonCodeId = ReasonCodeId(0x5452_0106);
    pub const WITHDRAWALS_DISABLED: ReasonCodeId = ReasonCodeId(0x5452_0107);
    pub const BELOW_MINIMUM_WITHDRAWAL: ReasonCodeId = ReasonCodeId(0x5452_0108);
    pub const NOT_FOUND: ReasonCodeId = ReasonCodeId(0x5452_0109);
    pub const PACKAGE_INACTIVE: ReasonCodeId = ReasonCodeId(0x5452_010A);
    pub const STORAGE_REJECTED: ReasonCodeId = ReasonCodeId(0x5452_01F1);
}

/// Engine failure taxonomy. Every variant resolves to a stable reason code
/// plus a human-readable message; no operation partially commits.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Validation(ContractViolation),
    InvalidAmount {
        field: &'static str,
    },
    SlotOccupied {
        parent: MemberId,
        side: TreeSide,
    },
    AlreadyProcessed {
        session_run_id: SessionRunId,
    },
    DuplicatePeriod {
        kind: DistributionKind,
        period_key: String,
    },
    InsufficientBalance {
        member_id: MemberId,
        requested: Decimal,
        available: Decimal,
    },
    WithdrawalsDisabled,
    BelowMinimumWithdrawal {
        requested: Decimal,
        minimum: Decimal,
    },
    NotFound {
        entity: &'static str,
        key: String,
    },
    PackageInactive {
        member_id: MemberId,
        package: PackageTier,
    },
    Storage(StorageError),
}

impl EngineError {
    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            EngineError::Validation(_) => reason_codes::VALIDATION_FAILED,
            EngineError::InvalidAmount { .. } => reason_codes::INVALID_AMOUNT,
            EngineError::SlotOccupied { .. } => reason_codes::SLOT_OCCUPIED,
            EngineError::AlreadyProcessed { .. } => reason_codes::ALREADY_PROCESSED,
            EngineError::DuplicatePeriod { .. } => reason_codes::DUPLICATE_PERIOD,
            EngineError::InsufficientBalance { .. } => reason_codes::INSUFFICIENT_BALANCE,
            EngineError::WithdrawalsDisabled => reason_codes::WITHDRAWALS_DISABLED,
            EngineError::BelowMinimumWithdrawal { .. } => {
                reason_codes::BELOW_MINIMUM_WITHDRAWAL
            }
            EngineError::NotFound { .. } => reason_codes::NOT_FOUND,
            EngineError::PackageInactive { .. } => reason_codes::PACKAGE_INACTIVE,
            EngineError::Storage(_) => reason_codes::STORAGE_REJECTED,
        }
    }

    pub fn message(&self) -> String {
        match self {
            EngineError::Validation(ContractViolation::InvalidValue { field, reason }) => {
                format!("validation failed: {field}: {reason}")
            }
            EngineError::InvalidAmount { field } => {
                format!("amount must be positive: {field}")
            }
            EngineError::SlotOccupied { parent, side } => {
                format!(
                    "placement slot occupied: {}:{}",
                    parent.as_str(),
                    side.as_str()
                )
            }
            EngineError::AlreadyProcessed { session_run_id } => {
                format!("window already processed by session run {}", session_run_id.0)
            }
            EngineError::DuplicatePeriod { kind, period_key } => {
                format!("{} period already processed: {}", kind.as_str(), period_key)
            }
            EngineError::InsufficientBalance {
                member_id,
                requested,
                available,
            } => format!(
                "insufficient balance for {}: requested {requested}, available {available}",
                member_id.as_str()
            ),
            EngineError::WithdrawalsDisabled => "withdrawals are disabled".to_string(),
            EngineError::BelowMinimumWithdrawal { requested, minimum } => {
                format!("withdrawal {requested} is below the minimum {minimum}")
            }
            EngineError::NotFound { entity, key } => {
                format!("{entity} not found: {key}")
            }
            EngineError::PackageInactive { member_id, package } => {
                format!(
                    "package {} is not active for {}",
                    package.as_str(),
                    member_id.as_str()
                )
            }
            EngineError::Storage(err) => format!("storage rejected operation: {err:?}"),
        }
    }
}

impl From<ContractViolation> for EngineError {
    fn from(v: ContractViolation) -> Self {
        EngineError::Validation(v)
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ContractViolation(v) => EngineError::Validation(v),
            other => EngineError::Storage(other),
        }
    }
}
