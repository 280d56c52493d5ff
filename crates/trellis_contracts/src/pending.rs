#![forbid(unsafe_code)]

use crate::common::{ContractViolation, TimestampMs, Validate};
use crate::member::MemberId;
use crate::package::PackageTier;
use crate::pair::PairId;

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
pub struct PendingUnlockId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PendingUnlockStatus {
    Pending,
    Released,
}

impl PendingUnlockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PendingUnlockStatus::Pending => "PENDING",
            PendingUnlockStatus::Released => "RELEASED",
        }
    }
}

/// Cross-tier entitlement marker seeded by an entry-tier PAID pair. A
/// discoverability record only: release never credits a wallet by itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUnlockRecord {
    pub pending_unlock_id: PendingUnlockId,
    pub origin_pair_id: PairId,
    pub node_member_id: MemberId,
    pub target_package: PackageTier,
    pub status: PendingUnlockStatus,
    pub created_at: TimestampMs,
    pub released_at: Option<TimestampMs>,
}

impl PendingUnlockRecord {
    pub fn v1(
        pending_unlock_id: PendingUnlockId,
        origin_pair_id: PairId,
        node_member_id: MemberId,
        target_package: PackageTier,
        created_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            pending_unlock_id,
            origin_pair_id,
            node_member_id,
            target_package,
            status: PendingUnlockStatus::Pending,
            created_at,
            released_at: None,
        };
        record.validate()?;
        Ok(record)
    }
}

impl Validate for PendingUnlockRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.node_member_id.validate()?;
        if self.target_package == PackageTier::entry() {
            return Err(ContractViolation::InvalidValue {
                field: "pending_unlock_record.target_package",
                reason: "must be above the entry tier",
            });
        }
        match self.status {
            PendingUnlockStatus::Pending => {
                if self.released_at.is_some() {
                    return Err(ContractViolation::InvalidValue {
                        field: "pending_unlock_record.released_at",
                        reason: "must be unset while PENDING",
                    });
                }
            }
            PendingUnlockStatus::Released => {
                if self.released_at.is_none() {
                    return Err(ContractViolation::InvalidValue {
                        field: "pending_unlock_record.released_at",
                        reason: "must be set when RELEASED",
                    });
                }
            }
        }
        self.created_at.validate()?;
        Ok(())
    }
}
