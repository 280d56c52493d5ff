#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use crate::common::{validate_id_token, validate_opt_id_token, ContractViolation, TimestampMs, Validate};

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
pub struct DistributionRunId(pub u64);

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
pub enum DistributionKind {
    LevelIncome,
    Royalty,
    FundPool,
}

impl DistributionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DistributionKind::LevelIncome => "LEVEL_INCOME",
            DistributionKind::Royalty => "ROYALTY",
            DistributionKind::FundPool => "FUND_POOL",
        }
    }
}

/// One distributor batch. Period-driven kinds (royalty, fund pool) carry a
/// period key with a store uniqueness constraint; level income is
/// event-driven and claims per-event markers instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionRunRecord {
    pub distribution_run_id: DistributionRunId,
    pub kind: DistributionKind,
    pub period_key: Option<String>,
    pub started_at: TimestampMs,
    pub finished_at: Option<TimestampMs>,
}

impl DistributionRunRecord {
    pub fn v1(
        distribution_run_id: DistributionRunId,
        kind: DistributionKind,
        period_key: Option<String>,
        started_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            distribution_run_id,
            kind,
            period_key,
            started_at,
            finished_at: None,
        };
        record.validate()?;
        Ok(record)
    }
}

impl Validate for DistributionRunRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_opt_id_token(
            "distribution_run_record.period_key",
            &self.period_key,
            64,
        )?;
        match self.kind {
            DistributionKind::Royalty | DistributionKind::FundPool => {
                if self.period_key.is_none() {
                    return Err(ContractViolation::InvalidValue {
                        field: "distribution_run_record.period_key",
                        reason: "period-driven kind requires a period key",
                    });
                }
            }
            DistributionKind::LevelIncome => {}
        }
        self.started_at.validate()?;
        if let Some(finished) = self.finished_at {
            finished.validate()?;
            if finished < self.started_at {
                return Err(ContractViolation::InvalidValue {
                    field: "distribution_run_record.finished_at",
                    reason: "must be >= started_at",
                });
            }
        }
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
pub enum FundPool {
    Car,
    House,
    Travel,
}

impl FundPool {
    pub fn as_str(self) -> &'static str {
        match self {
            FundPool::Car => "CAR",
            FundPool::House => "HOUSE",
            FundPool::Travel => "TRAVEL",
        }
    }
}

/// Period allocation of a named pool. Distribution is a separate explicit
/// step; `distributed` flips exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundPoolAllocationRecord {
    pub pool: FundPool,
    pub period_key: String,
    pub amount: Decimal,
    pub distributed: bool,
    pub created_at: TimestampMs,
}

impl FundPoolAllocationRecord {
    pub fn v1(
        pool: FundPool,
        period_key: impl Into<String>,
        amount: Decimal,
        created_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            pool,
            period_key: period_key.into(),
            amount,
            distributed: false,
            created_at,
        };
        record.validate()?;
        Ok(record)
    }
}

impl Validate for FundPoolAllocationRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id_token("fund_pool_allocation_record.period_key", &self.period_key, 64)?;
        if self.amount < Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "fund_pool_allocation_record.amount",
                reason: "must be >= 0",
            });
        }
        self.created_at.validate()?;
        Ok(())
    }
}
