#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::common::{ContractViolation, Validate};
use crate::distribution::FundPool;
use crate::member::Rank;

/// Who receives pair income. The source plan was ambiguous here, so the
/// policy is an explicit deployment choice, never an engine assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSplitPolicy {
    EvenSplit,
    FullToLeft,
    FullToRight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundPoolSpec {
    pub pool: FundPool,
    pub percent: Decimal,
    pub qualifying_rank: Rank,
}

impl FundPoolSpec {
    pub fn v1(
        pool: FundPool,
        percent: Decimal,
        qualifying_rank: Rank,
    ) -> Result<Self, ContractViolation> {
        let spec = Self {
            pool,
            percent,
            qualifying_rank,
        };
        spec.validate()?;
        Ok(spec)
    }
}

impl Validate for FundPoolSpec {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.percent <= Decimal::ZERO || self.percent > Decimal::new(100, 0) {
            return Err(ContractViolation::InvalidValue {
                field: "fund_pool_spec.percent",
                reason: "must be within (0, 100]",
            });
        }
        Ok(())
    }
}

/// Deployment compensation-plan constants. Everything percentage- or
/// threshold-shaped lives here; the engine reads, never hard-codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompPlanConfig {
    pub split_policy: PairSplitPolicy,
    pub level_depth: u8,
    pub level_percents: Vec<Decimal>,
    pub royalty_percents: BTreeMap<Rank, Decimal>,
    pub star_royalty_ceiling: Decimal,
    pub fund_pools: Vec<FundPoolSpec>,
    pub min_withdrawal: Decimal,
    pub withdrawals_enabled: bool,
    pub sponsor_entry_depth: u8,
}

impl CompPlanConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        split_policy: PairSplitPolicy,
        level_percents: Vec<Decimal>,
        royalty_percents: BTreeMap<Rank, Decimal>,
        star_royalty_ceiling: Decimal,
        fund_pools: Vec<FundPoolSpec>,
        min_withdrawal: Decimal,
        withdrawals_enabled: bool,
        sponsor_entry_depth: u8,
    ) -> Result<Self, ContractViolation> {
        let config = Self {
            split_policy,
            level_depth: level_percents.len() as u8,
            level_percents,
            royalty_percents,
            star_royalty_ceiling,
            fund_pools,
            min_withdrawal,
            withdrawals_enabled,
            sponsor_entry_depth,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn standard_v1() -> Self {
        let level_percents = vec![
            Decimal::new(5, 0),
            Decimal::new(2, 0),
            Decimal::new(1, 0),
            Decimal::new(1, 0),
            Decimal::new(1, 0),
            Decimal::new(50, 2),
            Decimal::new(50, 2),
            Decimal::new(50, 2),
            Decimal::new(25, 2),
            Decimal::new(25, 2),
        ];
        let mut royalty_percents = BTreeMap::new();
        royalty_percents.insert(Rank::Star, Decimal::new(1, 0));
        royalty_percents.insert(Rank::TwoStar, Decimal::new(2, 0));
        royalty_percents.insert(Rank::ThreeStar, Decimal::new(3, 0));
        royalty_percents.insert(Rank::FourStar, Decimal::new(4, 0));
        royalty_percents.insert(Rank::FiveStar, Decimal::new(5, 0));
        let fund_pools = vec![
            FundPoolSpec {
                pool: FundPool::Travel,
                percent: Decimal::new(1, 0),
                qualifying_rank: Rank::ThreeStar,
            },
            FundPoolSpec {
                pool: FundPool::Car,
                percent: Decimal::new(2, 0),
                qualifying_rank: Rank::FourStar,
            },
            FundPoolSpec {
                pool: FundPool::House,
                percent: Decimal::new(3, 0),
                qualifying_rank: Rank::FiveStar,
            },
        ];
        Self::v1(
            PairSplitPolicy::EvenSplit,
            level_percents,
            royalty_percents,
            Decimal::new(500, 0),
            fund_pools,
            Decimal::new(50, 0),
            true,
            10,
        )
        .expect("standard comp plan must validate")
    }

    pub fn level_percent(&self, level: u8) -> Option<Decimal> {
        if level == 0 {
            return None;
        }
        self.level_percents.get((level - 1) as usize).copied()
    }

    pub fn royalty_percent(&self, rank: Rank) -> Decimal {
        self.royalty_percents.get(&rank).copied().unwrap_or(Decimal::ZERO)
    }

    /// Sum of per-rank percentages from the lowest rank up to `rank`.
    pub fn cumulative_royalty_percent(&self, rank: Rank) -> Decimal {
        Rank::ordered()
            .iter()
            .filter(|r| r.index() <= rank.index())
            .map(|r| self.royalty_percent(*r))
            .sum()
    }

    pub fn star_royalty_percent(&self) -> Decimal {
        self.royalty_percent(Rank::Star)
    }

    pub fn fund_pool_spec(&self, pool: FundPool) -> Option<&FundPoolSpec> {
        self.fund_pools.iter().find(|s| s.pool == pool)
    }
}

impl Validate for CompPlanConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.level_depth == 0 || self.level_depth > 20 {
            return Err(ContractViolation::InvalidValue {
                field: "comp_plan_config.level_depth",
                reason: "must be within 1..=20",
            });
        }
        if self.level_percents.len() != self.level_depth as usize {
            return Err(ContractViolation::InvalidValue {
                field: "comp_plan_config.level_percents",
                reason: "must carry one entry per level",
            });
        }
        for p in &self.level_percents {
            if *p < Decimal::ZERO || *p > Decimal::new(100, 0) {
                return Err(ContractViolation::InvalidValue {
                    field: "comp_plan_config.level_percents",
                    reason: "each entry must be within [0, 100]",
                });
            }
        }
        for rank in Rank::ordered() {
            if !self.royalty_percents.contains_key(rank) {
                return Err(ContractViolation::InvalidValue {
                    field: "comp_plan_config.royalty_percents",
                    reason: "must cover every rank",
                });
            }
        }
        for p in self.royalty_percents.values() {
            if *p < Decimal::ZERO || *p > Decimal::new(100, 0) {
                return Err(ContractViolation::InvalidValue {
                    field: "comp_plan_config.royalty_percents",
                    reason: "each entry must be within [0, 100]",
                });
            }
        }
        if self.star_royalty_ceiling <= Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "comp_plan_config.star_royalty_ceiling",
                reason: "must be > 0",
            });
        }
        let mut seen_pools = Vec::new();
        for spec in &self.fund_pools {
            spec.validate()?;
            if seen_pools.contains(&spec.pool) {
                return Err(ContractViolation::InvalidValue {
                    field: "comp_plan_config.fund_pools",
                    reason: "duplicate pool",
                });
            }
            seen_pools.push(spec.pool);
        }
        if self.min_withdrawal < Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "comp_plan_config.min_withdrawal",
                reason: "must be >= 0",
            });
        }
        if self.sponsor_entry_depth == 0 || self.sponsor_entry_depth > 20 {
            return Err(ContractViolation::InvalidValue {
                field: "comp_plan_config.sponsor_entry_depth",
                reason: "must be within 1..=20",
            });
        }
        Ok(())
    }
}
