#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::common::{ContractViolation, Validate};

/// Fixed enumerated package registry. Tier order is the unlock cascade
/// order; `Silver` is the entry tier.
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
pub enum PackageTier {
    Silver,
    Gold,
    Ruby,
    Diamond,
}

impl PackageTier {
    pub fn ordered() -> &'static [PackageTier] {
        &[
            PackageTier::Silver,
            PackageTier::Gold,
            PackageTier::Ruby,
            PackageTier::Diamond,
        ]
    }

    pub fn entry() -> PackageTier {
        PackageTier::Silver
    }

    pub fn index(self) -> usize {
        match self {
            PackageTier::Silver => 0,
            PackageTier::Gold => 1,
            PackageTier::Ruby => 2,
            PackageTier::Diamond => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PackageTier::Silver => "SILVER",
            PackageTier::Gold => "GOLD",
            PackageTier::Ruby => "RUBY",
            PackageTier::Diamond => "DIAMOND",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub tier: PackageTier,
    pub price: Decimal,
    pub pv: u32,
    pub bv: u64,
    pub pair_income: Decimal,
    pub cap_per_session: u16,
}

impl PackageSpec {
    pub fn v1(
        tier: PackageTier,
        price: Decimal,
        pv: u32,
        bv: u64,
        pair_income: Decimal,
        cap_per_session: u16,
    ) -> Result<Self, ContractViolation> {
        let spec = Self {
            tier,
            price,
            pv,
            bv,
            pair_income,
            cap_per_session,
        };
        spec.validate()?;
        Ok(spec)
    }
}

impl Validate for PackageSpec {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.price <= Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "package_spec.price",
                reason: "must be > 0",
            });
        }
        if self.pv == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "package_spec.pv",
                reason: "must be > 0",
            });
        }
        if self.pair_income <= Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "package_spec.pair_income",
                reason: "must be > 0",
            });
        }
        if self.cap_per_session == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "package_spec.cap_per_session",
                reason: "must be >= 1",
            });
        }
        Ok(())
    }
}

/// Deployment package catalog. Must at least carry the entry tier; matching
/// and the unlock cascade only ever consult tiers present here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRegistry {
    specs: BTreeMap<PackageTier, PackageSpec>,
}

impl PackageRegistry {
    pub fn new(specs: Vec<PackageSpec>) -> Result<Self, ContractViolation> {
        let mut map = BTreeMap::new();
        for spec in specs {
            spec.validate()?;
            if map.insert(spec.tier, spec).is_some() {
                return Err(ContractViolation::InvalidValue {
                    field: "package_registry.specs",
                    reason: "duplicate tier",
                });
            }
        }
        if !map.contains_key(&PackageTier::entry()) {
            return Err(ContractViolation::InvalidValue {
                field: "package_registry.specs",
                reason: "entry tier must be present",
            });
        }
        Ok(Self { specs: map })
    }

    pub fn spec(&self, tier: PackageTier) -> Option<&PackageSpec> {
        self.specs.get(&tier)
    }

    pub fn tiers(&self) -> impl Iterator<Item = PackageTier> + '_ {
        self.specs.keys().copied()
    }

    pub fn tiers_above_entry(&self) -> impl Iterator<Item = PackageTier> + '_ {
        self.specs
            .keys()
            .copied()
            .filter(|t| t.index() > PackageTier::entry().index())
    }

    pub fn standard_v1() -> Self {
        Self::new(vec![
            PackageSpec::v1(
                PackageTier::Silver,
                Decimal::new(60, 0),
                35,
                50,
                Decimal::new(10, 0),
                5,
            )
            .expect("standard silver spec must validate"),
            PackageSpec::v1(
                PackageTier::Gold,
                Decimal::new(180, 0),
                105,
                150,
                Decimal::new(30, 0),
                5,
            )
            .expect("standard gold spec must validate"),
            PackageSpec::v1(
                PackageTier::Ruby,
                Decimal::new(480, 0),
                280,
                400,
                Decimal::new(80, 0),
                10,
            )
            .expect("standard ruby spec must validate"),
            PackageSpec::v1(
                PackageTier::Diamond,
                Decimal::new(960, 0),
                560,
                800,
                Decimal::new(160, 0),
                10,
            )
            .expect("standard diamond spec must validate"),
        ])
        .expect("standard registry must validate")
    }
}
