#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use crate::common::{validate_id_token, ContractViolation, TimestampMs, Validate};
use crate::package::PackageTier;
use crate::session::SessionRunId;

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
pub struct MemberId(String);

impl MemberId {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = v.into();
        validate_id_token("member_id", &v, 64)?;
        Ok(Self(v))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for MemberId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id_token("member_id", &self.0, 64)
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
pub enum TreeSide {
    Left,
    Right,
}

impl TreeSide {
    pub fn as_str(self) -> &'static str {
        match self {
            TreeSide::Left => "LEFT",
            TreeSide::Right => "RIGHT",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            TreeSide::Left => TreeSide::Right,
            TreeSide::Right => TreeSide::Left,
        }
    }
}

/// Ordered rank ladder. `Star` is the capped introductory royalty tier.
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
pub enum Rank {
    Star,
    TwoStar,
    ThreeStar,
    FourStar,
    FiveStar,
}

impl Rank {
    pub fn ordered() -> &'static [Rank] {
        &[
            Rank::Star,
            Rank::TwoStar,
            Rank::ThreeStar,
            Rank::FourStar,
            Rank::FiveStar,
        ]
    }

    pub fn index(self) -> usize {
        match self {
            Rank::Star => 0,
            Rank::TwoStar => 1,
            Rank::ThreeStar => 2,
            Rank::FourStar => 3,
            Rank::FiveStar => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Star => "STAR",
            Rank::TwoStar => "TWO_STAR",
            Rank::ThreeStar => "THREE_STAR",
            Rank::FourStar => "FOUR_STAR",
            Rank::FiveStar => "FIVE_STAR",
        }
    }
}

/// Network directory row. Placement links form the single structural binary
/// tree; per-package matching state lives on `BinaryNodeRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRecord {
    pub member_id: MemberId,
    pub sponsor_id: Option<MemberId>,
    pub placement_parent: Option<MemberId>,
    pub placement_side: Option<TreeSide>,
    pub left_child: Option<MemberId>,
    pub right_child: Option<MemberId>,
    pub rank: Rank,
    pub active_packages: BTreeSet<PackageTier>,
    pub pv_total: u64,
    pub bv_total: u64,
    pub star_royalty_earned: Decimal,
    pub created_at: TimestampMs,
}

impl MemberRecord {
    pub fn v1(
        member_id: MemberId,
        sponsor_id: Option<MemberId>,
        created_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            member_id,
            sponsor_id,
            placement_parent: None,
            placement_side: None,
            left_child: None,
            right_child: None,
            rank: Rank::Star,
            active_packages: BTreeSet::new(),
            pv_total: 0,
            bv_total: 0,
            star_royalty_earned: Decimal::ZERO,
            created_at,
        };
        record.validate()?;
        Ok(record)
    }
}

impl Validate for MemberRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.member_id.validate()?;
        if let Some(sponsor) = &self.sponsor_id {
            sponsor.validate()?;
            if sponsor == &self.member_id {
                return Err(ContractViolation::InvalidValue {
                    field: "member_record.sponsor_id",
                    reason: "must not self-sponsor",
                });
            }
        }
        if self.placement_parent.is_some() != self.placement_side.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "member_record.placement_side",
                reason: "must be set together with placement_parent",
            });
        }
        if let Some(parent) = &self.placement_parent {
            parent.validate()?;
            if parent == &self.member_id {
                return Err(ContractViolation::InvalidValue {
                    field: "member_record.placement_parent",
                    reason: "must not self-parent",
                });
            }
        }
        if let (Some(l), Some(r)) = (&self.left_child, &self.right_child) {
            if l == r {
                return Err(ContractViolation::InvalidValue {
                    field: "member_record.right_child",
                    reason: "children must be distinct members",
                });
            }
        }
        if self.star_royalty_earned < Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "member_record.star_royalty_earned",
                reason: "must be >= 0",
            });
        }
        self.created_at.validate()?;
        Ok(())
    }
}

/// Per-(member, package) matching state. The session cursor is monotone:
/// it only ever advances to a later session run, resetting the pair counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryNodeRecord {
    pub member_id: MemberId,
    pub package: PackageTier,
    pub session_cursor: Option<SessionRunId>,
    pub pairs_paid_this_session: u16,
    pub created_at: TimestampMs,
}

impl BinaryNodeRecord {
    pub fn v1(
        member_id: MemberId,
        package: PackageTier,
        created_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            member_id,
            package,
            session_cursor: None,
            pairs_paid_this_session: 0,
            created_at,
        };
        record.validate()?;
        Ok(record)
    }
}

impl Validate for BinaryNodeRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.member_id.validate()?;
        if self.session_cursor.is_none() && self.pairs_paid_this_session != 0 {
            return Err(ContractViolation::InvalidValue {
                field: "binary_node_record.pairs_paid_this_session",
                reason: "must be 0 before the first session cursor is set",
            });
        }
        self.created_at.validate()?;
        Ok(())
    }
}
