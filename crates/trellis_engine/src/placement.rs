#![forbid(unsafe_code)]

use trellis_contracts::common::{ContractViolation, TimestampMs, Validate};
use trellis_contracts::member::{MemberId, MemberRecord, TreeSide};
use trellis_storage::repo::NetworkDirectoryRepo;
use trellis_storage::{LedgerStore, StorageError};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMemberInput {
    pub member_id: MemberId,
    pub sponsor_id: Option<MemberId>,
    pub placement: Option<(MemberId, TreeSide)>,
    pub created_at: TimestampMs,
}

impl RegisterMemberInput {
    pub fn v1(
        member_id: MemberId,
        sponsor_id: Option<MemberId>,
        placement: Option<(MemberId, TreeSide)>,
        created_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            member_id,
            sponsor_id,
            placement,
            created_at,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for RegisterMemberInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.member_id.validate()?;
        if let Some(sponsor) = &self.sponsor_id {
            sponsor.validate()?;
        }
        if let Some((parent, _)) = &self.placement {
            parent.validate()?;
            if self.sponsor_id.is_none() {
                return Err(ContractViolation::InvalidValue {
                    field: "register_member_input.placement",
                    reason: "explicit placement requires a sponsor",
                });
            }
        }
        self.created_at.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementOutcome {
    pub member_id: MemberId,
    pub parent: Option<MemberId>,
    pub side: Option<TreeSide>,
}

/// Weaker leg under the sponsor by descendant count, ties toward LEFT.
pub fn weaker_side<R: NetworkDirectoryRepo>(repo: &R, sponsor_id: &MemberId) -> TreeSide {
    let record = match repo.member_row(sponsor_id) {
        Some(r) => r,
        None => return TreeSide::Left,
    };
    let left = record
        .left_child
        .as_ref()
        .map(|c| 1 + repo.descendant_count(c))
        .unwrap_or(0);
    let right = record
        .right_child
        .as_ref()
        .map(|c| 1 + repo.descendant_count(c))
        .unwrap_or(0);
    if left <= right {
        TreeSide::Left
    } else {
        TreeSide::Right
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlacementResolver;

impl PlacementResolver {
    /// Creates the directory row and resolves the binary slot. Explicit
    /// placement fails with `SlotOccupied` when the slot is taken; implicit
    /// placement walks first-fit down the sponsor's weaker leg. Credits no
    /// volume.
    pub fn register_member(
        &self,
        store: &mut LedgerStore,
        input: &RegisterMemberInput,
    ) -> Result<PlacementOutcome, EngineError> {
        input.validate()?;
        store.transaction(|s| self.register_member_inner(s, input))
    }

    fn register_member_inner(
        &self,
        s: &mut LedgerStore,
        input: &RegisterMemberInput,
    ) -> Result<PlacementOutcome, EngineError> {
        let sponsor_id = match &input.sponsor_id {
            None => {
                if s.member_count() != 0 {
                    return Err(EngineError::Validation(ContractViolation::InvalidValue {
                        field: "register_member_input.sponsor_id",
                        reason: "required once a root member exists",
                    }));
                }
                let record =
                    MemberRecord::v1(input.member_id.clone(), None, input.created_at)?;
                s.insert_member_row(record)?;
                return Ok(PlacementOutcome {
                    member_id: input.member_id.clone(),
                    parent: None,
                    side: None,
                });
            }
            Some(sponsor) => sponsor.clone(),
        };

        if s.member_row(&sponsor_id).is_none() {
            return Err(EngineError::NotFound {
                entity: "member",
                key: sponsor_id.as_str().to_string(),
            });
        }
        let record = MemberRecord::v1(
            input.member_id.clone(),
            Some(sponsor_id.clone()),
            input.created_at,
        )?;
        s.insert_member_row(record)?;

        let (parent_id, side) = match &input.placement {
            Some((parent, side)) => {
                if s.member_row(parent).is_none() {
                    return Err(EngineError::NotFound {
                        entity: "member",
                        key: parent.as_str().to_string(),
                    });
                }
                (parent.clone(), *side)
            }
            None => {
                let side = weaker_side(s, &sponsor_id);
                let mut cursor = sponsor_id.clone();
                loop {
                    let record = s.member_row(&cursor).ok_or(EngineError::NotFound {
                        entity: "member",
                        key: cursor.as_str().to_string(),
                    })?;
                    let next = match side {
                        TreeSide::Left => record.left_child.clone(),
                        TreeSide::Right => record.right_child.clone(),
                    };
                    match next {
                        Some(child) => cursor = child,
                        None => break,
                    }
                }
                (cursor, side)
            }
        };

        match s.set_placement(&input.member_id, &parent_id, side) {
            Ok(()) => Ok(PlacementOutcome {
                member_id: input.member_id.clone(),
                parent: Some(parent_id),
                side: Some(side),
            }),
            Err(StorageError::DuplicateKey {
                table: "members.placement_slot",
                ..
            }) => Err(EngineError::SlotOccupied {
                parent: parent_id,
                side,
            }),
            Err(other) => Err(other.into()),
        }
    }
}
