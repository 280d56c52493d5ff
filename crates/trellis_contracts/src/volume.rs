#![forbid(unsafe_code)]

use crate::common::{validate_opt_id_token, ContractViolation, TimestampMs, Validate};
use crate::distribution::DistributionRunId;
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
pub struct VolumeEventId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VolumeSource {
    PackageActivation,
    Order,
    Adjustment,
}

impl VolumeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            VolumeSource::PackageActivation => "PACKAGE_ACTIVATION",
            VolumeSource::Order => "ORDER",
            VolumeSource::Adjustment => "ADJUSTMENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeEventInput {
    pub member_id: MemberId,
    pub package: Option<PackageTier>,
    pub pv: u32,
    pub bv: u64,
    pub source: VolumeSource,
    pub created_at: TimestampMs,
    pub idempotency_key: Option<String>,
}

impl VolumeEventInput {
    pub fn v1(
        member_id: MemberId,
        package: Option<PackageTier>,
        pv: u32,
        bv: u64,
        source: VolumeSource,
        created_at: TimestampMs,
        idempotency_key: Option<String>,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            member_id,
            package,
            pv,
            bv,
            source,
            created_at,
            idempotency_key,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for VolumeEventInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.member_id.validate()?;
        if self.pv == 0 && self.bv == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "volume_event_input.pv",
                reason: "pv and bv must not both be 0",
            });
        }
        if self.pv > 0 && self.package.is_none() {
            return Err(ContractViolation::InvalidValue {
                field: "volume_event_input.package",
                reason: "pv credit must name a package tier",
            });
        }
        self.created_at.validate()?;
        validate_opt_id_token(
            "volume_event_input.idempotency_key",
            &self.idempotency_key,
            128,
        )?;
        Ok(())
    }
}

/// Immutable volume credit. The consumption markers are each set exactly
/// once: `session_run_id` by the pair matching run that claims the PV,
/// `level_run_id` / `royalty_run_id` / `fund_run_id` by the distributor
/// batch that claims the BV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeEvent {
    pub volume_event_id: VolumeEventId,
    pub member_id: MemberId,
    pub package: Option<PackageTier>,
    pub pv: u32,
    pub bv: u64,
    pub source: VolumeSource,
    pub session_run_id: Option<SessionRunId>,
    pub level_run_id: Option<DistributionRunId>,
    pub royalty_run_id: Option<DistributionRunId>,
    pub fund_run_id: Option<DistributionRunId>,
    pub idempotency_key: Option<String>,
    pub created_at: TimestampMs,
}

impl VolumeEvent {
    pub fn from_input_v1(
        volume_event_id: VolumeEventId,
        input: VolumeEventInput,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        Ok(Self {
            volume_event_id,
            member_id: input.member_id,
            package: input.package,
            pv: input.pv,
            bv: input.bv,
            source: input.source,
            session_run_id: None,
            level_run_id: None,
            royalty_run_id: None,
            fund_run_id: None,
            idempotency_key: input.idempotency_key,
            created_at: input.created_at,
        })
    }
}

/// Advisory sponsor-chain visibility entry written alongside a PV credit.
/// Bookkeeping only: payouts never read this ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsorVolumeEntry {
    pub entry_id: u64,
    pub ancestor_id: MemberId,
    pub origin_member_id: MemberId,
    pub volume_event_id: VolumeEventId,
    pub level: u8,
    pub pv: u32,
    pub created_at: TimestampMs,
}

impl SponsorVolumeEntry {
    pub fn v1(
        entry_id: u64,
        ancestor_id: MemberId,
        origin_member_id: MemberId,
        volume_event_id: VolumeEventId,
        level: u8,
        pv: u32,
        created_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let entry = Self {
            entry_id,
            ancestor_id,
            origin_member_id,
            volume_event_id,
            level,
            pv,
            created_at,
        };
        entry.validate()?;
        Ok(entry)
    }
}

impl Validate for SponsorVolumeEntry {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.ancestor_id.validate()?;
        self.origin_member_id.validate()?;
        if self.level == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "sponsor_volume_entry.level",
                reason: "must be >= 1",
            });
        }
        if self.pv == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "sponsor_volume_entry.pv",
                reason: "must be > 0",
            });
        }
        self.created_at.validate()?;
        Ok(())
    }
}
