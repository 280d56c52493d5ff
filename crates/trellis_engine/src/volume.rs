#![forbid(unsafe_code)]

use trellis_contracts::common::TimestampMs;
use trellis_contracts::config::CompPlanConfig;
use trellis_contracts::member::MemberId;
use trellis_contracts::package::{PackageRegistry, PackageTier};
use trellis_contracts::volume::{VolumeEventId, VolumeEventInput, VolumeSource};
use trellis_storage::hash::content_hash_hex;
use trellis_storage::LedgerStore;

use crate::error::EngineError;

/// Volume ledger operations: package activation and PV/BV credits. PV
/// credits also fan advisory entries up the sponsorship chain; that is
/// bookkeeping for visibility, never a payout trigger.
#[derive(Debug, Clone, Copy)]
pub struct VolumeLedgerOps<'a> {
    pub registry: &'a PackageRegistry,
    pub config: &'a CompPlanConfig,
}

impl VolumeLedgerOps<'_> {
    /// Flips the activation flag, creates the (member, package) matching
    /// node, and credits the package's PV/BV in one unit of work.
    pub fn activate_package(
        &self,
        store: &mut LedgerStore,
        member_id: &MemberId,
        package: PackageTier,
        now: TimestampMs,
    ) -> Result<VolumeEventId, EngineError> {
        let spec = self
            .registry
            .spec(package)
            .ok_or(EngineError::NotFound {
                entity: "package_spec",
                key: package.as_str().to_string(),
            })?
            .clone();
        if store.member_row(member_id).is_none() {
            return Err(EngineError::NotFound {
                entity: "member",
                key: member_id.as_str().to_string(),
            });
        }
        store.transaction(|s| {
            s.activate_package_row(member_id, package, now)?;
            let key = format!("activation:{}:{}", member_id.as_str(), package.as_str());
            let input = VolumeEventInput::v1(
                member_id.clone(),
                Some(package),
                spec.pv,
                spec.bv,
                VolumeSource::PackageActivation,
                now,
                Some(key),
            )?;
            let volume_event_id = s.append_volume_event(input)?;
            self.propagate_sponsor_entries(s, member_id, volume_event_id, spec.pv, now)?;
            Ok(volume_event_id)
        })
    }

    pub fn credit_pv(
        &self,
        store: &mut LedgerStore,
        member_id: &MemberId,
        package: PackageTier,
        pv: u32,
        source: VolumeSource,
        idempotency_key: Option<String>,
        now: TimestampMs,
    ) -> Result<VolumeEventId, EngineError> {
        if pv == 0 {
            return Err(EngineError::InvalidAmount { field: "pv" });
        }
        let member = store.member_row(member_id).ok_or(EngineError::NotFound {
            entity: "member",
            key: member_id.as_str().to_string(),
        })?;
        if !member.active_packages.contains(&package) {
            return Err(EngineError::PackageInactive {
                member_id: member_id.clone(),
                package,
            });
        }
        let key = idempotency_key.unwrap_or_else(|| {
            derived_idempotency_key(member_id, Some(package), u64::from(pv), 0, source, now)
        });
        store.transaction(|s| {
            let input = VolumeEventInput::v1(
                member_id.clone(),
                Some(package),
                pv,
                0,
                source,
                now,
                Some(key),
            )?;
            let volume_event_id = s.append_volume_event(input)?;
            self.propagate_sponsor_entries(s, member_id, volume_event_id, pv, now)?;
            Ok(volume_event_id)
        })
    }

    pub fn credit_bv(
        &self,
        store: &mut LedgerStore,
        member_id: &MemberId,
        bv: u64,
        source: VolumeSource,
        idempotency_key: Option<String>,
        now: TimestampMs,
    ) -> Result<VolumeEventId, EngineError> {
        if bv == 0 {
            return Err(EngineError::InvalidAmount { field: "bv" });
        }
        if store.member_row(member_id).is_none() {
            return Err(EngineError::NotFound {
                entity: "member",
                key: member_id.as_str().to_string(),
            });
        }
        let key = idempotency_key
            .unwrap_or_else(|| derived_idempotency_key(member_id, None, 0, bv, source, now));
        store.transaction(|s| {
            let input =
                VolumeEventInput::v1(member_id.clone(), None, 0, bv, source, now, Some(key))?;
            Ok(s.append_volume_event(input)?)
        })
    }

    fn propagate_sponsor_entries(
        &self,
        s: &mut LedgerStore,
        origin_member_id: &MemberId,
        volume_event_id: VolumeEventId,
        pv: u32,
        now: TimestampMs,
    ) -> Result<(), EngineError> {
        let mut current = origin_member_id.clone();
        for level in 1..=self.config.sponsor_entry_depth {
            let sponsor = match s.member_row(&current).and_then(|r| r.sponsor_id.clone()) {
                Some(sponsor) => sponsor,
                None => break,
            };
            s.append_sponsor_volume_entry(
                sponsor.clone(),
                origin_member_id.clone(),
                volume_event_id,
                level,
                pv,
                now,
            )?;
            current = sponsor;
        }
        Ok(())
    }
}

fn derived_idempotency_key(
    member_id: &MemberId,
    package: Option<PackageTier>,
    pv: u64,
    bv: u64,
    source: VolumeSource,
    now: TimestampMs,
) -> String {
    content_hash_hex(&[
        member_id.as_str().as_bytes(),
        package.map(|p| p.as_str()).unwrap_or("-").as_bytes(),
        pv.to_string().as_bytes(),
        bv.to_string().as_bytes(),
        source.as_str().as_bytes(),
        now.0.to_string().as_bytes(),
    ])
}
