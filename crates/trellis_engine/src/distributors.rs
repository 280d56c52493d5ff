#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use trellis_contracts::common::TimestampMs;
use trellis_contracts::config::CompPlanConfig;
use trellis_contracts::distribution::{DistributionKind, DistributionRunId, FundPool, FundPoolAllocationRecord};
use trellis_contracts::events::OutboundEvent;
use trellis_contracts::member::{MemberId, Rank};
use trellis_contracts::volume::VolumeEventId;
use trellis_contracts::wallet::{TransactionKind, TransactionStatus, WalletTransactionId};
use trellis_storage::repo::VolumeLedgerRepo;
use trellis_storage::{LedgerStore, StorageError, VolumeClaim};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMember {
    pub member_id: MemberId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionBatchOutcome {
    pub distribution_run_id: DistributionRunId,
    pub credited: Vec<(MemberId, Decimal)>,
    pub skipped: Vec<SkippedMember>,
    pub events_processed: u32,
}

impl DistributionBatchOutcome {
    fn empty(distribution_run_id: DistributionRunId) -> Self {
        Self {
            distribution_run_id,
            credited: Vec::new(),
            skipped: Vec::new(),
            events_processed: 0,
        }
    }
}

/// BV events not yet claimed for the given marker, oldest first.
fn claimable_bv_events<R: VolumeLedgerRepo>(
    repo: &R,
    kind: DistributionKind,
) -> Vec<(VolumeEventId, MemberId, u64)> {
    repo.volume_rows()
        .iter()
        .filter(|e| e.bv > 0)
        .filter(|e| match kind {
            DistributionKind::LevelIncome => e.level_run_id.is_none(),
            DistributionKind::Royalty => e.royalty_run_id.is_none(),
            DistributionKind::FundPool => e.fund_run_id.is_none(),
        })
        .map(|e| (e.volume_event_id, e.member_id.clone(), e.bv))
        .collect()
}

fn percent_of(bv: Decimal, percent: Decimal) -> Decimal {
    bv * percent / Decimal::ONE_HUNDRED
}

/// Walks the sponsorship chain of every unprocessed BV event, crediting the
/// configured percentage per level. Events are stamped with the run id, so
/// re-runs credit nothing twice. One member's failed credit is recorded and
/// skipped, never fatal to the batch.
#[derive(Debug, Clone, Copy)]
pub struct LevelIncomeDistributor<'a> {
    pub config: &'a CompPlanConfig,
}

impl LevelIncomeDistributor<'_> {
    pub fn run(
        &self,
        store: &mut LedgerStore,
        now: TimestampMs,
    ) -> Result<DistributionBatchOutcome, EngineError> {
        store.transaction(|s| {
            let run = s.insert_distribution_run_row(DistributionKind::LevelIncome, None, now)?;
            let events = claimable_bv_events(s, DistributionKind::LevelIncome);
            let mut outcome = DistributionBatchOutcome::empty(run);
            for (volume_event_id, origin_member_id, bv) in events {
                s.claim_volume_events(&[volume_event_id], VolumeClaim::LevelIncome(run))?;
                let bv_decimal = Decimal::from(bv);
                let mut current = origin_member_id;
                for level in 1..=self.config.level_depth {
                    let sponsor = match s.member_row(&current).and_then(|r| r.sponsor_id.clone())
                    {
                        Some(sponsor) => sponsor,
                        None => break,
                    };
                    let percent = self.config.level_percent(level).unwrap_or(Decimal::ZERO);
                    let amount = percent_of(bv_decimal, percent);
                    let reference =
                        format!("level:{}:ev{}:l{}", run.0, volume_event_id.0, level);
                    match credit_completed(s, &sponsor, amount, &reference, now) {
                        Ok(()) => {
                            if amount > Decimal::ZERO {
                                outcome.credited.push((sponsor.clone(), amount));
                            }
                        }
                        Err(err) => outcome.skipped.push(SkippedMember {
                            member_id: sponsor.clone(),
                            message: err.message(),
                        }),
                    }
                    current = sponsor;
                }
                outcome.events_processed += 1;
            }
            s.finish_distribution_run(run, now)?;
            Ok(outcome)
        })
    }
}

/// Rank royalty over the period's gross BV. A member's share is the
/// cumulative percentage of every rank up to their own; the Star rank's
/// share is capped by a lifetime ceiling per member. Star and upper-rank
/// shares are separate wallet rows so a reversal can compensate the Star
/// counter exactly.
#[derive(Debug, Clone, Copy)]
pub struct RoyaltyDistributor<'a> {
    pub config: &'a CompPlanConfig,
}

impl RoyaltyDistributor<'_> {
    pub fn run(
        &self,
        store: &mut LedgerStore,
        period_key: &str,
        now: TimestampMs,
    ) -> Result<DistributionBatchOutcome, EngineError> {
        store.transaction(|s| {
            let run = s
                .insert_distribution_run_row(
                    DistributionKind::Royalty,
                    Some(period_key.to_string()),
                    now,
                )
                .map_err(|e| duplicate_period(e, DistributionKind::Royalty, period_key))?;
            let events = claimable_bv_events(s, DistributionKind::Royalty);
            let ids: Vec<VolumeEventId> = events.iter().map(|(id, _, _)| *id).collect();
            s.claim_volume_events(&ids, VolumeClaim::Royalty(run))?;
            let gross: Decimal = events.iter().map(|(_, _, bv)| Decimal::from(*bv)).sum();

            let mut outcome = DistributionBatchOutcome::empty(run);
            outcome.events_processed = ids.len() as u32;
            if gross == Decimal::ZERO {
                s.finish_distribution_run(run, now)?;
                return Ok(outcome);
            }

            let members: Vec<(MemberId, Rank, Decimal)> = s
                .member_rows()
                .map(|m| (m.member_id.clone(), m.rank, m.star_royalty_earned))
                .collect();
            let star_percent = self.config.star_royalty_percent();
            for (member_id, rank, star_earned) in members {
                let cumulative = self.config.cumulative_royalty_percent(rank);
                let upper_amount = percent_of(gross, cumulative - star_percent);
                let star_uncapped = percent_of(gross, star_percent);
                let headroom =
                    (self.config.star_royalty_ceiling - star_earned).max(Decimal::ZERO);
                let star_amount = star_uncapped.min(headroom);

                let mut total = Decimal::ZERO;
                let result = (|| -> Result<(), EngineError> {
                    if star_amount > Decimal::ZERO {
                        credit_completed(
                            s,
                            &member_id,
                            star_amount,
                            &format!("royalty:{}:star", run.0),
                            now,
                        )?;
                        s.add_star_royalty_delta(&member_id, star_amount)?;
                        total += star_amount;
                    }
                    if upper_amount > Decimal::ZERO {
                        credit_completed(
                            s,
                            &member_id,
                            upper_amount,
                            &format!("royalty:{}:upper", run.0),
                            now,
                        )?;
                        total += upper_amount;
                    }
                    Ok(())
                })();
                match result {
                    Ok(()) => {
                        if total > Decimal::ZERO {
                            outcome.credited.push((member_id, total));
                        }
                    }
                    Err(err) => outcome.skipped.push(SkippedMember {
                        member_id,
                        message: err.message(),
                    }),
                }
            }
            s.finish_distribution_run(run, now)?;
            Ok(outcome)
        })
    }

    /// Compensating reversal of a completed royalty run: every Completed
    /// royalty row flips to REVERSED and Star rows apply an equal-and-
    /// opposite counter delta. Never a silent in-place revert.
    pub fn reverse_run(
        &self,
        store: &mut LedgerStore,
        distribution_run_id: DistributionRunId,
        now: TimestampMs,
    ) -> Result<Vec<(MemberId, Decimal)>, EngineError> {
        let run = store
            .distribution_run_row(distribution_run_id)
            .ok_or(EngineError::NotFound {
                entity: "distribution_run",
                key: format!("{}", distribution_run_id.0),
            })?;
        if run.kind != DistributionKind::Royalty {
            return Err(EngineError::NotFound {
                entity: "royalty_run",
                key: format!("{}", distribution_run_id.0),
            });
        }
        let star_reference = format!("royalty:{}:star", distribution_run_id.0);
        let upper_reference = format!("royalty:{}:upper", distribution_run_id.0);
        store.transaction(|s| {
            let rows: Vec<(WalletTransactionId, MemberId, Decimal, bool)> = s
                .wallet_rows()
                .iter()
                .filter(|r| {
                    r.status == TransactionStatus::Completed
                        && (r.reference == star_reference || r.reference == upper_reference)
                })
                .map(|r| {
                    (
                        r.wallet_transaction_id,
                        r.member_id.clone(),
                        r.amount,
                        r.reference == star_reference,
                    )
                })
                .collect();
            let mut reversed = Vec::new();
            for (wallet_transaction_id, member_id, amount, is_star) in rows {
                s.transition_wallet_transaction(
                    wallet_transaction_id,
                    TransactionStatus::Reversed,
                )?;
                if is_star {
                    s.add_star_royalty_delta(&member_id, -amount)?;
                }
                s.append_outbound_event(
                    OutboundEvent::WalletEntryRecorded {
                        wallet_transaction_id,
                        member_id: member_id.clone(),
                        amount,
                        kind: TransactionKind::Credit,
                        status: TransactionStatus::Reversed,
                        reference: if is_star {
                            star_reference.clone()
                        } else {
                            upper_reference.clone()
                        },
                    },
                    now,
                )?;
                reversed.push((member_id, amount));
            }
            Ok(reversed)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundAllocationOutcome {
    pub distribution_run_id: DistributionRunId,
    pub total_bv: u64,
    pub allocations: Vec<(FundPool, Decimal)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundDistributionOutcome {
    pub pool: FundPool,
    pub period_key: String,
    pub credited: Vec<(MemberId, Decimal)>,
    pub skipped: Vec<SkippedMember>,
}

/// Periodic pool split: `allocate_period` claims the period's BV once and
/// carves out each configured pool's percentage; `distribute_pool` is the
/// separate, explicitly triggered step that pays one pool's allocation out
/// to qualifying members.
#[derive(Debug, Clone, Copy)]
pub struct FundPoolDistributor<'a> {
    pub config: &'a CompPlanConfig,
}

impl FundPoolDistributor<'_> {
    pub fn allocate_period(
        &self,
        store: &mut LedgerStore,
        period_key: &str,
        now: TimestampMs,
    ) -> Result<FundAllocationOutcome, EngineError> {
        store.transaction(|s| {
            let run = s
                .insert_distribution_run_row(
                    DistributionKind::FundPool,
                    Some(period_key.to_string()),
                    now,
                )
                .map_err(|e| duplicate_period(e, DistributionKind::FundPool, period_key))?;
            let events = claimable_bv_events(s, DistributionKind::FundPool);
            let ids: Vec<VolumeEventId> = events.iter().map(|(id, _, _)| *id).collect();
            s.claim_volume_events(&ids, VolumeClaim::FundPool(run))?;
            let total_bv: u64 = events.iter().map(|(_, _, bv)| *bv).sum();

            let mut allocations = Vec::new();
            for spec in &self.config.fund_pools {
                let amount = percent_of(Decimal::from(total_bv), spec.percent);
                s.insert_fund_pool_allocation_row(FundPoolAllocationRecord::v1(
                    spec.pool,
                    period_key.to_string(),
                    amount,
                    now,
                )?)?;
                allocations.push((spec.pool, amount));
            }
            s.finish_distribution_run(run, now)?;
            Ok(FundAllocationOutcome {
                distribution_run_id: run,
                total_bv,
                allocations,
            })
        })
    }

    pub fn distribute_pool(
        &self,
        store: &mut LedgerStore,
        pool: FundPool,
        period_key: &str,
        now: TimestampMs,
    ) -> Result<FundDistributionOutcome, EngineError> {
        let spec = self
            .config
            .fund_pool_spec(pool)
            .ok_or(EngineError::NotFound {
                entity: "fund_pool_spec",
                key: pool.as_str().to_string(),
            })?
            .clone();
        store.transaction(|s| {
            let allocation = s
                .fund_pool_allocation_row(pool, period_key)
                .ok_or(EngineError::NotFound {
                    entity: "fund_pool_allocation",
                    key: format!("{}:{}", pool.as_str(), period_key),
                })?
                .clone();
            if allocation.distributed {
                return Err(EngineError::DuplicatePeriod {
                    kind: DistributionKind::FundPool,
                    period_key: format!("{}:{}", pool.as_str(), period_key),
                });
            }
            s.mark_fund_pool_distributed(pool, period_key)?;

            let mut outcome = FundDistributionOutcome {
                pool,
                period_key: period_key.to_string(),
                credited: Vec::new(),
                skipped: Vec::new(),
            };
            let qualifiers: Vec<MemberId> = s
                .member_rows()
                .filter(|m| m.rank.index() >= spec.qualifying_rank.index())
                .map(|m| m.member_id.clone())
                .collect();
            if qualifiers.is_empty() || allocation.amount == Decimal::ZERO {
                return Ok(outcome);
            }
            let share = (allocation.amount / Decimal::from(qualifiers.len() as u64)).round_dp(2);
            let reference = format!("fundpool:{}:{}", pool.as_str(), period_key);
            for member_id in qualifiers {
                match credit_completed(s, &member_id, share, &reference, now) {
                    Ok(()) => outcome.credited.push((member_id, share)),
                    Err(err) => outcome.skipped.push(SkippedMember {
                        member_id,
                        message: err.message(),
                    }),
                }
            }
            Ok(outcome)
        })
    }
}

fn duplicate_period(
    err: StorageError,
    kind: DistributionKind,
    period_key: &str,
) -> EngineError {
    match err {
        StorageError::DuplicateKey { .. } => EngineError::DuplicatePeriod {
            kind,
            period_key: period_key.to_string(),
        },
        other => other.into(),
    }
}

fn credit_completed(
    s: &mut LedgerStore,
    member_id: &MemberId,
    amount: Decimal,
    reference: &str,
    now: TimestampMs,
) -> Result<(), EngineError> {
    let wallet_transaction_id = s.append_wallet_transaction(
        member_id.clone(),
        amount,
        TransactionKind::Credit,
        reference.to_string(),
        TransactionStatus::Completed,
        now,
    )?;
    s.append_outbound_event(
        OutboundEvent::WalletEntryRecorded {
            wallet_transaction_id,
            member_id: member_id.clone(),
            amount,
            kind: TransactionKind::Credit,
            status: TransactionStatus::Completed,
            reference: reference.to_string(),
        },
        now,
    )?;
    Ok(())
}
