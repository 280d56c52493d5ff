#![forbid(unsafe_code)]

use trellis_contracts::common::{SettlementDate, TimestampMs, WindowIndex};
use trellis_contracts::events::OutboundEvent;
use trellis_contracts::session::SessionRunId;
use trellis_storage::LedgerStore;

use crate::error::EngineError;
use crate::matching::SessionMatchOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartWindowOutcome {
    /// Fresh run row inserted; the caller owns this window's processing.
    Started { session_run_id: SessionRunId },
    /// An unfinished row exists (prior crash or concurrent trigger); the
    /// caller resumes it. Resumption is safe because all consumption is
    /// idempotent per (node, package, session).
    Resumed { session_run_id: SessionRunId },
}

impl StartWindowOutcome {
    pub fn session_run_id(self) -> SessionRunId {
        match self {
            StartWindowOutcome::Started { session_run_id }
            | StartWindowOutcome::Resumed { session_run_id } => session_run_id,
        }
    }
}

/// Clock-driven window lifecycle: NOT_STARTED -> RUNNING -> COMPLETED per
/// (date, window_index). The store's uniqueness constraint on that key is
/// the exactly-once gate; duplicate triggers collapse here, not via locks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionWindowManager;

impl SessionWindowManager {
    pub fn start_window(
        &self,
        store: &mut LedgerStore,
        date: SettlementDate,
        window_index: WindowIndex,
        now: TimestampMs,
    ) -> Result<StartWindowOutcome, EngineError> {
        if let Some(run) = store.session_run_by_window(date, window_index) {
            if run.finished_at.is_some() {
                return Err(EngineError::AlreadyProcessed {
                    session_run_id: run.session_run_id,
                });
            }
            return Ok(StartWindowOutcome::Resumed {
                session_run_id: run.session_run_id,
            });
        }
        let session_run_id = store.insert_session_run_row(date, window_index, now)?;
        Ok(StartWindowOutcome::Started { session_run_id })
    }

    /// Stamps `finished_at` and appends the per-session summary to the
    /// outbox in one unit of work.
    pub fn finish_window(
        &self,
        store: &mut LedgerStore,
        outcome: &SessionMatchOutcome,
        now: TimestampMs,
    ) -> Result<(), EngineError> {
        let run = store
            .session_run_row(outcome.session_run_id)
            .ok_or(EngineError::NotFound {
                entity: "session_run",
                key: format!("{}", outcome.session_run_id.0),
            })?;
        if run.finished_at.is_some() {
            return Err(EngineError::AlreadyProcessed {
                session_run_id: outcome.session_run_id,
            });
        }
        let date = run.date;
        let window_index = run.window_index;
        store.transaction(|s| {
            s.finish_session_run(outcome.session_run_id, now)?;
            s.append_outbound_event(
                OutboundEvent::SessionSummary {
                    session_run_id: outcome.session_run_id,
                    date,
                    window_index,
                    pairs_formed: outcome.pairs_formed,
                    volume_consumed: outcome.volume_consumed,
                    amount_paid: outcome.amount_paid,
                },
                now,
            )?;
            Ok::<(), EngineError>(())
        })
    }
}
