#![forbid(unsafe_code)]

use crate::common::{ContractViolation, SettlementDate, TimestampMs, Validate, WindowIndex};

/// Store-assigned, monotonically increasing run sequence. Later runs always
/// compare greater, which is what makes node session cursors monotone.
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
pub struct SessionRunId(pub u64);

/// One matching run of one daily window. The `(date, window_index)` pair is
/// unique in the store; a row with `finished_at` set is the exactly-once
/// gate against re-running the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRunRecord {
    pub session_run_id: SessionRunId,
    pub date: SettlementDate,
    pub window_index: WindowIndex,
    pub started_at: TimestampMs,
    pub finished_at: Option<TimestampMs>,
}

impl SessionRunRecord {
    pub fn v1(
        session_run_id: SessionRunId,
        date: SettlementDate,
        window_index: WindowIndex,
        started_at: TimestampMs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            session_run_id,
            date,
            window_index,
            started_at,
            finished_at: None,
        };
        record.validate()?;
        Ok(record)
    }
}

impl Validate for SessionRunRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.date.validate()?;
        self.window_index.validate()?;
        self.started_at.validate()?;
        if let Some(finished) = self.finished_at {
            finished.validate()?;
            if finished < self.started_at {
                return Err(ContractViolation::InvalidValue {
                    field: "session_run_record.finished_at",
                    reason: "must be >= started_at",
                });
            }
        }
        Ok(())
    }
}
