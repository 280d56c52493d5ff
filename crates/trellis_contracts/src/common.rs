#![forbid(unsafe_code)]

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
pub struct TimestampMs(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReasonCodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

impl Validate for TimestampMs {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "timestamp_ms",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

pub const WINDOWS_PER_DAY: u8 = 8;

/// One of the fixed daily processing windows (1..=8).
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
pub struct WindowIndex(u8);

impl WindowIndex {
    pub fn new(v: u8) -> Result<Self, ContractViolation> {
        if v == 0 || v > WINDOWS_PER_DAY {
            return Err(ContractViolation::InvalidValue {
                field: "window_index",
                reason: "must be within 1..=8",
            });
        }
        Ok(Self(v))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Validate for WindowIndex {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 || self.0 > WINDOWS_PER_DAY {
            return Err(ContractViolation::InvalidValue {
                field: "window_index",
                reason: "must be within 1..=8",
            });
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
pub struct SettlementDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl SettlementDate {
    pub fn v1(year: u16, month: u8, day: u8) -> Result<Self, ContractViolation> {
        let date = Self { year, month, day };
        date.validate()?;
        Ok(date)
    }
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
            if leap {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

impl Validate for SettlementDate {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.year < 1970 {
            return Err(ContractViolation::InvalidValue {
                field: "settlement_date.year",
                reason: "must be >= 1970",
            });
        }
        if self.month == 0 || self.month > 12 {
            return Err(ContractViolation::InvalidValue {
                field: "settlement_date.month",
                reason: "must be within 1..=12",
            });
        }
        if self.day == 0 || self.day > days_in_month(self.year, self.month) {
            return Err(ContractViolation::InvalidValue {
                field: "settlement_date.day",
                reason: "must be a valid day of the month",
            });
        }
        Ok(())
    }
}

pub fn validate_id_token(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if value.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    if value.chars().any(|c| {
        !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.' || c == '/')
    }) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must contain token-safe ASCII only",
        });
    }
    Ok(())
}

pub fn validate_opt_id_token(
    field: &'static str,
    value: &Option<String>,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if let Some(v) = value {
        validate_id_token(field, v, max_len)?;
    }
    Ok(())
}
