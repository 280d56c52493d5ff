#![forbid(unsafe_code)]

pub mod common;
pub mod config;
pub mod distribution;
pub mod events;
pub mod member;
pub mod package;
pub mod pair;
pub mod pending;
pub mod session;
pub mod volume;
pub mod wallet;

pub use common::{
    ContractViolation, ReasonCodeId, SettlementDate, TimestampMs, Validate, WindowIndex,
    WINDOWS_PER_DAY,
};
