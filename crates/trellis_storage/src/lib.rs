#![forbid(unsafe_code)]

pub mod hash;
pub mod repo;
pub mod store;

pub use store::{LedgerStore, StorageError, VolumeClaim};
