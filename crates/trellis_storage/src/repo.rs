#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use trellis_contracts::common::{SettlementDate, WindowIndex};
use trellis_contracts::events::OutboundEventRecord;
use trellis_contracts::member::{MemberId, MemberRecord, TreeSide};
use trellis_contracts::session::{SessionRunId, SessionRunRecord};
use trellis_contracts::volume::{SponsorVolumeEntry, VolumeEvent};
use trellis_contracts::wallet::WalletTransactionRecord;

use crate::store::LedgerStore;

/// Typed read interface over the network directory and placement tree.
pub trait NetworkDirectoryRepo {
    fn member_row(&self, member_id: &MemberId) -> Option<&MemberRecord>;
    fn descendant_count(&self, member_id: &MemberId) -> u64;
    fn leg_of(&self, node_id: &MemberId, member_id: &MemberId) -> Option<TreeSide>;
}

/// Typed read interface over the volume ledgers.
pub trait VolumeLedgerRepo {
    fn volume_rows(&self) -> &[VolumeEvent];
    fn sponsor_volume_rows(&self) -> &[SponsorVolumeEntry];
}

/// Typed read interface over the wallet journal.
pub trait WalletLedgerRepo {
    fn wallet_rows(&self) -> &[WalletTransactionRecord];
    fn derived_balance(&self, member_id: &MemberId) -> Decimal;
}

/// Typed read interface over session runs.
pub trait SessionRunRepo {
    fn session_run_row(&self, session_run_id: SessionRunId) -> Option<&SessionRunRecord>;
    fn session_run_by_window(
        &self,
        date: SettlementDate,
        window_index: WindowIndex,
    ) -> Option<&SessionRunRecord>;
}

/// Typed read interface over the outbound event outbox.
pub trait OutboxRepo {
    fn outbound_rows(&self) -> &[OutboundEventRecord];
}

impl NetworkDirectoryRepo for LedgerStore {
    fn member_row(&self, member_id: &MemberId) -> Option<&MemberRecord> {
        LedgerStore::member_row(self, member_id)
    }

    fn descendant_count(&self, member_id: &MemberId) -> u64 {
        LedgerStore::descendant_count(self, member_id)
    }

    fn leg_of(&self, node_id: &MemberId, member_id: &MemberId) -> Option<TreeSide> {
        LedgerStore::leg_of(self, node_id, member_id)
    }
}

impl VolumeLedgerRepo for LedgerStore {
    fn volume_rows(&self) -> &[VolumeEvent] {
        LedgerStore::volume_rows(self)
    }

    fn sponsor_volume_rows(&self) -> &[SponsorVolumeEntry] {
        LedgerStore::sponsor_volume_rows(self)
    }
}

impl WalletLedgerRepo for LedgerStore {
    fn wallet_rows(&self) -> &[WalletTransactionRecord] {
        LedgerStore::wallet_rows(self)
    }

    fn derived_balance(&self, member_id: &MemberId) -> Decimal {
        LedgerStore::derived_balance(self, member_id)
    }
}

impl SessionRunRepo for LedgerStore {
    fn session_run_row(&self, session_run_id: SessionRunId) -> Option<&SessionRunRecord> {
        LedgerStore::session_run_row(self, session_run_id)
    }

    fn session_run_by_window(
        &self,
        date: SettlementDate,
        window_index: WindowIndex,
    ) -> Option<&SessionRunRecord> {
        LedgerStore::session_run_by_window(self, date, window_index)
    }
}

impl OutboxRepo for LedgerStore {
    fn outbound_rows(&self) -> &[OutboundEventRecord] {
        LedgerStore::outbound_rows(self)
    }
}
