#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use trellis_contracts::common::TimestampMs;
use trellis_contracts::config::CompPlanConfig;
use trellis_contracts::events::OutboundEvent;
use trellis_contracts::member::MemberId;
use trellis_contracts::wallet::{
    AdminId, TransactionKind, TransactionStatus, WalletTransactionId, WithdrawalRequestId,
    WithdrawalStatus,
};
use trellis_storage::repo::WalletLedgerRepo;
use trellis_storage::{LedgerStore, StorageError};

use crate::error::EngineError;

/// Read model over the wallet journal for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletStatement {
    pub member_id: MemberId,
    pub balance: Decimal,
    pub credited: Decimal,
    pub debited: Decimal,
    pub pending_debits: Decimal,
}

/// Derives a member's statement from the journal; never reads a cached
/// balance.
pub fn wallet_statement<R: WalletLedgerRepo>(repo: &R, member_id: &MemberId) -> WalletStatement {
    let mut credited = Decimal::ZERO;
    let mut debited = Decimal::ZERO;
    let mut pending_debits = Decimal::ZERO;
    for row in repo.wallet_rows() {
        if &row.member_id != member_id || row.status == TransactionStatus::Reversed {
            continue;
        }
        match row.kind {
            TransactionKind::Credit => credited += row.amount,
            TransactionKind::Debit => {
                debited += row.amount;
                if row.status == TransactionStatus::Pending {
                    pending_debits += row.amount;
                }
            }
        }
    }
    WalletStatement {
        member_id: member_id.clone(),
        balance: credited - debited,
        credited,
        debited,
        pending_debits,
    }
}

/// Withdrawal workflow: request -> approve -> mark-paid, with reject off
/// the PENDING state. Transitions are compare-and-set so two admins cannot
/// double-process one request.
#[derive(Debug, Clone, Copy)]
pub struct WithdrawalOps<'a> {
    pub config: &'a CompPlanConfig,
}

impl WithdrawalOps<'_> {
    /// Guards run before any write: a failed request leaves no row behind.
    pub fn request_withdrawal(
        &self,
        store: &mut LedgerStore,
        member_id: &MemberId,
        amount: Decimal,
        now: TimestampMs,
    ) -> Result<WithdrawalRequestId, EngineError> {
        if !self.config.withdrawals_enabled {
            return Err(EngineError::WithdrawalsDisabled);
        }
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount { field: "amount" });
        }
        if amount < self.config.min_withdrawal {
            return Err(EngineError::BelowMinimumWithdrawal {
                requested: amount,
                minimum: self.config.min_withdrawal,
            });
        }
        if store.member_row(member_id).is_none() {
            return Err(EngineError::NotFound {
                entity: "member",
                key: member_id.as_str().to_string(),
            });
        }
        let statement = wallet_statement(store, member_id);
        if statement.balance < amount {
            return Err(EngineError::InsufficientBalance {
                member_id: member_id.clone(),
                requested: amount,
                available: statement.balance,
            });
        }
        store.transaction(|s| {
            let withdrawal_request_id =
                s.insert_withdrawal_request_row(member_id.clone(), amount, now)?;
            s.append_outbound_event(
                OutboundEvent::WithdrawalStatusChanged {
                    withdrawal_request_id,
                    member_id: member_id.clone(),
                    amount,
                    status: WithdrawalStatus::Pending,
                },
                now,
            )?;
            Ok(withdrawal_request_id)
        })
    }

    /// Re-checks the derived balance at approval time, then reserves the
    /// funds with a PENDING debit.
    pub fn approve_withdrawal(
        &self,
        store: &mut LedgerStore,
        withdrawal_request_id: WithdrawalRequestId,
        admin: &AdminId,
        now: TimestampMs,
    ) -> Result<WalletTransactionId, EngineError> {
        let request = store
            .withdrawal_row(withdrawal_request_id)
            .ok_or(EngineError::NotFound {
                entity: "withdrawal_request",
                key: format!("{}", withdrawal_request_id.0),
            })?
            .clone();
        store.transaction(|s| {
            let statement = wallet_statement(s, &request.member_id);
            if statement.balance < request.amount {
                return Err(EngineError::InsufficientBalance {
                    member_id: request.member_id.clone(),
                    requested: request.amount,
                    available: statement.balance,
                });
            }
            let reserve = s.append_wallet_transaction(
                request.member_id.clone(),
                request.amount,
                TransactionKind::Debit,
                format!("withdrawal:{}", withdrawal_request_id.0),
                TransactionStatus::Pending,
                now,
            )?;
            s.transition_withdrawal(
                withdrawal_request_id,
                WithdrawalStatus::Pending,
                WithdrawalStatus::Approved,
                Some(admin.clone()),
                Some(reserve),
                Some(now),
            )?;
            self.emit_withdrawal_events(
                s,
                withdrawal_request_id,
                &request.member_id,
                request.amount,
                WithdrawalStatus::Approved,
                Some((reserve, TransactionStatus::Pending)),
                now,
            )?;
            Ok(reserve)
        })
    }

    /// Rejection leaves the wallet journal untouched.
    pub fn reject_withdrawal(
        &self,
        store: &mut LedgerStore,
        withdrawal_request_id: WithdrawalRequestId,
        admin: &AdminId,
        now: TimestampMs,
    ) -> Result<(), EngineError> {
        let request = store
            .withdrawal_row(withdrawal_request_id)
            .ok_or(EngineError::NotFound {
                entity: "withdrawal_request",
                key: format!("{}", withdrawal_request_id.0),
            })?
            .clone();
        store.transaction(|s| {
            s.transition_withdrawal(
                withdrawal_request_id,
                WithdrawalStatus::Pending,
                WithdrawalStatus::Rejected,
                Some(admin.clone()),
                None,
                Some(now),
            )?;
            self.emit_withdrawal_events(
                s,
                withdrawal_request_id,
                &request.member_id,
                request.amount,
                WithdrawalStatus::Rejected,
                None,
                now,
            )?;
            Ok(())
        })
    }

    /// APPROVED requests complete their reservation; PENDING requests take
    /// the forced-completion path (balance check plus a COMPLETED debit).
    pub fn mark_withdrawal_paid(
        &self,
        store: &mut LedgerStore,
        withdrawal_request_id: WithdrawalRequestId,
        admin: &AdminId,
        now: TimestampMs,
    ) -> Result<(), EngineError> {
        let request = store
            .withdrawal_row(withdrawal_request_id)
            .ok_or(EngineError::NotFound {
                entity: "withdrawal_request",
                key: format!("{}", withdrawal_request_id.0),
            })?
            .clone();
        match request.status {
            WithdrawalStatus::Approved => store.transaction(|s| {
                let reserve = request
                    .reserve_transaction_id
                    .expect("APPROVED request always carries a reservation");
                s.transition_wallet_transaction(reserve, TransactionStatus::Completed)?;
                s.transition_withdrawal(
                    withdrawal_request_id,
                    WithdrawalStatus::Approved,
                    WithdrawalStatus::Paid,
                    Some(admin.clone()),
                    None,
                    Some(now),
                )?;
                self.emit_withdrawal_events(
                    s,
                    withdrawal_request_id,
                    &request.member_id,
                    request.amount,
                    WithdrawalStatus::Paid,
                    Some((reserve, TransactionStatus::Completed)),
                    now,
                )?;
                Ok(())
            }),
            WithdrawalStatus::Pending => store.transaction(|s| {
                let statement = wallet_statement(s, &request.member_id);
                if statement.balance < request.amount {
                    return Err(EngineError::InsufficientBalance {
                        member_id: request.member_id.clone(),
                        requested: request.amount,
                        available: statement.balance,
                    });
                }
                let debit = s.append_wallet_transaction(
                    request.member_id.clone(),
                    request.amount,
                    TransactionKind::Debit,
                    format!("withdrawal:{}", withdrawal_request_id.0),
                    TransactionStatus::Completed,
                    now,
                )?;
                s.transition_withdrawal(
                    withdrawal_request_id,
                    WithdrawalStatus::Pending,
                    WithdrawalStatus::Paid,
                    Some(admin.clone()),
                    Some(debit),
                    Some(now),
                )?;
                self.emit_withdrawal_events(
                    s,
                    withdrawal_request_id,
                    &request.member_id,
                    request.amount,
                    WithdrawalStatus::Paid,
                    Some((debit, TransactionStatus::Completed)),
                    now,
                )?;
                Ok(())
            }),
            other => Err(EngineError::Storage(StorageError::TransitionViolation {
                table: "withdrawal_requests",
                key: format!("{}", withdrawal_request_id.0),
                from: other.as_str(),
                to: WithdrawalStatus::Paid.as_str(),
            })),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_withdrawal_events(
        &self,
        s: &mut LedgerStore,
        withdrawal_request_id: WithdrawalRequestId,
        member_id: &MemberId,
        amount: Decimal,
        status: WithdrawalStatus,
        wallet_entry: Option<(WalletTransactionId, TransactionStatus)>,
        now: TimestampMs,
    ) -> Result<(), EngineError> {
        if let Some((wallet_transaction_id, tx_status)) = wallet_entry {
            s.append_outbound_event(
                OutboundEvent::WalletEntryRecorded {
                    wallet_transaction_id,
                    member_id: member_id.clone(),
                    amount,
                    kind: TransactionKind::Debit,
                    status: tx_status,
                    reference: format!("withdrawal:{}", withdrawal_request_id.0),
                },
                now,
            )?;
        }
        s.append_outbound_event(
            OutboundEvent::WithdrawalStatusChanged {
                withdrawal_request_id,
                member_id: member_id.clone(),
                amount,
                status,
            },
            now,
        )?;
        Ok(())
    }
}
