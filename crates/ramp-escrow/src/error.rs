//! Structured error hierarchy for the escrow subsystem.

use chrono::{DateTime, Utc};
use thiserror::Error;

use ramp_core::TradeId;

use crate::ledger::LedgerError;

/// Errors arising from vault and fee operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// Deposits of zero are rejected outright.
    #[error("escrow deposit amount must be non-zero")]
    ZeroAmount,

    /// The trade already holds (or held) an escrow record.
    #[error("escrow for {trade_id} already exists")]
    AlreadyFunded {
        /// The trade in question.
        trade_id: TradeId,
    },

    /// No funded escrow exists for the trade. Also the terminal answer to
    /// a repeated release or refund: the first success zeroed the record.
    #[error("no funded escrow for {trade_id}")]
    NotFunded {
        /// The trade in question.
        trade_id: TradeId,
    },

    /// The caller is not the trade engine bound to this vault.
    #[error("caller is not the authorized vault operator")]
    UnauthorizedCaller,

    /// The caller is not the vault administrator.
    #[error("caller is not the vault administrator")]
    UnauthorizedAdmin,

    /// The recipient has no pending balance to withdraw.
    #[error("no pending withdrawal balance for the caller")]
    NothingToWithdraw,

    /// Requested slippage tolerance falls outside the allowed band.
    #[error("slippage tolerance {requested_bps} bps outside [0, {max_bps}]")]
    SlippageOutOfRange {
        /// The rejected tolerance.
        requested_bps: u16,
        /// Hard ceiling.
        max_bps: u16,
    },

    /// The emergency withdrawal delay window has not elapsed.
    #[error("emergency withdrawal locked until {execute_after} (now {now})")]
    DelayNotElapsed {
        /// Earliest execution time.
        execute_after: DateTime<Utc>,
        /// Observed time of the attempt.
        now: DateTime<Utc>,
    },

    /// No emergency withdrawal is scheduled.
    #[error("no emergency withdrawal scheduled")]
    NoScheduledWithdrawal,

    /// Fee computation overflowed; the gross amount is unrepresentable.
    #[error("fee computation overflow for gross amount {gross}")]
    FeeOverflow {
        /// The offending gross amount.
        gross: u128,
    },

    /// A token movement failed at the ledger seam.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
