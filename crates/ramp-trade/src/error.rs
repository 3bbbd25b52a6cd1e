//! Structured error hierarchy for the trade lifecycle engine.
//!
//! Every variant carries the values a client needs to render an
//! actionable message: current and attempted states, offending amounts
//! with their bounds, deadlines with the observed clock.

use chrono::{DateTime, Utc};
use thiserror::Error;

use ramp_arbitration::ArbitrationError;
use ramp_core::{AccountId, OfferId, TradeId};
use ramp_escrow::EscrowError;

use crate::policy::TradeAction;
use crate::state::TradeState;

/// Errors arising from trade lifecycle operations.
#[derive(Debug, Error)]
pub enum TradeError {
    /// No trade exists under this identifier.
    #[error("trade not found: {trade_id}")]
    TradeNotFound {
        /// The unknown identifier.
        trade_id: TradeId,
    },

    /// The requested transition is not an edge of the lifecycle table.
    #[error("invalid transition for {trade_id}: cannot move {from} to {attempted}")]
    InvalidTransition {
        /// The trade in question.
        trade_id: TradeId,
        /// Its current state.
        from: TradeState,
        /// The state the call tried to reach.
        attempted: TradeState,
    },

    /// The caller's relationship to the trade does not permit the action.
    #[error("{caller} is not authorized to {action} on this trade")]
    Unauthorized {
        /// The attempted action.
        action: TradeAction,
        /// The rejected caller.
        caller: AccountId,
    },

    /// The referenced offer does not exist.
    #[error("offer not found: {offer_id}")]
    OfferNotFound {
        /// The unknown offer.
        offer_id: OfferId,
    },

    /// The referenced offer is not accepting trades.
    #[error("offer {offer_id} is not active")]
    OfferInactive {
        /// The inactive offer.
        offer_id: OfferId,
    },

    /// The requested amount falls outside the effective bounds.
    #[error("amount {amount} outside allowed range [{min}, {max}]")]
    AmountOutOfRange {
        /// The rejected amount.
        amount: u128,
        /// Effective lower bound.
        min: u128,
        /// Effective upper bound.
        max: u128,
    },

    /// Makers cannot take their own offers.
    #[error("cannot trade against your own offer")]
    SelfTrade,

    /// The caller already has the maximum number of open trades.
    #[error("active trade limit of {limit} reached")]
    ActiveTradeLimit {
        /// The configured cap.
        limit: u32,
    },

    /// The global pause flag is set; no new trades are created.
    #[error("trading is paused")]
    TradingPaused,

    /// A deadline (plus grace) has already passed.
    #[error("deadline {deadline} has passed (now {now})")]
    DeadlineExpired {
        /// The deadline including grace.
        deadline: DateTime<Utc>,
        /// Observed time of the attempt.
        now: DateTime<Utc>,
    },

    /// A deadline (plus grace) has not yet been reached.
    #[error("deadline {deadline} has not been reached (now {now})")]
    DeadlineNotReached {
        /// The deadline including grace.
        deadline: DateTime<Utc>,
        /// Observed time of the attempt.
        now: DateTime<Utc>,
    },

    /// The dispute window (plus grace) closed before the dispute call.
    #[error("dispute window closed at {deadline} (now {now})")]
    DisputeWindowClosed {
        /// The window end including grace.
        deadline: DateTime<Utc>,
        /// Observed time of the attempt.
        now: DateTime<Utc>,
    },

    /// A dispute record already exists for this trade.
    #[error("a dispute already exists for {trade_id}")]
    DuplicateDispute {
        /// The trade in question.
        trade_id: TradeId,
    },

    /// No dispute record exists for this trade.
    #[error("no dispute exists for {trade_id}")]
    DisputeNotFound {
        /// The trade in question.
        trade_id: TradeId,
    },

    /// The dispute has no arbitrator yet; evidence and resolution wait
    /// for assignment.
    #[error("no arbitrator assigned to the dispute on {trade_id}")]
    ArbitratorNotAssigned {
        /// The trade in question.
        trade_id: TradeId,
    },

    /// The dispute was already resolved.
    #[error("dispute on {trade_id} is already resolved")]
    DisputeAlreadyResolved {
        /// The trade in question.
        trade_id: TradeId,
    },

    /// The proposed winner is neither the buyer nor the seller.
    #[error("dispute winner must be the buyer or the seller")]
    InvalidWinner,

    /// A module slot was already bound; binding happens exactly once.
    #[error("{module} is already bound")]
    ModuleAlreadyBound {
        /// Which slot.
        module: &'static str,
    },

    /// A required module slot has not been bound yet.
    #[error("{module} is not bound")]
    ModuleUnbound {
        /// Which slot.
        module: &'static str,
    },

    /// An external call returned an impossible result; the call aborted
    /// with state as of the last successful commit.
    #[error("settlement integrity failure on {trade_id}: {detail}")]
    SettlementIntegrity {
        /// The trade in question.
        trade_id: TradeId,
        /// What was impossible about the result.
        detail: String,
    },

    /// Escrow subsystem failure.
    #[error(transparent)]
    Escrow(#[from] EscrowError),

    /// Arbitration subsystem failure.
    #[error(transparent)]
    Arbitration(#[from] ArbitrationError),
}
