//! Persistent records owned by the trade engine.
//!
//! The engine is the only writer of [`Trade`] and [`DisputeRecord`];
//! escrow balances live in the vault and are reached only through its
//! call interface, never by reading shared storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ramp_core::{AccountId, CurrencyCode, OfferId, TokenId, TradeId};

use crate::state::TradeState;

/// Fixed-point scale of [`Trade::locked_rate`]: fiat minor units per
/// token base unit are expressed as `rate / RATE_SCALE`.
pub const RATE_SCALE: u128 = 1_000_000;

/// One recorded state transition, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before the transition.
    pub from_state: TradeState,
    /// State after the transition.
    pub to_state: TradeState,
    /// When the transition occurred (UTC).
    pub timestamp: DateTime<Utc>,
    /// Who performed it.
    pub actor: AccountId,
}

/// A single trade from request to terminal state.
///
/// `amount` is fixed at creation and never mutated; `state` only moves
/// forward along the transition table; `dispute_deadline` is stamped
/// exactly once, when fiat is marked deposited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Sequential trade identifier.
    pub id: TradeId,
    /// The offer this trade executes against.
    pub offer_id: OfferId,
    /// The fiat payer; receives tokens on release.
    pub buyer: AccountId,
    /// The offer owner; escrows tokens and receives fiat off-chain.
    pub seller: AccountId,
    /// Token being traded.
    pub token: TokenId,
    /// Token amount in base units, fixed at creation.
    pub amount: u128,
    /// Fiat owed off-chain, in minor units, derived from the locked rate.
    pub fiat_amount: u128,
    /// Exchange rate locked at creation, scaled by [`RATE_SCALE`].
    pub locked_rate: u128,
    /// Fiat currency of the off-chain leg.
    pub fiat_currency: CurrencyCode,
    /// When the request was created (UTC).
    pub created_at: DateTime<Utc>,
    /// When an unfunded or unpaid trade expires.
    pub expires_at: DateTime<Utc>,
    /// Dispute window end, stamped once at fiat marking.
    pub dispute_deadline: Option<DateTime<Utc>>,
    /// Arbitrator assigned to an open dispute, if any.
    pub arbitrator: Option<AccountId>,
    /// Current lifecycle state.
    pub state: TradeState,
    /// Encrypted off-chain contact blob supplied by the buyer.
    pub buyer_contact: Option<String>,
    /// Encrypted off-chain contact blob supplied by the seller.
    pub seller_contact: Option<String>,
    /// Append-only transition history.
    pub history: Vec<TransitionRecord>,
}

impl Trade {
    /// Whether `account` is the buyer or the seller.
    pub fn is_participant(&self, account: &AccountId) -> bool {
        *account == self.buyer || *account == self.seller
    }

    /// The other party, given one participant.
    pub fn counterparty(&self, account: &AccountId) -> Option<AccountId> {
        if *account == self.buyer {
            Some(self.seller)
        } else if *account == self.seller {
            Some(self.buyer)
        } else {
            None
        }
    }
}

/// Dispute bookkeeping for one trade. Created on the first dispute call
/// and never re-created; `resolved` flips false to true exactly once, by
/// the same write that sets `winner`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeRecord {
    /// The disputed trade.
    pub trade_id: TradeId,
    /// Who opened the dispute.
    pub initiator: AccountId,
    /// Assigned arbitrator; unset until assignment lands.
    pub arbitrator: Option<AccountId>,
    /// Encrypted evidence blob from the buyer.
    pub buyer_evidence: Option<String>,
    /// Encrypted evidence blob from the seller.
    pub seller_evidence: Option<String>,
    /// The prevailing party, set by resolution.
    pub winner: Option<AccountId>,
    /// Whether the dispute has been resolved.
    pub resolved: bool,
    /// Initiator's stated reason.
    pub reason: String,
    /// When the dispute opened (UTC).
    pub opened_at: DateTime<Utc>,
    /// When it was resolved (UTC).
    pub resolved_at: Option<DateTime<Utc>>,
}
