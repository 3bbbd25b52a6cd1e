//! The authorization policy.
//!
//! Every entry point consults this single table instead of repeating
//! caller comparisons inline, so the call-gating behavior is auditable
//! in one place. Decisions are evaluated per call against the current
//! record; nothing is cached, so a role change binds on the next call.

use serde::{Deserialize, Serialize};

use ramp_core::AccountId;

use crate::error::TradeError;
use crate::records::Trade;
use crate::state::TradeState;

/// A gated action on a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    /// Maker accepts the trade request.
    Accept,
    /// Seller escrows the trade amount.
    Fund,
    /// Buyer marks the fiat leg as paid.
    MarkFiatPaid,
    /// Seller releases the escrow to the buyer.
    Release,
    /// A party exits the trade before settlement.
    Cancel,
    /// A party opens a dispute.
    Dispute,
    /// A party submits dispute evidence.
    SubmitEvidence,
    /// The assigned arbitrator rules on the dispute.
    Resolve,
}

impl TradeAction {
    /// The action name as a stable string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Fund => "fund",
            Self::MarkFiatPaid => "mark_fiat_paid",
            Self::Release => "release",
            Self::Cancel => "cancel",
            Self::Dispute => "dispute",
            Self::SubmitEvidence => "submit_evidence",
            Self::Resolve => "resolve",
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decide whether `caller` may perform `action` on `trade`.
///
/// The cancel rule depends on the current state: before funding either
/// party may walk away; once escrow is funded only the buyer keeps a
/// self-protective exit (the seller's path out is expiry refund).
///
/// # Errors
///
/// Returns [`TradeError::Unauthorized`] carrying the action and caller.
pub fn authorize(action: TradeAction, caller: &AccountId, trade: &Trade) -> Result<(), TradeError> {
    let permitted = match action {
        TradeAction::Accept => *caller == trade.seller,
        TradeAction::Fund => *caller == trade.seller,
        TradeAction::MarkFiatPaid => *caller == trade.buyer,
        TradeAction::Release => *caller == trade.seller,
        TradeAction::Cancel => {
            if trade.state == TradeState::EscrowFunded {
                *caller == trade.buyer
            } else {
                trade.is_participant(caller)
            }
        }
        TradeAction::Dispute | TradeAction::SubmitEvidence => trade.is_participant(caller),
        TradeAction::Resolve => trade.arbitrator.as_ref() == Some(caller),
    };
    if permitted {
        Ok(())
    } else {
        Err(TradeError::Unauthorized {
            action,
            caller: *caller,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ramp_core::{CurrencyCode, OfferId, TokenId, TradeId};

    fn sample_trade(state: TradeState) -> Trade {
        let now = Utc::now();
        Trade {
            id: TradeId::new(1),
            offer_id: OfferId::new(1),
            buyer: AccountId::new(),
            seller: AccountId::new(),
            token: TokenId::new("USDC").unwrap(),
            amount: 100,
            fiat_amount: 15_000,
            locked_rate: 150,
            fiat_currency: CurrencyCode::new("KES").unwrap(),
            created_at: now,
            expires_at: now,
            dispute_deadline: None,
            arbitrator: None,
            state,
            buyer_contact: None,
            seller_contact: None,
            history: Vec::new(),
        }
    }

    #[test]
    fn seller_only_actions() {
        let trade = sample_trade(TradeState::RequestCreated);
        for action in [TradeAction::Accept, TradeAction::Fund, TradeAction::Release] {
            assert!(authorize(action, &trade.seller, &trade).is_ok());
            assert!(authorize(action, &trade.buyer, &trade).is_err());
        }
    }

    #[test]
    fn buyer_marks_fiat() {
        let trade = sample_trade(TradeState::EscrowFunded);
        assert!(authorize(TradeAction::MarkFiatPaid, &trade.buyer, &trade).is_ok());
        assert!(authorize(TradeAction::MarkFiatPaid, &trade.seller, &trade).is_err());
    }

    #[test]
    fn either_party_cancels_before_funding() {
        let trade = sample_trade(TradeState::RequestAccepted);
        assert!(authorize(TradeAction::Cancel, &trade.buyer, &trade).is_ok());
        assert!(authorize(TradeAction::Cancel, &trade.seller, &trade).is_ok());
        assert!(authorize(TradeAction::Cancel, &AccountId::new(), &trade).is_err());
    }

    #[test]
    fn only_buyer_cancels_after_funding() {
        let trade = sample_trade(TradeState::EscrowFunded);
        assert!(authorize(TradeAction::Cancel, &trade.buyer, &trade).is_ok());
        assert!(authorize(TradeAction::Cancel, &trade.seller, &trade).is_err());
    }

    #[test]
    fn resolve_requires_the_assigned_arbitrator() {
        let mut trade = sample_trade(TradeState::EscrowDisputed);
        let arbitrator = AccountId::new();
        assert!(authorize(TradeAction::Resolve, &arbitrator, &trade).is_err());

        trade.arbitrator = Some(arbitrator);
        assert!(authorize(TradeAction::Resolve, &arbitrator, &trade).is_ok());
        assert!(authorize(TradeAction::Resolve, &trade.seller, &trade).is_err());
    }

    #[test]
    fn denial_names_action_and_caller() {
        let trade = sample_trade(TradeState::RequestCreated);
        let outsider = AccountId::new();
        let err = authorize(TradeAction::Dispute, &outsider, &trade).unwrap_err();
        match err {
            TradeError::Unauthorized { action, caller } => {
                assert_eq!(action, TradeAction::Dispute);
                assert_eq!(caller, outsider);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
