//! The trade lifecycle state machine.
//!
//! A validated enum rather than typestate: trades are stored, queried,
//! and serialized with the state decided at runtime, and several
//! transitions share guards that depend on record data (deadlines,
//! caller roles). Invalid transitions are runtime errors carrying both
//! states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a trade.
///
/// ## Transition Graph
///
/// ```text
/// RequestCreated ──accept()──▶ RequestAccepted ──fund()──▶ EscrowFunded
///      │                           │                           │
///      └─cancel()─▶ EscrowCancelled◀─cancel()    cancel(buyer)─┤
///                                                              │
///                        refund_expired()─▶ EscrowRefunded ◀───┤
///                                                              │
///                                              mark_fiat_deposited()
///                                                              │
///                                                              ▼
///                                                        FiatDeposited
///                                                              │
///                                        ┌─────────────────────┤
///                                        │                     │
///                                   release()             dispute()
///                                        │                     │
///                                        ▼                     ▼
///                                EscrowReleased         EscrowDisputed
///                                                              │
///                                                         resolve()
///                                                              │
///                                                              ▼
///                                                       DisputeResolved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeState {
    /// A taker requested a trade against an offer.
    RequestCreated,
    /// The maker accepted the request.
    RequestAccepted,
    /// The seller escrowed the full token amount.
    EscrowFunded,
    /// The buyer marked the off-chain fiat payment as sent.
    FiatDeposited,
    /// Escrow released to the buyer. Terminal state.
    EscrowReleased,
    /// A dispute is open and awaiting resolution.
    EscrowDisputed,
    /// The assigned arbitrator ruled. Terminal state.
    DisputeResolved,
    /// The trade was cancelled before settlement. Terminal state.
    EscrowCancelled,
    /// The escrow was refunded after expiry. Terminal state.
    EscrowRefunded,
}

impl TradeState {
    /// The canonical string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestCreated => "REQUEST_CREATED",
            Self::RequestAccepted => "REQUEST_ACCEPTED",
            Self::EscrowFunded => "ESCROW_FUNDED",
            Self::FiatDeposited => "FIAT_DEPOSITED",
            Self::EscrowReleased => "ESCROW_RELEASED",
            Self::EscrowDisputed => "ESCROW_DISPUTED",
            Self::DisputeResolved => "DISPUTE_RESOLVED",
            Self::EscrowCancelled => "ESCROW_CANCELLED",
            Self::EscrowRefunded => "ESCROW_REFUNDED",
        }
    }

    /// Whether this state is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::EscrowReleased
                | Self::DisputeResolved
                | Self::EscrowCancelled
                | Self::EscrowRefunded
        )
    }

    /// Valid target states from this state.
    pub fn valid_transitions(&self) -> &'static [TradeState] {
        match self {
            Self::RequestCreated => &[Self::RequestAccepted, Self::EscrowCancelled],
            Self::RequestAccepted => &[Self::EscrowFunded, Self::EscrowCancelled],
            Self::EscrowFunded => &[
                Self::FiatDeposited,
                Self::EscrowCancelled,
                Self::EscrowRefunded,
            ],
            Self::FiatDeposited => &[Self::EscrowReleased, Self::EscrowDisputed],
            Self::EscrowDisputed => &[Self::DisputeResolved],
            Self::EscrowReleased
            | Self::DisputeResolved
            | Self::EscrowCancelled
            | Self::EscrowRefunded => &[],
        }
    }

    /// Whether moving to `target` follows a table edge.
    pub fn can_transition_to(&self, target: TradeState) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl std::fmt::Display for TradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TradeState; 9] = [
        TradeState::RequestCreated,
        TradeState::RequestAccepted,
        TradeState::EscrowFunded,
        TradeState::FiatDeposited,
        TradeState::EscrowReleased,
        TradeState::EscrowDisputed,
        TradeState::DisputeResolved,
        TradeState::EscrowCancelled,
        TradeState::EscrowRefunded,
    ];

    #[test]
    fn terminal_states_have_no_exits() {
        for state in ALL {
            assert_eq!(state.is_terminal(), state.valid_transitions().is_empty());
        }
    }

    #[test]
    fn release_is_reachable_only_from_fiat_deposited() {
        for state in ALL {
            let reachable = state.can_transition_to(TradeState::EscrowReleased);
            assert_eq!(reachable, state == TradeState::FiatDeposited);
        }
    }

    #[test]
    fn refund_is_reachable_only_from_escrow_funded() {
        for state in ALL {
            let reachable = state.can_transition_to(TradeState::EscrowRefunded);
            assert_eq!(reachable, state == TradeState::EscrowFunded);
        }
    }

    #[test]
    fn dispute_resolution_follows_dispute() {
        for state in ALL {
            let reachable = state.can_transition_to(TradeState::DisputeResolved);
            assert_eq!(reachable, state == TradeState::EscrowDisputed);
        }
    }

    #[test]
    fn cancellation_stops_at_fiat_deposit() {
        assert!(TradeState::RequestCreated.can_transition_to(TradeState::EscrowCancelled));
        assert!(TradeState::RequestAccepted.can_transition_to(TradeState::EscrowCancelled));
        assert!(TradeState::EscrowFunded.can_transition_to(TradeState::EscrowCancelled));
        assert!(!TradeState::FiatDeposited.can_transition_to(TradeState::EscrowCancelled));
        assert!(!TradeState::EscrowDisputed.can_transition_to(TradeState::EscrowCancelled));
    }

    #[test]
    fn as_str_names_are_stable() {
        assert_eq!(TradeState::RequestCreated.as_str(), "REQUEST_CREATED");
        assert_eq!(TradeState::FiatDeposited.as_str(), "FIAT_DEPOSITED");
        assert_eq!(TradeState::DisputeResolved.as_str(), "DISPUTE_RESOLVED");
    }

    #[test]
    fn state_serde_roundtrip() {
        for state in ALL {
            let json = serde_json::to_string(&state).unwrap();
            let back: TradeState = serde_json::from_str(&json).unwrap();
            assert_eq!(back, state);
        }
    }

    mod reachability {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// No walk along table edges reaches EscrowReleased without
            /// passing through EscrowFunded and FiatDeposited first.
            #[test]
            fn release_requires_funding_and_fiat(steps in proptest::collection::vec(0usize..9, 0..12)) {
                let mut state = TradeState::RequestCreated;
                let mut visited = vec![state];
                for step in steps {
                    let target = ALL[step];
                    if state.can_transition_to(target) {
                        state = target;
                        visited.push(state);
                    }
                }
                if state == TradeState::EscrowReleased {
                    prop_assert!(visited.contains(&TradeState::EscrowFunded));
                    prop_assert!(visited.contains(&TradeState::FiatDeposited));
                }
            }

            /// Walks never leave a terminal state.
            #[test]
            fn terminal_states_absorb(steps in proptest::collection::vec(0usize..9, 0..16)) {
                let mut state = TradeState::RequestCreated;
                for step in steps {
                    let target = ALL[step];
                    if state.is_terminal() {
                        prop_assert!(!state.can_transition_to(target));
                    } else if state.can_transition_to(target) {
                        state = target;
                    }
                }
            }
        }
    }
}
