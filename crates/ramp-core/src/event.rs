//! Protocol event vocabulary and the append-only event log.
//!
//! Every externally observable settlement step emits one event, giving
//! off-process indexers a complete, ordered view without reading engine
//! storage. The log is append-only; entries are stamped with a sequence
//! number and a UTC timestamp at record time.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::identity::{AccountId, OfferId, TokenId, TradeId};

/// An externally observable settlement event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// A trade request was created against an offer.
    TradeCreated {
        trade_id: TradeId,
        offer_id: OfferId,
        buyer: AccountId,
        seller: AccountId,
        amount: u128,
    },
    /// The maker accepted the trade request.
    TradeAccepted { trade_id: TradeId },
    /// The seller escrowed the full trade amount.
    EscrowFunded { trade_id: TradeId, amount: u128 },
    /// The buyer marked the off-chain fiat payment as sent.
    FiatMarked {
        trade_id: TradeId,
        dispute_deadline: DateTime<Utc>,
    },
    /// Escrow was released to the buyer.
    EscrowReleased { trade_id: TradeId, net_amount: u128 },
    /// The trade was cancelled before settlement.
    TradeCancelled { trade_id: TradeId, by: AccountId },
    /// Escrow was refunded in full to the seller.
    EscrowRefunded { trade_id: TradeId, amount: u128 },
    /// A dispute was opened.
    DisputeOpened {
        trade_id: TradeId,
        initiator: AccountId,
    },
    /// An arbitrator was assigned to the dispute.
    ArbitratorAssigned {
        trade_id: TradeId,
        arbitrator: AccountId,
    },
    /// The assigned arbitrator resolved the dispute.
    DisputeResolved { trade_id: TradeId, winner: AccountId },
    /// Fees were split and routed on release.
    FeeDistributed {
        trade_id: TradeId,
        burned: u128,
        protocol: u128,
        warchest: u128,
        arbitrator: u128,
    },
    /// The burn share could not be converted and burned; it was credited
    /// to the treasury's pending balance instead. Distinct from
    /// [`FeeDistributed`](Self::FeeDistributed) so operators can reconcile
    /// tokenomics drift.
    BurnFellBackToTreasury {
        trade_id: TradeId,
        amount: u128,
        reason: String,
    },
    /// A payout was credited to a recipient's pull-payment balance.
    WithdrawalScheduled {
        recipient: AccountId,
        amount: u128,
        total_pending: u128,
    },
    /// A recipient drained their pull-payment balance.
    WithdrawalExecuted { recipient: AccountId, amount: u128 },
    /// An emergency withdrawal was scheduled behind the mandatory delay.
    EmergencyWithdrawalScheduled {
        token: TokenId,
        amount: u128,
        execute_after: DateTime<Utc>,
    },
}

impl ProtocolEvent {
    /// The event kind as a stable string.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TradeCreated { .. } => "trade_created",
            Self::TradeAccepted { .. } => "trade_accepted",
            Self::EscrowFunded { .. } => "escrow_funded",
            Self::FiatMarked { .. } => "fiat_marked",
            Self::EscrowReleased { .. } => "escrow_released",
            Self::TradeCancelled { .. } => "trade_cancelled",
            Self::EscrowRefunded { .. } => "escrow_refunded",
            Self::DisputeOpened { .. } => "dispute_opened",
            Self::ArbitratorAssigned { .. } => "arbitrator_assigned",
            Self::DisputeResolved { .. } => "dispute_resolved",
            Self::FeeDistributed { .. } => "fee_distributed",
            Self::BurnFellBackToTreasury { .. } => "burn_fell_back_to_treasury",
            Self::WithdrawalScheduled { .. } => "withdrawal_scheduled",
            Self::WithdrawalExecuted { .. } => "withdrawal_executed",
            Self::EmergencyWithdrawalScheduled { .. } => "emergency_withdrawal_scheduled",
        }
    }

    /// The trade this event concerns, if any.
    pub fn trade_id(&self) -> Option<TradeId> {
        match self {
            Self::TradeCreated { trade_id, .. }
            | Self::TradeAccepted { trade_id }
            | Self::EscrowFunded { trade_id, .. }
            | Self::FiatMarked { trade_id, .. }
            | Self::EscrowReleased { trade_id, .. }
            | Self::TradeCancelled { trade_id, .. }
            | Self::EscrowRefunded { trade_id, .. }
            | Self::DisputeOpened { trade_id, .. }
            | Self::ArbitratorAssigned { trade_id, .. }
            | Self::DisputeResolved { trade_id, .. }
            | Self::FeeDistributed { trade_id, .. }
            | Self::BurnFellBackToTreasury { trade_id, .. } => Some(*trade_id),
            Self::WithdrawalScheduled { .. }
            | Self::WithdrawalExecuted { .. }
            | Self::EmergencyWithdrawalScheduled { .. } => None,
        }
    }
}

/// A recorded event with its log position and record time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log, starting at 0.
    pub seq: u64,
    /// When the event was recorded (UTC).
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub event: ProtocolEvent,
}

/// Append-only in-memory event log shared across the settlement components.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: RwLock<Vec<EventRecord>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, returning its sequence number.
    pub fn record(&self, event: ProtocolEvent) -> u64 {
        let mut entries = self.entries.write();
        let seq = entries.len() as u64;
        entries.push(EventRecord {
            seq,
            timestamp: Utc::now(),
            event,
        });
        seq
    }

    /// Snapshot of every recorded entry, in order.
    pub fn all(&self) -> Vec<EventRecord> {
        self.entries.read().clone()
    }

    /// Entries concerning a single trade, in order.
    pub fn for_trade(&self, trade_id: TradeId) -> Vec<EventRecord> {
        self.entries
            .read()
            .iter()
            .filter(|r| r.event.trade_id() == Some(trade_id))
            .cloned()
            .collect()
    }

    /// Entries of one kind, in order.
    pub fn of_kind(&self, kind: &str) -> Vec<EventRecord> {
        self.entries
            .read()
            .iter()
            .filter(|r| r.event.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
