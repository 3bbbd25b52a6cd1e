//! The trade lifecycle engine.
//!
//! Drives every trade from request to terminal state and is the only
//! caller of the escrow vault. Each operation follows the same ordering
//! discipline: validate all preconditions, mutate the engine's own
//! records and append history, and only then invoke the vault or the
//! arbitrator selector. A callee that re-enters the engine observes the
//! already-advanced state and fails its guard instead of corrupting it.
//! The one compensating write is the fund path: the deposit pull can
//! fail for depositor-side reasons, and the committed transition is
//! reverted in the same call before the error surfaces.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use dashmap::DashMap;

use ramp_arbitration::{ArbitratorSelector, SelectionOutcome};
use ramp_core::config::ConfigProvider;
use ramp_core::event::{EventLog, ProtocolEvent};
use ramp_core::external::{OfferProvider, OfferState, ProfileTracker};
use ramp_core::{AccountId, CurrencyCode, OfferId, RandomnessRequestId, TradeId};
use ramp_escrow::EscrowVault;

use crate::error::TradeError;
use crate::policy::{authorize, TradeAction};
use crate::records::{DisputeRecord, Trade, TransitionRecord, RATE_SCALE};
use crate::state::TradeState;

const MODULE_VAULT: &str = "escrow vault";
const MODULE_SELECTOR: &str = "arbitrator selector";

/// Collaborators the engine is wired to at construction. The vault and
/// the selector are bound afterwards, exactly once each, because they in
/// turn need the engine's identity.
pub struct EngineWiring {
    /// The engine's own identity; must match the vault's bound operator.
    pub engine_account: AccountId,
    /// The external offer book.
    pub offers: Arc<dyn OfferProvider>,
    /// Fire-and-forget reputation/activity bookkeeping.
    pub profiles: Arc<dyn ProfileTracker>,
    /// Configuration source, re-read on every call.
    pub config: Arc<dyn ConfigProvider>,
    /// Shared protocol event log.
    pub events: Arc<EventLog>,
}

/// The trade lifecycle engine. See the module docs for the ordering
/// contract.
pub struct TradeEngine {
    engine_account: AccountId,
    trades: DashMap<TradeId, Trade>,
    disputes: DashMap<TradeId, DisputeRecord>,
    active_counts: DashMap<AccountId, u32>,
    next_id: AtomicU64,
    vault: OnceLock<Arc<EscrowVault>>,
    selector: OnceLock<Arc<ArbitratorSelector>>,
    offers: Arc<dyn OfferProvider>,
    profiles: Arc<dyn ProfileTracker>,
    config: Arc<dyn ConfigProvider>,
    events: Arc<EventLog>,
}

impl TradeEngine {
    /// Assemble an engine from its wiring.
    pub fn new(wiring: EngineWiring) -> Self {
        Self {
            engine_account: wiring.engine_account,
            trades: DashMap::new(),
            disputes: DashMap::new(),
            active_counts: DashMap::new(),
            next_id: AtomicU64::new(1),
            vault: OnceLock::new(),
            selector: OnceLock::new(),
            offers: wiring.offers,
            profiles: wiring.profiles,
            config: wiring.config,
            events: wiring.events,
        }
    }

    /// The engine's identity, used as the vault operator.
    pub fn engine_account(&self) -> AccountId {
        self.engine_account
    }

    /// Bind the escrow vault. Allowed exactly once; the engine and the
    /// vault reference each other's identities, so construction cannot
    /// be circular.
    pub fn bind_vault(&self, vault: Arc<EscrowVault>) -> Result<(), TradeError> {
        self.vault
            .set(vault)
            .map_err(|_| TradeError::ModuleAlreadyBound {
                module: MODULE_VAULT,
            })
    }

    /// Bind the arbitrator selector. Allowed exactly once.
    pub fn bind_selector(&self, selector: Arc<ArbitratorSelector>) -> Result<(), TradeError> {
        self.selector
            .set(selector)
            .map_err(|_| TradeError::ModuleAlreadyBound {
                module: MODULE_SELECTOR,
            })
    }

    // -----------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------

    /// Create a trade request against an active offer. The caller becomes
    /// the buyer; the offer owner becomes the seller. Returns the new
    /// sequential trade id.
    pub fn create(
        &self,
        taker: AccountId,
        offer_id: OfferId,
        amount: u128,
        contact: Option<String>,
    ) -> Result<TradeId, TradeError> {
        let snapshot = self.config.snapshot();
        if snapshot.paused {
            return Err(TradeError::TradingPaused);
        }
        let offer = self
            .offers
            .offer(offer_id)
            .ok_or(TradeError::OfferNotFound { offer_id })?;
        if offer.state != OfferState::Active {
            return Err(TradeError::OfferInactive { offer_id });
        }
        if taker == offer.owner {
            return Err(TradeError::SelfTrade);
        }
        let min = offer.min_amount.max(snapshot.limits.min_amount);
        let max = offer.max_amount.min(snapshot.limits.max_amount);
        if amount < min || amount > max {
            return Err(TradeError::AmountOutOfRange { amount, min, max });
        }
        if self.active_trade_count(&taker) >= snapshot.limits.max_active_trades {
            return Err(TradeError::ActiveTradeLimit {
                limit: snapshot.limits.max_active_trades,
            });
        }
        let fiat_amount = amount
            .checked_mul(offer.rate)
            .map(|scaled| scaled / RATE_SCALE)
            .ok_or(TradeError::AmountOutOfRange { amount, min, max })?;

        let id = TradeId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let trade = Trade {
            id,
            offer_id,
            buyer: taker,
            seller: offer.owner,
            token: offer.token.clone(),
            amount,
            fiat_amount,
            locked_rate: offer.rate,
            fiat_currency: offer.fiat_currency.clone(),
            created_at: now,
            expires_at: now + snapshot.timing.funding_window(),
            dispute_deadline: None,
            arbitrator: None,
            state: TradeState::RequestCreated,
            buyer_contact: contact,
            seller_contact: None,
            history: vec![TransitionRecord {
                from_state: TradeState::RequestCreated,
                to_state: TradeState::RequestCreated,
                timestamp: now,
                actor: taker,
            }],
        };
        let seller = trade.seller;
        self.trades.insert(id, trade);

        self.note_active_delta(&taker, 1);
        self.note_active_delta(&seller, 1);
        self.events.record(ProtocolEvent::TradeCreated {
            trade_id: id,
            offer_id,
            buyer: taker,
            seller,
            amount,
        });
        Ok(id)
    }

    /// Maker accepts the request, optionally supplying their encrypted
    /// contact blob.
    pub fn accept(
        &self,
        trade_id: TradeId,
        caller: AccountId,
        contact: Option<String>,
    ) -> Result<(), TradeError> {
        let grace = self.config.snapshot().timing.grace_buffer();
        self.with_trade(trade_id, |trade| {
            Self::require_edge(trade, TradeState::RequestAccepted)?;
            authorize(TradeAction::Accept, &caller, trade)?;
            let now = Utc::now();
            let deadline = trade.expires_at + grace;
            if now > deadline {
                return Err(TradeError::DeadlineExpired { deadline, now });
            }
            Self::apply(trade, TradeState::RequestAccepted, caller);
            if contact.is_some() {
                trade.seller_contact = contact;
            }
            Ok(())
        })?;
        self.events
            .record(ProtocolEvent::TradeAccepted { trade_id });
        Ok(())
    }

    /// Seller escrows the exact trade amount into the vault.
    pub fn fund(&self, trade_id: TradeId, caller: AccountId) -> Result<(), TradeError> {
        let vault = self.vault()?.clone();
        let grace = self.config.snapshot().timing.grace_buffer();
        let (token, amount, seller) = self.with_trade(trade_id, |trade| {
            Self::require_edge(trade, TradeState::EscrowFunded)?;
            authorize(TradeAction::Fund, &caller, trade)?;
            let now = Utc::now();
            let deadline = trade.expires_at + grace;
            if now > deadline {
                return Err(TradeError::DeadlineExpired { deadline, now });
            }
            Self::apply(trade, TradeState::EscrowFunded, caller);
            Ok((trade.token.clone(), trade.amount, trade.seller))
        })?;

        if let Err(err) = vault.deposit(&self.engine_account, trade_id, &token, amount, &seller) {
            // The pull failed on the depositor's side; undo the committed
            // transition so the seller can retry after topping up.
            self.revert_last_transition(trade_id, TradeState::RequestAccepted);
            return Err(err.into());
        }
        self.events
            .record(ProtocolEvent::EscrowFunded { trade_id, amount });
        Ok(())
    }

    /// Buyer marks the off-chain fiat payment as sent, stamping the
    /// dispute deadline exactly once.
    pub fn mark_fiat_deposited(
        &self,
        trade_id: TradeId,
        caller: AccountId,
    ) -> Result<(), TradeError> {
        let window = self.config.snapshot().timing.dispute_window();
        let deadline = self.with_trade(trade_id, |trade| {
            Self::require_edge(trade, TradeState::FiatDeposited)?;
            authorize(TradeAction::MarkFiatPaid, &caller, trade)?;
            let deadline = Utc::now() + window;
            trade.dispute_deadline = Some(deadline);
            Self::apply(trade, TradeState::FiatDeposited, caller);
            Ok(deadline)
        })?;
        self.events.record(ProtocolEvent::FiatMarked {
            trade_id,
            dispute_deadline: deadline,
        });
        Ok(())
    }

    /// Seller releases the escrow to the buyer. Returns the net amount
    /// after fees; no arbitrator share is charged on this path.
    pub fn release(&self, trade_id: TradeId, caller: AccountId) -> Result<u128, TradeError> {
        let vault = self.vault()?.clone();
        let (buyer, seller, amount) = self.with_trade(trade_id, |trade| {
            Self::require_edge(trade, TradeState::EscrowReleased)?;
            authorize(TradeAction::Release, &caller, trade)?;
            Self::apply(trade, TradeState::EscrowReleased, caller);
            Ok((trade.buyer, trade.seller, trade.amount))
        })?;

        let net = vault.release(&self.engine_account, trade_id, &buyer, None)?;
        if net == 0 && amount > 0 {
            return Err(TradeError::SettlementIntegrity {
                trade_id,
                detail: "release returned zero for a non-zero escrow".to_string(),
            });
        }
        self.events.record(ProtocolEvent::EscrowReleased {
            trade_id,
            net_amount: net,
        });
        self.note_active_delta(&buyer, -1);
        self.note_active_delta(&seller, -1);
        self.note_completion(&buyer, true);
        self.note_completion(&seller, true);
        Ok(net)
    }

    /// A party exits the trade before settlement. While escrow is funded
    /// only the buyer may cancel, and the escrow returns in full to the
    /// seller.
    pub fn cancel(&self, trade_id: TradeId, caller: AccountId) -> Result<(), TradeError> {
        let (was_funded, buyer, seller) = self.with_trade(trade_id, |trade| {
            Self::require_edge(trade, TradeState::EscrowCancelled)?;
            authorize(TradeAction::Cancel, &caller, trade)?;
            let was_funded = trade.state == TradeState::EscrowFunded;
            if was_funded && self.vault.get().is_none() {
                return Err(TradeError::ModuleUnbound {
                    module: MODULE_VAULT,
                });
            }
            Self::apply(trade, TradeState::EscrowCancelled, caller);
            Ok((was_funded, trade.buyer, trade.seller))
        })?;

        if was_funded {
            let vault = self.vault()?;
            let amount = vault.refund(&self.engine_account, trade_id, &seller)?;
            self.events
                .record(ProtocolEvent::EscrowRefunded { trade_id, amount });
        }
        self.events.record(ProtocolEvent::TradeCancelled {
            trade_id,
            by: caller,
        });
        self.note_active_delta(&buyer, -1);
        self.note_active_delta(&seller, -1);
        Ok(())
    }

    /// Refund a funded trade whose expiry (plus grace) has passed without
    /// fiat confirmation. Callable by anyone; the full amount returns to
    /// the seller. Returns the refunded amount.
    pub fn refund_expired(&self, trade_id: TradeId, caller: AccountId) -> Result<u128, TradeError> {
        let vault = self.vault()?.clone();
        let grace = self.config.snapshot().timing.grace_buffer();
        let (buyer, seller) = self.with_trade(trade_id, |trade| {
            Self::require_edge(trade, TradeState::EscrowRefunded)?;
            let now = Utc::now();
            let deadline = trade.expires_at + grace;
            if now <= deadline {
                return Err(TradeError::DeadlineNotReached { deadline, now });
            }
            Self::apply(trade, TradeState::EscrowRefunded, caller);
            Ok((trade.buyer, trade.seller))
        })?;

        let amount = vault.refund(&self.engine_account, trade_id, &seller)?;
        self.events
            .record(ProtocolEvent::EscrowRefunded { trade_id, amount });
        self.note_active_delta(&buyer, -1);
        self.note_active_delta(&seller, -1);
        Ok(amount)
    }

    // -----------------------------------------------------------------
    // Dispute sub-flow
    // -----------------------------------------------------------------

    /// Open a dispute within the dispute window. The trade state and the
    /// dispute record commit before arbitrator assignment begins; if
    /// assignment cannot complete synchronously the record persists with
    /// the arbitrator unset until a callback or retry lands.
    pub fn dispute(
        &self,
        trade_id: TradeId,
        caller: AccountId,
        reason: impl Into<String>,
    ) -> Result<(), TradeError> {
        let grace = self.config.snapshot().timing.grace_buffer();
        let currency = self.with_trade(trade_id, |trade| {
            Self::require_edge(trade, TradeState::EscrowDisputed)?;
            authorize(TradeAction::Dispute, &caller, trade)?;
            let deadline = trade.dispute_deadline.ok_or_else(|| {
                TradeError::SettlementIntegrity {
                    trade_id,
                    detail: "fiat was marked deposited without a dispute deadline".to_string(),
                }
            })? + grace;
            let now = Utc::now();
            if now > deadline {
                return Err(TradeError::DisputeWindowClosed { deadline, now });
            }
            if self.disputes.contains_key(&trade_id) {
                return Err(TradeError::DuplicateDispute { trade_id });
            }
            Self::apply(trade, TradeState::EscrowDisputed, caller);
            Ok(trade.fiat_currency.clone())
        })?;

        self.disputes.insert(
            trade_id,
            DisputeRecord {
                trade_id,
                initiator: caller,
                arbitrator: None,
                buyer_evidence: None,
                seller_evidence: None,
                winner: None,
                resolved: false,
                reason: reason.into(),
                opened_at: Utc::now(),
                resolved_at: None,
            },
        );
        self.events.record(ProtocolEvent::DisputeOpened {
            trade_id,
            initiator: caller,
        });

        self.try_assign_arbitrator(trade_id, &currency, &caller);
        Ok(())
    }

    /// Retry arbitrator assignment for a dispute that is still unassigned
    /// (no eligible arbitrators at open time, or a randomness request
    /// that never fulfilled). A no-op if an arbitrator is already set.
    pub fn retry_arbitrator_assignment(
        &self,
        trade_id: TradeId,
        caller: AccountId,
    ) -> Result<(), TradeError> {
        {
            let dispute = self
                .disputes
                .get(&trade_id)
                .ok_or(TradeError::DisputeNotFound { trade_id })?;
            if dispute.resolved {
                return Err(TradeError::DisputeAlreadyResolved { trade_id });
            }
            if dispute.arbitrator.is_some() {
                return Ok(());
            }
        }
        let currency = {
            let trade = self
                .trades
                .get(&trade_id)
                .ok_or(TradeError::TradeNotFound { trade_id })?;
            authorize(TradeAction::Dispute, &caller, trade.value())?;
            trade.fiat_currency.clone()
        };
        self.try_assign_arbitrator(trade_id, &currency, &caller);
        Ok(())
    }

    /// A party submits an encrypted evidence blob. Rejected until an
    /// arbitrator is assigned and after resolution.
    pub fn submit_evidence(
        &self,
        trade_id: TradeId,
        caller: AccountId,
        blob: impl Into<String>,
    ) -> Result<(), TradeError> {
        let is_buyer = {
            let trade = self
                .trades
                .get(&trade_id)
                .ok_or(TradeError::TradeNotFound { trade_id })?;
            authorize(TradeAction::SubmitEvidence, &caller, trade.value())?;
            caller == trade.buyer
        };
        let mut dispute = self
            .disputes
            .get_mut(&trade_id)
            .ok_or(TradeError::DisputeNotFound { trade_id })?;
        if dispute.arbitrator.is_none() {
            return Err(TradeError::ArbitratorNotAssigned { trade_id });
        }
        if dispute.resolved {
            return Err(TradeError::DisputeAlreadyResolved { trade_id });
        }
        if is_buyer {
            dispute.buyer_evidence = Some(blob.into());
        } else {
            dispute.seller_evidence = Some(blob.into());
        }
        Ok(())
    }

    /// Landing point for the randomness callback. Re-filters the
    /// candidate set and writes the chosen arbitrator into the dispute
    /// and the trade. Returns the assignment.
    pub fn apply_randomness(
        &self,
        request_id: RandomnessRequestId,
        random_value: u64,
    ) -> Result<(TradeId, AccountId), TradeError> {
        let selector = self.selector()?;
        let (trade_id, arbitrator) = selector.fulfil(request_id, random_value)?;
        self.assign_arbitrator(trade_id, arbitrator);
        Ok((trade_id, arbitrator))
    }

    /// The assigned arbitrator rules. The winner receives the escrow
    /// through the arbitrated release path (fees plus the arbitrator
    /// share); the arbitrator's reputation counters update afterwards.
    /// Returns the net amount settled to the winner.
    pub fn resolve(
        &self,
        trade_id: TradeId,
        caller: AccountId,
        winner: AccountId,
    ) -> Result<u128, TradeError> {
        let vault = self.vault()?.clone();
        {
            let dispute = self
                .disputes
                .get(&trade_id)
                .ok_or(TradeError::DisputeNotFound { trade_id })?;
            if dispute.resolved {
                return Err(TradeError::DisputeAlreadyResolved { trade_id });
            }
            if dispute.arbitrator.is_none() {
                return Err(TradeError::ArbitratorNotAssigned { trade_id });
            }
        }
        let (buyer, seller, arbitrator, amount) = self.with_trade(trade_id, |trade| {
            Self::require_edge(trade, TradeState::DisputeResolved)?;
            let arbitrator = trade
                .arbitrator
                .ok_or(TradeError::ArbitratorNotAssigned { trade_id })?;
            authorize(TradeAction::Resolve, &caller, trade)?;
            if winner != trade.buyer && winner != trade.seller {
                return Err(TradeError::InvalidWinner);
            }
            Self::apply(trade, TradeState::DisputeResolved, caller);
            Ok((trade.buyer, trade.seller, arbitrator, trade.amount))
        })?;

        // One write sets the winner and flips the resolved flag.
        if let Some(mut dispute) = self.disputes.get_mut(&trade_id) {
            dispute.winner = Some(winner);
            dispute.resolved = true;
            dispute.resolved_at = Some(Utc::now());
        }
        self.events
            .record(ProtocolEvent::DisputeResolved { trade_id, winner });

        let net = vault.release(&self.engine_account, trade_id, &winner, Some(&arbitrator))?;
        if net == 0 && amount > 0 {
            return Err(TradeError::SettlementIntegrity {
                trade_id,
                detail: "arbitrated release returned zero for a non-zero escrow".to_string(),
            });
        }

        if let Ok(selector) = self.selector() {
            if let Err(err) = selector.registry().record_resolution(&arbitrator, true) {
                tracing::warn!(%trade_id, error = %err, "arbitrator reputation update failed");
            }
        }
        let loser = if winner == buyer { seller } else { buyer };
        self.note_completion(&winner, true);
        self.note_completion(&loser, false);
        self.note_active_delta(&buyer, -1);
        self.note_active_delta(&seller, -1);
        Ok(net)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// A trade by id.
    pub fn trade(&self, trade_id: TradeId) -> Option<Trade> {
        self.trades.get(&trade_id).map(|t| t.clone())
    }

    /// All trades a participant is party to, ordered by id.
    pub fn trades_for(&self, participant: &AccountId) -> Vec<Trade> {
        let mut trades: Vec<Trade> = self
            .trades
            .iter()
            .filter(|t| t.is_participant(participant))
            .map(|t| t.clone())
            .collect();
        trades.sort_by_key(|t| t.id);
        trades
    }

    /// The ordered transition history of a trade.
    pub fn history(&self, trade_id: TradeId) -> Option<Vec<TransitionRecord>> {
        self.trades.get(&trade_id).map(|t| t.history.clone())
    }

    /// The dispute record of a trade, if a dispute was ever opened.
    pub fn dispute_record(&self, trade_id: TradeId) -> Option<DisputeRecord> {
        self.disputes.get(&trade_id).map(|d| d.clone())
    }

    /// Number of currently open trades for a user.
    pub fn active_trade_count(&self, user: &AccountId) -> u32 {
        self.active_counts.get(user).map(|c| *c).unwrap_or(0)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn vault(&self) -> Result<&Arc<EscrowVault>, TradeError> {
        self.vault.get().ok_or(TradeError::ModuleUnbound {
            module: MODULE_VAULT,
        })
    }

    fn selector(&self) -> Result<&Arc<ArbitratorSelector>, TradeError> {
        self.selector.get().ok_or(TradeError::ModuleUnbound {
            module: MODULE_SELECTOR,
        })
    }

    fn with_trade<R>(
        &self,
        trade_id: TradeId,
        f: impl FnOnce(&mut Trade) -> Result<R, TradeError>,
    ) -> Result<R, TradeError> {
        let mut entry = self
            .trades
            .get_mut(&trade_id)
            .ok_or(TradeError::TradeNotFound { trade_id })?;
        f(entry.value_mut())
    }

    fn require_edge(trade: &Trade, target: TradeState) -> Result<(), TradeError> {
        if !trade.state.can_transition_to(target) {
            return Err(TradeError::InvalidTransition {
                trade_id: trade.id,
                from: trade.state,
                attempted: target,
            });
        }
        Ok(())
    }

    fn apply(trade: &mut Trade, to: TradeState, actor: AccountId) {
        trade.history.push(TransitionRecord {
            from_state: trade.state,
            to_state: to,
            timestamp: Utc::now(),
            actor,
        });
        trade.state = to;
    }

    /// Undo the most recent transition of a trade. Used only by the fund
    /// path, whose external pull can fail for depositor-side reasons
    /// after the commit.
    fn revert_last_transition(&self, trade_id: TradeId, back_to: TradeState) {
        if let Some(mut entry) = self.trades.get_mut(&trade_id) {
            let trade = entry.value_mut();
            trade.history.pop();
            trade.state = back_to;
        }
    }

    fn try_assign_arbitrator(&self, trade_id: TradeId, currency: &CurrencyCode, caller: &AccountId) {
        let Ok(selector) = self.selector() else {
            tracing::warn!(%trade_id, "arbitrator selector not bound; assignment deferred");
            return;
        };
        match selector.begin_selection(trade_id, currency, caller) {
            Ok(SelectionOutcome::Assigned(arbitrator)) => {
                self.assign_arbitrator(trade_id, arbitrator);
            }
            Ok(SelectionOutcome::Pending(_)) => {
                // The randomness callback lands through apply_randomness.
            }
            Err(err) => {
                tracing::warn!(%trade_id, error = %err, "arbitrator assignment deferred");
            }
        }
    }

    fn assign_arbitrator(&self, trade_id: TradeId, arbitrator: AccountId) {
        {
            let Some(mut dispute) = self.disputes.get_mut(&trade_id) else {
                return;
            };
            if dispute.resolved || dispute.arbitrator.is_some() {
                return;
            }
            dispute.arbitrator = Some(arbitrator);
        }
        if let Some(mut trade) = self.trades.get_mut(&trade_id) {
            trade.arbitrator = Some(arbitrator);
        }
        self.events.record(ProtocolEvent::ArbitratorAssigned {
            trade_id,
            arbitrator,
        });
    }

    /// Adjust the engine's own active-trade counter and mirror the change
    /// to the profile tracker. Tracker failures are logged, never fatal:
    /// bookkeeping runs after the state commit.
    fn note_active_delta(&self, user: &AccountId, delta: i32) {
        {
            let mut count = self.active_counts.entry(*user).or_insert(0);
            if delta >= 0 {
                *count = count.saturating_add(delta as u32);
            } else {
                *count = count.saturating_sub(delta.unsigned_abs());
            }
        }
        if let Err(err) = self.profiles.record_active_delta(user, delta) {
            tracing::warn!(%user, delta, error = %err, "profile active-count update failed");
        }
    }

    fn note_completion(&self, user: &AccountId, won: bool) {
        if let Err(err) = self.profiles.record_completion(user, won) {
            tracing::warn!(%user, won, error = %err, "profile completion update failed");
        }
    }
}

impl std::fmt::Debug for TradeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeEngine")
            .field("trade_count", &self.trades.len())
            .field("dispute_count", &self.disputes.len())
            .field("vault_bound", &self.vault.get().is_some())
            .field("selector_bound", &self.selector.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ramp_core::config::{ConfigSnapshot, FeeSchedule, StaticConfig, TimePolicy, TradeLimits};
    use ramp_core::external::{OfferSummary, ProfileError};
    use ramp_core::{BasisPoints, CurrencyCode, TokenId};

    struct StaticOffers(DashMap<OfferId, OfferSummary>);

    impl OfferProvider for StaticOffers {
        fn offer(&self, id: OfferId) -> Option<OfferSummary> {
            self.0.get(&id).map(|o| o.clone())
        }
    }

    struct NullProfiles;

    impl ProfileTracker for NullProfiles {
        fn record_active_delta(&self, _: &AccountId, _: i32) -> Result<(), ProfileError> {
            Ok(())
        }

        fn record_completion(&self, _: &AccountId, _: bool) -> Result<(), ProfileError> {
            Ok(())
        }
    }

    fn bps(v: u16) -> BasisPoints {
        BasisPoints::new(v).unwrap()
    }

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot {
            version: 1,
            fees: FeeSchedule::new(bps(50), bps(50), bps(25), bps(100)).unwrap(),
            limits: TradeLimits {
                min_amount: 10,
                max_amount: 1_000_000,
                max_active_trades: 3,
            },
            timing: TimePolicy::new(Duration::hours(24), Duration::hours(48))
                .with_grace(Duration::zero()),
            paused: false,
        }
    }

    struct Setup {
        engine: TradeEngine,
        config: Arc<StaticConfig>,
        seller: AccountId,
        buyer: AccountId,
        offer_id: OfferId,
        paused_offer_id: OfferId,
    }

    fn setup() -> Setup {
        let seller = AccountId::new();
        let buyer = AccountId::new();
        let offer_id = OfferId::new(1);
        let paused_offer_id = OfferId::new(2);
        let offers = StaticOffers(DashMap::new());
        offers.0.insert(
            offer_id,
            OfferSummary {
                id: offer_id,
                owner: seller,
                state: OfferState::Active,
                token: TokenId::new("USDC").unwrap(),
                fiat_currency: CurrencyCode::new("KES").unwrap(),
                min_amount: 10,
                max_amount: 100_000,
                rate: 150 * RATE_SCALE,
            },
        );
        offers.0.insert(
            paused_offer_id,
            OfferSummary {
                id: paused_offer_id,
                owner: seller,
                state: OfferState::Paused,
                token: TokenId::new("USDC").unwrap(),
                fiat_currency: CurrencyCode::new("KES").unwrap(),
                min_amount: 10,
                max_amount: 100_000,
                rate: 150 * RATE_SCALE,
            },
        );
        let config = Arc::new(StaticConfig::new(snapshot()));
        let engine = TradeEngine::new(EngineWiring {
            engine_account: AccountId::new(),
            offers: Arc::new(offers),
            profiles: Arc::new(NullProfiles),
            config: config.clone(),
            events: Arc::new(EventLog::new()),
        });
        Setup {
            engine,
            config,
            seller,
            buyer,
            offer_id,
            paused_offer_id,
        }
    }

    #[test]
    fn create_assigns_sequential_ids_and_locks_the_rate() {
        let s = setup();
        let first = s.engine.create(s.buyer, s.offer_id, 100, None).unwrap();
        let second = s.engine.create(s.buyer, s.offer_id, 200, None).unwrap();
        assert_eq!(first, TradeId::new(1));
        assert_eq!(second, TradeId::new(2));

        let trade = s.engine.trade(first).unwrap();
        assert_eq!(trade.state, TradeState::RequestCreated);
        assert_eq!(trade.amount, 100);
        assert_eq!(trade.locked_rate, 150 * RATE_SCALE);
        assert_eq!(trade.fiat_amount, 15_000);
        assert_eq!(trade.history.len(), 1);
    }

    #[test]
    fn create_rejects_self_trade_and_bad_amounts() {
        let s = setup();
        assert!(matches!(
            s.engine.create(s.seller, s.offer_id, 100, None),
            Err(TradeError::SelfTrade)
        ));
        assert!(matches!(
            s.engine.create(s.buyer, s.offer_id, 5, None),
            Err(TradeError::AmountOutOfRange { min: 10, .. })
        ));
        assert!(matches!(
            s.engine.create(s.buyer, s.offer_id, 200_000, None),
            Err(TradeError::AmountOutOfRange { max: 100_000, .. })
        ));
    }

    #[test]
    fn create_rejects_unknown_and_inactive_offers() {
        let s = setup();
        assert!(matches!(
            s.engine.create(s.buyer, OfferId::new(9), 100, None),
            Err(TradeError::OfferNotFound { .. })
        ));
        assert!(matches!(
            s.engine.create(s.buyer, s.paused_offer_id, 100, None),
            Err(TradeError::OfferInactive { .. })
        ));
    }

    #[test]
    fn create_respects_pause_flag() {
        let s = setup();
        s.config.update(|c| c.paused = true);
        assert!(matches!(
            s.engine.create(s.buyer, s.offer_id, 100, None),
            Err(TradeError::TradingPaused)
        ));
    }

    #[test]
    fn create_enforces_active_trade_limit() {
        let s = setup();
        for _ in 0..3 {
            s.engine.create(s.buyer, s.offer_id, 100, None).unwrap();
        }
        assert_eq!(s.engine.active_trade_count(&s.buyer), 3);
        assert!(matches!(
            s.engine.create(s.buyer, s.offer_id, 100, None),
            Err(TradeError::ActiveTradeLimit { limit: 3 })
        ));
    }

    #[test]
    fn accept_is_maker_only_and_appends_history() {
        let s = setup();
        let id = s.engine.create(s.buyer, s.offer_id, 100, None).unwrap();
        assert!(matches!(
            s.engine.accept(id, s.buyer, None),
            Err(TradeError::Unauthorized { .. })
        ));
        s.engine.accept(id, s.seller, Some("enc:maker".to_string())).unwrap();

        let trade = s.engine.trade(id).unwrap();
        assert_eq!(trade.state, TradeState::RequestAccepted);
        assert_eq!(trade.seller_contact.as_deref(), Some("enc:maker"));
        let history = s.engine.history(id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].from_state, TradeState::RequestCreated);
        assert_eq!(history[1].to_state, TradeState::RequestAccepted);
        assert_eq!(history[1].actor, s.seller);
    }

    #[test]
    fn accept_respects_expiry_with_grace() {
        let s = setup();
        // A negative funding window puts expiry in the past immediately.
        s.config
            .update(|c| c.timing.funding_window_secs = -3_600);
        let id = s.engine.create(s.buyer, s.offer_id, 100, None).unwrap();
        assert!(matches!(
            s.engine.accept(id, s.seller, None),
            Err(TradeError::DeadlineExpired { .. })
        ));

        // A grace buffer wider than the overrun absorbs the same lateness.
        s.config
            .update(|c| c.timing.grace_buffer_secs = 7_200);
        let id = s.engine.create(s.buyer, s.offer_id, 100, None).unwrap();
        s.engine.accept(id, s.seller, None).unwrap();
    }

    #[test]
    fn fund_requires_a_bound_vault() {
        let s = setup();
        let id = s.engine.create(s.buyer, s.offer_id, 100, None).unwrap();
        s.engine.accept(id, s.seller, None).unwrap();
        assert!(matches!(
            s.engine.fund(id, s.seller),
            Err(TradeError::ModuleUnbound { .. })
        ));
        // The precondition failed before any commit: state is unchanged.
        assert_eq!(s.engine.trade(id).unwrap().state, TradeState::RequestAccepted);
    }

    #[test]
    fn mark_fiat_requires_funded_state() {
        let s = setup();
        let id = s.engine.create(s.buyer, s.offer_id, 100, None).unwrap();
        assert!(matches!(
            s.engine.mark_fiat_deposited(id, s.buyer),
            Err(TradeError::InvalidTransition {
                from: TradeState::RequestCreated,
                ..
            })
        ));
    }

    #[test]
    fn cancel_before_funding_by_either_party() {
        let s = setup();
        let id = s.engine.create(s.buyer, s.offer_id, 100, None).unwrap();
        s.engine.cancel(id, s.seller).unwrap();
        assert_eq!(s.engine.trade(id).unwrap().state, TradeState::EscrowCancelled);
        assert_eq!(s.engine.active_trade_count(&s.buyer), 0);
        assert_eq!(s.engine.active_trade_count(&s.seller), 0);

        // Terminal: nothing further applies.
        assert!(matches!(
            s.engine.cancel(id, s.buyer),
            Err(TradeError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn module_binding_happens_exactly_once() {
        let s = setup();
        let registry = Arc::new(ramp_arbitration::ArbitratorRegistry::new());
        let selector = Arc::new(ArbitratorSelector::new(registry, None));
        s.engine.bind_selector(selector.clone()).unwrap();
        assert!(matches!(
            s.engine.bind_selector(selector),
            Err(TradeError::ModuleAlreadyBound { .. })
        ));
    }

    #[test]
    fn queries_by_participant() {
        let s = setup();
        let id = s.engine.create(s.buyer, s.offer_id, 100, None).unwrap();
        let outsider = AccountId::new();
        assert_eq!(s.engine.trades_for(&s.buyer).len(), 1);
        assert_eq!(s.engine.trades_for(&s.seller).len(), 1);
        assert!(s.engine.trades_for(&outsider).is_empty());
        assert_eq!(s.engine.trades_for(&s.buyer)[0].id, id);
    }
}
