//! The escrow vault.
//!
//! Owns per-trade custody records and the pull-payment payout ledger.
//! Only the trade engine bound at construction may move escrowed value;
//! the gating is re-checked on every call.
//!
//! ## Ordering
//!
//! `release` and `refund` zero the escrow record before the first external
//! transfer. Any re-entrant call observes a spent record and fails the
//! no-balance guard. Fee payouts to the protocol and warchest destinations
//! accrue in the pull-payment ledger instead of being pushed, so a
//! recipient that refuses transfers cannot block settlement of other
//! trades.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use ramp_core::config::ConfigProvider;
use ramp_core::event::{EventLog, ProtocolEvent};
use ramp_core::external::{ConversionRouter, RouterError};
use ramp_core::{AccountId, BasisPoints, TokenId, TradeId};

use crate::error::EscrowError;
use crate::fees::FeeBreakdown;
use crate::ledger::TokenLedger;

/// Hard ceiling on the slippage tolerance: 5%.
pub const MAX_SLIPPAGE_BPS: u16 = 500;

/// Default slippage tolerance: 1%.
pub const DEFAULT_SLIPPAGE_BPS: u16 = 100;

/// Custody record for one trade.
///
/// `amount` is non-zero exactly while `funded` is set; release and refund
/// clear both atomically before any transfer leaves the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    /// The trade this escrow belongs to.
    pub trade_id: TradeId,
    /// Token held in custody.
    pub token: TokenId,
    /// Custodied amount in base units.
    pub amount: u128,
    /// The account that funded the escrow (the seller).
    pub depositor: AccountId,
    /// Whether the escrow currently holds value.
    pub funded: bool,
}

/// Accounts receiving routed fee shares.
#[derive(Debug, Clone, Copy)]
pub struct FeeDestinations {
    /// Receives the burn share when conversion is unavailable.
    pub treasury: AccountId,
    /// Receives the protocol share.
    pub protocol: AccountId,
    /// Receives the warchest share.
    pub warchest: AccountId,
}

/// Everything the vault is wired to at construction.
pub struct VaultWiring {
    /// The trade engine identity; the only caller allowed to move escrow.
    pub operator: AccountId,
    /// The administrative identity for the gated surface.
    pub admin: AccountId,
    /// The ledger account in which the vault custodies tokens.
    pub vault_account: AccountId,
    /// The native reward token that burn-fees convert into.
    pub native_token: TokenId,
    /// Fee share destinations.
    pub destinations: FeeDestinations,
    /// The token movement seam.
    pub ledger: Arc<dyn TokenLedger>,
    /// Conversion venue for burn routing; `None` means no route exists.
    pub router: Option<Arc<dyn ConversionRouter>>,
    /// Fee schedule source, re-read on every release.
    pub config: Arc<dyn ConfigProvider>,
    /// Shared protocol event log.
    pub events: Arc<EventLog>,
}

#[derive(Debug, Default)]
struct CircuitBreaker {
    tripped: AtomicBool,
    reason: Mutex<Option<String>>,
}

#[derive(Debug, Clone)]
struct EmergencyWithdrawal {
    token: TokenId,
    amount: u128,
    execute_after: DateTime<Utc>,
}

/// The escrow vault. See the module docs for the ordering contract.
pub struct EscrowVault {
    operator: AccountId,
    admin: AccountId,
    vault_account: AccountId,
    native_token: TokenId,
    destinations: FeeDestinations,
    slippage_bps: AtomicU16,
    breaker: CircuitBreaker,
    escrows: DashMap<TradeId, EscrowRecord>,
    pending: DashMap<(AccountId, TokenId), u128>,
    emergency: Mutex<Option<EmergencyWithdrawal>>,
    ledger: Arc<dyn TokenLedger>,
    router: Option<Arc<dyn ConversionRouter>>,
    config: Arc<dyn ConfigProvider>,
    events: Arc<EventLog>,
}

impl EscrowVault {
    /// Assemble a vault from its wiring.
    pub fn new(wiring: VaultWiring) -> Self {
        Self {
            operator: wiring.operator,
            admin: wiring.admin,
            vault_account: wiring.vault_account,
            native_token: wiring.native_token,
            destinations: wiring.destinations,
            slippage_bps: AtomicU16::new(DEFAULT_SLIPPAGE_BPS),
            breaker: CircuitBreaker::default(),
            escrows: DashMap::new(),
            pending: DashMap::new(),
            emergency: Mutex::new(None),
            ledger: wiring.ledger,
            router: wiring.router,
            config: wiring.config,
            events: wiring.events,
        }
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// The escrow record for a trade, if one was ever created.
    pub fn escrow(&self, trade_id: TradeId) -> Option<EscrowRecord> {
        self.escrows.get(&trade_id).map(|r| r.clone())
    }

    /// Pending pull-payment balance for a recipient in a token.
    pub fn pending_balance(&self, recipient: &AccountId, token: &TokenId) -> u128 {
        self.pending
            .get(&(*recipient, token.clone()))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Whether the conversion circuit breaker is tripped.
    pub fn circuit_breaker_tripped(&self) -> bool {
        self.breaker.tripped.load(Ordering::Acquire)
    }

    /// Why the breaker tripped, if it did.
    pub fn circuit_breaker_reason(&self) -> Option<String> {
        self.breaker.reason.lock().clone()
    }

    /// The current slippage tolerance in basis points.
    pub fn slippage_tolerance_bps(&self) -> u16 {
        self.slippage_bps.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------
    // Escrow operations (operator-gated)
    // -----------------------------------------------------------------

    /// Take custody of `amount` of `token` from `depositor` for a trade.
    ///
    /// # Errors
    ///
    /// Rejects zero amounts, repeated funding for the same trade, callers
    /// other than the bound engine, and ledger failures (in which case no
    /// record remains).
    pub fn deposit(
        &self,
        caller: &AccountId,
        trade_id: TradeId,
        token: &TokenId,
        amount: u128,
        depositor: &AccountId,
    ) -> Result<(), EscrowError> {
        self.require_operator(caller)?;
        if amount == 0 {
            return Err(EscrowError::ZeroAmount);
        }
        match self.escrows.entry(trade_id) {
            Entry::Occupied(_) => return Err(EscrowError::AlreadyFunded { trade_id }),
            Entry::Vacant(slot) => {
                slot.insert(EscrowRecord {
                    trade_id,
                    token: token.clone(),
                    amount,
                    funded: true,
                    depositor: *depositor,
                });
            }
        }
        // Record committed; the transfer is the external step. A failed
        // pull must not leave a phantom funded record behind.
        if let Err(err) = self
            .ledger
            .transfer(token, depositor, &self.vault_account, amount)
        {
            self.escrows.remove(&trade_id);
            return Err(err.into());
        }
        Ok(())
    }

    /// Release the escrow to `recipient`, splitting fees per the current
    /// schedule. The arbitrator share is charged only when `arbitrator`
    /// is supplied. Returns the net amount transferred to the recipient.
    ///
    /// # Errors
    ///
    /// Fails with [`EscrowError::NotFunded`] if the escrow was already
    /// spent; the first successful release or refund is terminal.
    pub fn release(
        &self,
        caller: &AccountId,
        trade_id: TradeId,
        recipient: &AccountId,
        arbitrator: Option<&AccountId>,
    ) -> Result<u128, EscrowError> {
        self.require_operator(caller)?;
        let (gross, token) = self.spend_record(trade_id)?;

        let schedule = self.config.snapshot().fees;
        let fees = FeeBreakdown::compute(gross, &schedule, arbitrator.is_some())?;
        let net = fees.net(gross);

        self.ledger
            .transfer(&token, &self.vault_account, recipient, net)?;

        let mut arbitrator_paid = 0;
        if let Some(arb) = arbitrator {
            if fees.arbitrator > 0 {
                self.ledger
                    .transfer(&token, &self.vault_account, arb, fees.arbitrator)?;
                arbitrator_paid = fees.arbitrator;
            }
        }

        self.credit_pending(&self.destinations.protocol, &token, fees.protocol);
        self.credit_pending(&self.destinations.warchest, &token, fees.warchest);
        let burned = self.route_burn(trade_id, &token, fees.burn)?;

        self.events.record(ProtocolEvent::FeeDistributed {
            trade_id,
            burned,
            protocol: fees.protocol,
            warchest: fees.warchest,
            arbitrator: arbitrator_paid,
        });

        Ok(net)
    }

    /// Return the full custodied amount to `recipient` with no fees
    /// withheld. Returns the refunded amount.
    pub fn refund(
        &self,
        caller: &AccountId,
        trade_id: TradeId,
        recipient: &AccountId,
    ) -> Result<u128, EscrowError> {
        self.require_operator(caller)?;
        let (amount, token) = self.spend_record(trade_id)?;
        self.ledger
            .transfer(&token, &self.vault_account, recipient, amount)?;
        Ok(amount)
    }

    // -----------------------------------------------------------------
    // Pull payments
    // -----------------------------------------------------------------

    /// Drain the caller's pending balance in `token`. Returns the amount
    /// withdrawn.
    ///
    /// # Errors
    ///
    /// Fails with [`EscrowError::NothingToWithdraw`] when the balance is
    /// zero. A ledger failure restores the balance before surfacing.
    pub fn withdraw(&self, caller: &AccountId, token: &TokenId) -> Result<u128, EscrowError> {
        let key = (*caller, token.clone());
        let amount = {
            let mut entry = self.pending.entry(key.clone()).or_insert(0);
            std::mem::take(&mut *entry)
        };
        if amount == 0 {
            return Err(EscrowError::NothingToWithdraw);
        }
        if let Err(err) = self
            .ledger
            .transfer(token, &self.vault_account, caller, amount)
        {
            *self.pending.entry(key).or_insert(0) += amount;
            return Err(err.into());
        }
        self.events.record(ProtocolEvent::WithdrawalExecuted {
            recipient: *caller,
            amount,
        });
        Ok(amount)
    }

    // -----------------------------------------------------------------
    // Administrative surface
    // -----------------------------------------------------------------

    /// Set the slippage tolerance used for burn conversions.
    ///
    /// # Errors
    ///
    /// Fails if `bps` exceeds [`MAX_SLIPPAGE_BPS`] or the caller is not
    /// the administrator.
    pub fn set_slippage_tolerance(&self, caller: &AccountId, bps: u16) -> Result<(), EscrowError> {
        self.require_admin(caller)?;
        if bps > MAX_SLIPPAGE_BPS {
            return Err(EscrowError::SlippageOutOfRange {
                requested_bps: bps,
                max_bps: MAX_SLIPPAGE_BPS,
            });
        }
        self.slippage_bps.store(bps, Ordering::Relaxed);
        Ok(())
    }

    /// Clear a tripped conversion circuit breaker.
    pub fn reset_circuit_breaker(&self, caller: &AccountId) -> Result<(), EscrowError> {
        self.require_admin(caller)?;
        self.breaker.tripped.store(false, Ordering::Release);
        *self.breaker.reason.lock() = None;
        Ok(())
    }

    /// Schedule an emergency withdrawal of vault holdings to the
    /// administrator, executable only after `delay` has elapsed.
    pub fn schedule_emergency_withdrawal(
        &self,
        caller: &AccountId,
        token: &TokenId,
        amount: u128,
        delay: Duration,
    ) -> Result<DateTime<Utc>, EscrowError> {
        self.require_admin(caller)?;
        let execute_after = Utc::now() + delay;
        *self.emergency.lock() = Some(EmergencyWithdrawal {
            token: token.clone(),
            amount,
            execute_after,
        });
        self.events
            .record(ProtocolEvent::EmergencyWithdrawalScheduled {
                token: token.clone(),
                amount,
                execute_after,
            });
        Ok(execute_after)
    }

    /// Execute a previously scheduled emergency withdrawal once its delay
    /// window has passed. Returns the amount moved.
    pub fn execute_emergency_withdrawal(&self, caller: &AccountId) -> Result<u128, EscrowError> {
        self.require_admin(caller)?;
        let planned = {
            let mut slot = self.emergency.lock();
            let Some(planned) = slot.clone() else {
                return Err(EscrowError::NoScheduledWithdrawal);
            };
            let now = Utc::now();
            if now < planned.execute_after {
                return Err(EscrowError::DelayNotElapsed {
                    execute_after: planned.execute_after,
                    now,
                });
            }
            *slot = None;
            planned
        };
        self.ledger.transfer(
            &planned.token,
            &self.vault_account,
            &self.admin,
            planned.amount,
        )?;
        Ok(planned.amount)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn require_operator(&self, caller: &AccountId) -> Result<(), EscrowError> {
        if *caller != self.operator {
            return Err(EscrowError::UnauthorizedCaller);
        }
        Ok(())
    }

    fn require_admin(&self, caller: &AccountId) -> Result<(), EscrowError> {
        if *caller != self.admin {
            return Err(EscrowError::UnauthorizedAdmin);
        }
        Ok(())
    }

    /// Zero a funded record and hand back what it held. The record is
    /// spent before any transfer so a re-entrant caller finds no balance.
    fn spend_record(&self, trade_id: TradeId) -> Result<(u128, TokenId), EscrowError> {
        let mut record = self
            .escrows
            .get_mut(&trade_id)
            .ok_or(EscrowError::NotFunded { trade_id })?;
        if !record.funded || record.amount == 0 {
            return Err(EscrowError::NotFunded { trade_id });
        }
        let amount = record.amount;
        let token = record.token.clone();
        record.amount = 0;
        record.funded = false;
        Ok((amount, token))
    }

    fn credit_pending(&self, recipient: &AccountId, token: &TokenId, amount: u128) {
        if amount == 0 {
            return;
        }
        let total = {
            let mut entry = self.pending.entry((*recipient, token.clone())).or_insert(0);
            *entry = entry.saturating_add(amount);
            *entry
        };
        self.events.record(ProtocolEvent::WithdrawalScheduled {
            recipient: *recipient,
            amount,
            total_pending: total,
        });
    }

    fn trip_breaker(&self, reason: &str) {
        self.breaker.tripped.store(true, Ordering::Release);
        *self.breaker.reason.lock() = Some(reason.to_string());
    }

    fn fall_back_to_treasury(&self, trade_id: TradeId, token: &TokenId, share: u128, reason: &str) {
        tracing::warn!(%trade_id, amount = share, reason, "burn share diverted to treasury");
        self.credit_pending(&self.destinations.treasury, token, share);
        self.events.record(ProtocolEvent::BurnFellBackToTreasury {
            trade_id,
            amount: share,
            reason: reason.to_string(),
        });
    }

    /// Route the burn share: burn directly when the fee token is the
    /// native reward token, otherwise convert with slippage protection
    /// and burn the output. Any unavailability diverts the share to the
    /// treasury's pending balance. Returns the amount actually burned.
    fn route_burn(
        &self,
        trade_id: TradeId,
        token: &TokenId,
        share: u128,
    ) -> Result<u128, EscrowError> {
        if share == 0 {
            return Ok(0);
        }
        if *token == self.native_token {
            self.ledger.burn(token, &self.vault_account, share)?;
            return Ok(share);
        }
        if self.circuit_breaker_tripped() {
            self.fall_back_to_treasury(trade_id, token, share, "conversion circuit breaker active");
            return Ok(0);
        }
        let Some(router) = self.router.as_ref() else {
            self.fall_back_to_treasury(trade_id, token, share, "no conversion route configured");
            return Ok(0);
        };

        let quote = match router.quote(token, &self.native_token, share) {
            Ok(quote) => quote,
            Err(err) => {
                self.note_router_failure(&err);
                self.fall_back_to_treasury(trade_id, token, share, &err.to_string());
                return Ok(0);
            }
        };
        let tolerance = self.slippage_bps.load(Ordering::Relaxed);
        let allowance = BasisPoints::new(tolerance)
            .ok()
            .and_then(|t| t.apply(quote))
            .unwrap_or(0);
        let min_out = quote.saturating_sub(allowance);

        match router.swap(token, &self.native_token, share, min_out) {
            Ok(out) => {
                self.ledger.burn(&self.native_token, &self.vault_account, out)?;
                Ok(out)
            }
            Err(err) => {
                self.note_router_failure(&err);
                self.fall_back_to_treasury(trade_id, token, share, &err.to_string());
                Ok(0)
            }
        }
    }

    fn note_router_failure(&self, err: &RouterError) {
        if let RouterError::PriceDeviation { .. } = err {
            self.trip_breaker(&err.to_string());
        }
    }
}

impl std::fmt::Debug for EscrowVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowVault")
            .field("escrow_count", &self.escrows.len())
            .field("pending_entries", &self.pending.len())
            .field("breaker_tripped", &self.circuit_breaker_tripped())
            .finish()
    }
}
