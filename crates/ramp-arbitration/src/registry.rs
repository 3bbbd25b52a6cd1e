//! The arbitrator registry.
//!
//! Arbitrators register with the set of fiat currencies they can judge and
//! an encryption key for off-chain evidence exchange. Deactivation is an
//! administrative action that removes an arbitrator from future candidate
//! sets only; trades already assigned to them proceed unaffected.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use ramp_core::{AccountId, CurrencyCode};

use crate::error::ArbitrationError;

/// Reputation floor in basis points: a score never drops below 10%.
pub const REPUTATION_FLOOR_BPS: u16 = 1_000;

/// Reputation ceiling in basis points: a score never exceeds 90%.
pub const REPUTATION_CEILING_BPS: u16 = 9_000;

/// Neutral reputation for an arbitrator with no history.
pub const REPUTATION_NEUTRAL_BPS: u16 = 5_000;

/// A registered arbitrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arbitrator {
    /// The arbitrator's account.
    pub account: AccountId,
    /// Fiat currencies this arbitrator will judge.
    pub currencies: BTreeSet<CurrencyCode>,
    /// Public key used to encrypt evidence toward this arbitrator.
    pub encryption_key: String,
    /// Whether the arbitrator may receive new assignments.
    pub active: bool,
    /// Disputes this arbitrator has resolved.
    pub handled_count: u64,
    /// Resolutions where the arbitrator's ruling stood.
    pub won_count: u64,
    /// When the arbitrator first registered (UTC).
    pub registered_at: DateTime<Utc>,
}

impl Arbitrator {
    /// Whether this arbitrator supports a currency.
    pub fn supports(&self, currency: &CurrencyCode) -> bool {
        self.currencies.contains(currency)
    }

    /// Reputation score in basis points, clamped away from the extremes
    /// so a small sample cannot produce a permanent 0% or 100%.
    pub fn reputation_bps(&self) -> u16 {
        if self.handled_count == 0 {
            return REPUTATION_NEUTRAL_BPS;
        }
        let raw = self.won_count.saturating_mul(10_000) / self.handled_count;
        (raw as u16).clamp(REPUTATION_FLOOR_BPS, REPUTATION_CEILING_BPS)
    }
}

/// Registry of arbitrators, keyed by account.
#[derive(Debug, Default)]
pub struct ArbitratorRegistry {
    arbitrators: DashMap<AccountId, Arbitrator>,
}

impl ArbitratorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new arbitrator supporting one or more currencies.
    ///
    /// # Errors
    ///
    /// Rejects duplicate registrations and empty currency sets.
    pub fn register(
        &self,
        account: AccountId,
        currencies: impl IntoIterator<Item = CurrencyCode>,
        encryption_key: impl Into<String>,
    ) -> Result<(), ArbitrationError> {
        let currencies: BTreeSet<CurrencyCode> = currencies.into_iter().collect();
        if currencies.is_empty() {
            return Err(ArbitrationError::EmptyCurrencySet);
        }
        if self.arbitrators.contains_key(&account) {
            return Err(ArbitrationError::AlreadyRegistered { account });
        }
        self.arbitrators.insert(
            account,
            Arbitrator {
                account,
                currencies,
                encryption_key: encryption_key.into(),
                active: true,
                handled_count: 0,
                won_count: 0,
                registered_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Add a currency to an existing registration.
    pub fn add_currency(
        &self,
        account: &AccountId,
        currency: CurrencyCode,
    ) -> Result<(), ArbitrationError> {
        let mut entry = self
            .arbitrators
            .get_mut(account)
            .ok_or(ArbitrationError::NotRegistered { account: *account })?;
        entry.currencies.insert(currency);
        Ok(())
    }

    /// Remove one currency from a registration without ending it.
    pub fn remove_currency(
        &self,
        account: &AccountId,
        currency: &CurrencyCode,
    ) -> Result<(), ArbitrationError> {
        let mut entry = self
            .arbitrators
            .get_mut(account)
            .ok_or(ArbitrationError::NotRegistered { account: *account })?;
        entry.currencies.remove(currency);
        Ok(())
    }

    /// Administratively exclude an arbitrator from new assignments.
    /// Existing assignments are unaffected.
    pub fn deactivate(&self, account: &AccountId) -> Result<(), ArbitrationError> {
        self.set_active(account, false)
    }

    /// Restore an arbitrator to the candidate pool.
    pub fn reactivate(&self, account: &AccountId) -> Result<(), ArbitrationError> {
        self.set_active(account, true)
    }

    fn set_active(&self, account: &AccountId, active: bool) -> Result<(), ArbitrationError> {
        let mut entry = self
            .arbitrators
            .get_mut(account)
            .ok_or(ArbitrationError::NotRegistered { account: *account })?;
        entry.active = active;
        Ok(())
    }

    /// Look up a registration.
    pub fn get(&self, account: &AccountId) -> Option<Arbitrator> {
        self.arbitrators.get(account).map(|a| a.clone())
    }

    /// Active arbitrators supporting `currency`, in a stable order so a
    /// random index maps to a deterministic pick.
    pub fn candidates_for(&self, currency: &CurrencyCode) -> Vec<AccountId> {
        let mut candidates: Vec<AccountId> = self
            .arbitrators
            .iter()
            .filter(|entry| entry.active && entry.supports(currency))
            .map(|entry| entry.account)
            .collect();
        candidates.sort_by_key(|a| *a.as_uuid());
        candidates
    }

    /// Record a resolved dispute for an arbitrator. `ruling_stood` notes
    /// whether the ruling held (no appeal layer is modeled here).
    ///
    /// Works for deactivated arbitrators too: deactivation is never
    /// retroactive for assignments already made.
    pub fn record_resolution(
        &self,
        account: &AccountId,
        ruling_stood: bool,
    ) -> Result<(), ArbitrationError> {
        let mut entry = self
            .arbitrators
            .get_mut(account)
            .ok_or(ArbitrationError::NotRegistered { account: *account })?;
        entry.handled_count += 1;
        if ruling_stood {
            entry.won_count += 1;
        }
        Ok(())
    }

    /// Number of registrations, active or not.
    pub fn len(&self) -> usize {
        self.arbitrators.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.arbitrators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kes() -> CurrencyCode {
        CurrencyCode::new("KES").unwrap()
    }

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    #[test]
    fn register_starts_active_and_neutral() {
        let registry = ArbitratorRegistry::new();
        let account = AccountId::new();
        registry.register(account, [kes()], "pk-1").unwrap();

        let arb = registry.get(&account).unwrap();
        assert!(arb.active);
        assert_eq!(arb.handled_count, 0);
        assert_eq!(arb.reputation_bps(), REPUTATION_NEUTRAL_BPS);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let registry = ArbitratorRegistry::new();
        let account = AccountId::new();
        registry.register(account, [kes()], "pk-1").unwrap();
        assert!(matches!(
            registry.register(account, [usd()], "pk-2"),
            Err(ArbitrationError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn empty_currency_set_rejected() {
        let registry = ArbitratorRegistry::new();
        assert!(matches!(
            registry.register(AccountId::new(), Vec::new(), "pk"),
            Err(ArbitrationError::EmptyCurrencySet)
        ));
    }

    #[test]
    fn currency_add_and_remove_keep_registration() {
        let registry = ArbitratorRegistry::new();
        let account = AccountId::new();
        registry.register(account, [kes()], "pk").unwrap();

        registry.add_currency(&account, usd()).unwrap();
        assert!(registry.get(&account).unwrap().supports(&usd()));

        registry.remove_currency(&account, &kes()).unwrap();
        let arb = registry.get(&account).unwrap();
        assert!(!arb.supports(&kes()));
        assert!(arb.supports(&usd()));
        assert!(arb.active);
    }

    #[test]
    fn candidates_filter_on_active_and_currency() {
        let registry = ArbitratorRegistry::new();
        let a = AccountId::new();
        let b = AccountId::new();
        let c = AccountId::new();
        registry.register(a, [kes()], "pk-a").unwrap();
        registry.register(b, [kes(), usd()], "pk-b").unwrap();
        registry.register(c, [usd()], "pk-c").unwrap();
        registry.deactivate(&a).unwrap();

        let kes_candidates = registry.candidates_for(&kes());
        assert_eq!(kes_candidates, vec![b]);

        let mut usd_candidates = registry.candidates_for(&usd());
        usd_candidates.sort_by_key(|x| *x.as_uuid());
        assert_eq!(usd_candidates.len(), 2);
        assert!(usd_candidates.contains(&b));
        assert!(usd_candidates.contains(&c));
    }

    #[test]
    fn candidates_are_stably_ordered() {
        let registry = ArbitratorRegistry::new();
        for _ in 0..5 {
            registry.register(AccountId::new(), [kes()], "pk").unwrap();
        }
        let first = registry.candidates_for(&kes());
        let second = registry.candidates_for(&kes());
        assert_eq!(first, second);
    }

    #[test]
    fn deactivation_is_not_retroactive_for_resolutions() {
        let registry = ArbitratorRegistry::new();
        let account = AccountId::new();
        registry.register(account, [kes()], "pk").unwrap();
        registry.deactivate(&account).unwrap();

        // Already-assigned disputes still resolve and count.
        registry.record_resolution(&account, true).unwrap();
        let arb = registry.get(&account).unwrap();
        assert_eq!(arb.handled_count, 1);
        assert_eq!(arb.won_count, 1);

        registry.reactivate(&account).unwrap();
        assert!(registry.get(&account).unwrap().active);
    }

    #[test]
    fn reputation_clamps_small_samples() {
        let registry = ArbitratorRegistry::new();
        let account = AccountId::new();
        registry.register(account, [kes()], "pk").unwrap();

        // One loss cannot drive the score to zero.
        registry.record_resolution(&account, false).unwrap();
        assert_eq!(
            registry.get(&account).unwrap().reputation_bps(),
            REPUTATION_FLOOR_BPS
        );

        // A streak of wins cannot drive it to 100% either.
        for _ in 0..9 {
            registry.record_resolution(&account, true).unwrap();
        }
        assert_eq!(
            registry.get(&account).unwrap().reputation_bps(),
            REPUTATION_CEILING_BPS
        );
    }

    #[test]
    fn reputation_midrange_is_proportional() {
        let registry = ArbitratorRegistry::new();
        let account = AccountId::new();
        registry.register(account, [kes()], "pk").unwrap();
        registry.record_resolution(&account, true).unwrap();
        registry.record_resolution(&account, true).unwrap();
        registry.record_resolution(&account, false).unwrap();
        registry.record_resolution(&account, false).unwrap();
        // 2 of 4: 50%.
        assert_eq!(registry.get(&account).unwrap().reputation_bps(), 5_000);
    }

    #[test]
    fn resolution_for_unknown_arbitrator_fails() {
        let registry = ArbitratorRegistry::new();
        assert!(matches!(
            registry.record_resolution(&AccountId::new(), true),
            Err(ArbitrationError::NotRegistered { .. })
        ));
    }

    #[test]
    fn arbitrator_serde_roundtrip() {
        let registry = ArbitratorRegistry::new();
        let account = AccountId::new();
        registry.register(account, [kes(), usd()], "pk").unwrap();
        let arb = registry.get(&account).unwrap();
        let json = serde_json::to_string(&arb).unwrap();
        let back: Arbitrator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, arb);
    }
}
