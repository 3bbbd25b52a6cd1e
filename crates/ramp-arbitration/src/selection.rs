//! Randomized arbitrator selection.
//!
//! Selection draws from the active arbitrators supporting the trade's
//! fiat currency. Two modes:
//!
//! - **Verifiable** (a [`RandomnessSource`] is configured): selection
//!   defers to an asynchronous request/fulfil pair. The candidate set is
//!   re-filtered at fulfilment time because registrations may have
//!   changed while the request was in flight.
//!
//! - **Degraded** (no source configured): several SHA-256 iterations over
//!   weak local entropy (timestamp, caller, trade id, a rolling lane
//!   seed) stand in for the verifiable value. This mode is biasable by a
//!   party that can influence timing and is logged on every use; it is a
//!   documented fallback, not a default.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use ramp_core::external::RandomnessSource;
use ramp_core::{AccountId, CurrencyCode, RandomnessRequestId, TradeId};

use crate::error::ArbitrationError;
use crate::registry::ArbitratorRegistry;

/// Hash iterations applied in degraded mode.
const DEGRADED_MIX_ROUNDS: usize = 4;

/// The outcome of starting a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// An arbitrator was chosen synchronously.
    Assigned(AccountId),
    /// Selection awaits a randomness fulfilment under this request id.
    Pending(RandomnessRequestId),
}

#[derive(Debug, Clone)]
struct PendingSelection {
    trade_id: TradeId,
    currency: CurrencyCode,
}

/// Selects arbitrators for disputes. See the module docs for modes.
pub struct ArbitratorSelector {
    registry: Arc<ArbitratorRegistry>,
    randomness: Option<Arc<dyn RandomnessSource>>,
    pending: DashMap<RandomnessRequestId, PendingSelection>,
    lane_seed: AtomicU64,
}

impl ArbitratorSelector {
    /// Create a selector over a registry. Passing `None` for the source
    /// enables the degraded local-entropy mode.
    pub fn new(
        registry: Arc<ArbitratorRegistry>,
        randomness: Option<Arc<dyn RandomnessSource>>,
    ) -> Self {
        Self {
            registry,
            randomness,
            pending: DashMap::new(),
            lane_seed: AtomicU64::new(0x5eed_c0de_0bad_cafe),
        }
    }

    /// Access the underlying registry.
    pub fn registry(&self) -> &Arc<ArbitratorRegistry> {
        &self.registry
    }

    /// Number of selections awaiting fulfilment.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Start selecting an arbitrator for a dispute.
    ///
    /// # Errors
    ///
    /// Fails with [`ArbitrationError::NoEligibleArbitrators`] when no
    /// active arbitrator supports the currency, and with
    /// [`ArbitrationError::RandomnessUnavailable`] when the verifiable
    /// source refuses the request.
    pub fn begin_selection(
        &self,
        trade_id: TradeId,
        currency: &CurrencyCode,
        caller: &AccountId,
    ) -> Result<SelectionOutcome, ArbitrationError> {
        let candidates = self.registry.candidates_for(currency);
        if candidates.is_empty() {
            return Err(ArbitrationError::NoEligibleArbitrators {
                currency: currency.clone(),
            });
        }

        if let Some(source) = &self.randomness {
            let seed = self.mix_entropy(trade_id, caller);
            let request_id = source.request(seed)?;
            self.pending.insert(
                request_id,
                PendingSelection {
                    trade_id,
                    currency: currency.clone(),
                },
            );
            return Ok(SelectionOutcome::Pending(request_id));
        }

        tracing::warn!(
            %trade_id,
            currency = %currency,
            "selecting arbitrator from weak local entropy; no verifiable randomness configured"
        );
        let value = self.mix_entropy(trade_id, caller);
        let index = (value % candidates.len() as u64) as usize;
        Ok(SelectionOutcome::Assigned(candidates[index]))
    }

    /// Apply a randomness fulfilment to its pending selection.
    ///
    /// The candidate set is filtered again here: arbitrators registered,
    /// deactivated, or re-scoped between request and fulfilment are
    /// honored at this point, not as of the request.
    ///
    /// # Errors
    ///
    /// Fails with [`ArbitrationError::UnknownRequest`] for an unmatched
    /// id, and with [`ArbitrationError::NoEligibleArbitrators`] if the
    /// candidate set emptied while the request was in flight (the pending
    /// entry is consumed either way; the dispute must restart selection).
    pub fn fulfil(
        &self,
        request_id: RandomnessRequestId,
        random_value: u64,
    ) -> Result<(TradeId, AccountId), ArbitrationError> {
        let (_, pending) = self
            .pending
            .remove(&request_id)
            .ok_or(ArbitrationError::UnknownRequest { request_id })?;

        let candidates = self.registry.candidates_for(&pending.currency);
        if candidates.is_empty() {
            return Err(ArbitrationError::NoEligibleArbitrators {
                currency: pending.currency,
            });
        }
        let index = (random_value % candidates.len() as u64) as usize;
        Ok((pending.trade_id, candidates[index]))
    }

    /// Mix weak entropy sources through repeated hashing. Each call folds
    /// its output back into the rolling lane seed so consecutive calls
    /// diverge even within one timestamp tick.
    fn mix_entropy(&self, trade_id: TradeId, caller: &AccountId) -> u64 {
        let nanos = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_micros());
        let lane = self.lane_seed.load(Ordering::Relaxed);

        let mut digest = [0u8; 32];
        for round in 0..DEGRADED_MIX_ROUNDS {
            let mut hasher = Sha256::new();
            hasher.update(digest);
            hasher.update(nanos.to_le_bytes());
            hasher.update(lane.to_le_bytes());
            hasher.update(trade_id.value().to_le_bytes());
            hasher.update(caller.as_uuid().as_bytes());
            hasher.update([round as u8]);
            digest = hasher.finalize().into();
        }

        let value = u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"));
        self.lane_seed.fetch_xor(value.rotate_left(17), Ordering::Relaxed);
        value
    }
}

impl std::fmt::Debug for ArbitratorSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitratorSelector")
            .field("verifiable", &self.randomness.is_some())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ramp_core::external::RandomnessError;

    fn kes() -> CurrencyCode {
        CurrencyCode::new("KES").unwrap()
    }

    fn registry_with(accounts: &[AccountId]) -> Arc<ArbitratorRegistry> {
        let registry = Arc::new(ArbitratorRegistry::new());
        for account in accounts {
            registry.register(*account, [kes()], "pk").unwrap();
        }
        registry
    }

    struct SequentialSource(AtomicU64);

    impl RandomnessSource for SequentialSource {
        fn request(&self, _seed: u64) -> Result<RandomnessRequestId, RandomnessError> {
            Ok(RandomnessRequestId::new(self.0.fetch_add(1, Ordering::SeqCst)))
        }
    }

    struct RefusingSource;

    impl RandomnessSource for RefusingSource {
        fn request(&self, _seed: u64) -> Result<RandomnessRequestId, RandomnessError> {
            Err(RandomnessError::Unavailable("maintenance".to_string()))
        }
    }

    #[test]
    fn no_candidates_fails_fast() {
        let selector = ArbitratorSelector::new(registry_with(&[]), None);
        let result = selector.begin_selection(TradeId::new(1), &kes(), &AccountId::new());
        assert!(matches!(
            result,
            Err(ArbitrationError::NoEligibleArbitrators { .. })
        ));
    }

    #[test]
    fn degraded_mode_assigns_from_candidate_set() {
        let accounts = [AccountId::new(), AccountId::new(), AccountId::new()];
        let selector = ArbitratorSelector::new(registry_with(&accounts), None);
        for seq in 0..10 {
            let outcome = selector
                .begin_selection(TradeId::new(seq), &kes(), &AccountId::new())
                .unwrap();
            match outcome {
                SelectionOutcome::Assigned(chosen) => assert!(accounts.contains(&chosen)),
                SelectionOutcome::Pending(_) => panic!("no source configured"),
            }
        }
        assert_eq!(selector.pending_count(), 0);
    }

    #[test]
    fn verifiable_mode_parks_a_pending_request() {
        let accounts = [AccountId::new(), AccountId::new()];
        let selector = ArbitratorSelector::new(
            registry_with(&accounts),
            Some(Arc::new(SequentialSource(AtomicU64::new(0)))),
        );

        let outcome = selector
            .begin_selection(TradeId::new(1), &kes(), &AccountId::new())
            .unwrap();
        let SelectionOutcome::Pending(request_id) = outcome else {
            panic!("expected pending selection");
        };
        assert_eq!(selector.pending_count(), 1);

        let candidates = selector.registry().candidates_for(&kes());
        let (trade_id, chosen) = selector.fulfil(request_id, 1).unwrap();
        assert_eq!(trade_id, TradeId::new(1));
        assert_eq!(chosen, candidates[1]);
        assert_eq!(selector.pending_count(), 0);
    }

    #[test]
    fn fulfil_unknown_request_fails() {
        let selector = ArbitratorSelector::new(registry_with(&[AccountId::new()]), None);
        assert!(matches!(
            selector.fulfil(RandomnessRequestId::new(99), 0),
            Err(ArbitrationError::UnknownRequest { .. })
        ));
    }

    #[test]
    fn fulfil_refilters_candidates() {
        let a = AccountId::new();
        let b = AccountId::new();
        let registry = registry_with(&[a, b]);
        let selector = ArbitratorSelector::new(
            registry.clone(),
            Some(Arc::new(SequentialSource(AtomicU64::new(0)))),
        );

        let SelectionOutcome::Pending(request_id) = selector
            .begin_selection(TradeId::new(1), &kes(), &AccountId::new())
            .unwrap()
        else {
            panic!("expected pending selection");
        };

        // One arbitrator deactivates while randomness is in flight.
        let survivors: Vec<AccountId> = {
            registry.deactivate(&a).unwrap();
            registry.candidates_for(&kes())
        };
        assert_eq!(survivors, vec![b]);

        // Any random value now maps onto the surviving candidate.
        let (_, chosen) = selector.fulfil(request_id, 7).unwrap();
        assert_eq!(chosen, b);
    }

    #[test]
    fn fulfil_with_emptied_candidate_set_fails_and_consumes() {
        let a = AccountId::new();
        let registry = registry_with(&[a]);
        let selector = ArbitratorSelector::new(
            registry.clone(),
            Some(Arc::new(SequentialSource(AtomicU64::new(0)))),
        );

        let SelectionOutcome::Pending(request_id) = selector
            .begin_selection(TradeId::new(1), &kes(), &AccountId::new())
            .unwrap()
        else {
            panic!("expected pending selection");
        };
        registry.deactivate(&a).unwrap();

        assert!(matches!(
            selector.fulfil(request_id, 0),
            Err(ArbitrationError::NoEligibleArbitrators { .. })
        ));
        // The entry is consumed; a replay is an unknown request.
        assert!(matches!(
            selector.fulfil(request_id, 0),
            Err(ArbitrationError::UnknownRequest { .. })
        ));
    }

    #[test]
    fn refusing_source_surfaces_unavailability() {
        let selector = ArbitratorSelector::new(
            registry_with(&[AccountId::new()]),
            Some(Arc::new(RefusingSource)),
        );
        let result = selector.begin_selection(TradeId::new(1), &kes(), &AccountId::new());
        assert!(matches!(
            result,
            Err(ArbitrationError::RandomnessUnavailable(_))
        ));
        assert_eq!(selector.pending_count(), 0);
    }
}
