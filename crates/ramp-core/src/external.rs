//! Interfaces consumed from collaborators outside the settlement core.
//!
//! The core treats these as trusted external inputs with documented
//! validation owned by the collaborator: the offer book decides what is
//! listed, the conversion router owns price sanity, the randomness source
//! owns fairness proofs. The core only reacts to their answers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{AccountId, CurrencyCode, OfferId, RandomnessRequestId, TokenId};

// ---------------------------------------------------------------------------
// Offer book
// ---------------------------------------------------------------------------

/// Listing state of an external offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferState {
    /// Open for new trade requests.
    Active,
    /// Temporarily not accepting requests.
    Paused,
    /// Removed by its owner.
    Withdrawn,
}

/// The slice of an offer the settlement core needs to validate a trade
/// request against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferSummary {
    /// Offer identifier in the external book.
    pub id: OfferId,
    /// The maker: owner of the offer, selling tokens for fiat.
    pub owner: AccountId,
    /// Listing state.
    pub state: OfferState,
    /// Token being sold.
    pub token: TokenId,
    /// Fiat currency the maker accepts.
    pub fiat_currency: CurrencyCode,
    /// Smallest acceptable trade amount in token base units.
    pub min_amount: u128,
    /// Largest acceptable trade amount in token base units.
    pub max_amount: u128,
    /// Offered exchange rate: fiat minor units per whole token, fixed by
    /// the maker and locked into the trade at creation.
    pub rate: u128,
}

/// Read access to the external offer book.
pub trait OfferProvider: Send + Sync {
    /// Look up an offer by identifier.
    fn offer(&self, id: OfferId) -> Option<OfferSummary>;
}

// ---------------------------------------------------------------------------
// Profile bookkeeping
// ---------------------------------------------------------------------------

/// Failure reported by the profile tracker.
///
/// The core never propagates these: bookkeeping runs after the state
/// commit and a failure is logged, not surfaced.
#[derive(Debug, Clone, Error)]
pub enum ProfileError {
    /// Tracker is unreachable or rejected the update.
    #[error("profile tracker unavailable: {0}")]
    Unavailable(String),
}

/// Fire-and-forget reputation/activity bookkeeping.
pub trait ProfileTracker: Send + Sync {
    /// Adjust a participant's open-trade count by `delta`.
    fn record_active_delta(&self, user: &AccountId, delta: i32) -> Result<(), ProfileError>;

    /// Record a completed trade for a participant, noting whether they
    /// prevailed in any dispute.
    fn record_completion(&self, user: &AccountId, won: bool) -> Result<(), ProfileError>;
}

// ---------------------------------------------------------------------------
// Conversion routing
// ---------------------------------------------------------------------------

/// Failure modes of the conversion router.
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// No conversion route is configured for the pair.
    #[error("no conversion route configured")]
    NoRoute,

    /// The venue price deviates too far from the reference; conversion is
    /// refused and the caller should trip its circuit breaker.
    #[error("price deviation of {deviation_bps} bps exceeds tolerance")]
    PriceDeviation {
        /// Observed deviation in basis points.
        deviation_bps: u32,
    },

    /// Execution failed for venue-side reasons.
    #[error("conversion failed: {0}")]
    Failed(String),
}

/// Token conversion venue used for burn-fee routing.
pub trait ConversionRouter: Send + Sync {
    /// Quote the expected output for converting `amount_in`.
    fn quote(
        &self,
        token_in: &TokenId,
        token_out: &TokenId,
        amount_in: u128,
    ) -> Result<u128, RouterError>;

    /// Execute the conversion, failing if the output would fall below
    /// `min_amount_out`.
    fn swap(
        &self,
        token_in: &TokenId,
        token_out: &TokenId,
        amount_in: u128,
        min_amount_out: u128,
    ) -> Result<u128, RouterError>;
}

// ---------------------------------------------------------------------------
// Verifiable randomness
// ---------------------------------------------------------------------------

/// Failure reported by the randomness source.
#[derive(Debug, Clone, Error)]
pub enum RandomnessError {
    /// The source cannot accept requests right now.
    #[error("randomness source unavailable: {0}")]
    Unavailable(String),
}

/// A verifiable randomness collaborator.
///
/// Requests are asynchronous: `request` returns a correlation id before
/// any random value exists, and the holder later feeds the fulfilment back
/// into the selector. The gap is indefinite; liveness is policed outside
/// this interface.
pub trait RandomnessSource: Send + Sync {
    /// Submit a randomness request seeded with `seed`.
    fn request(&self, seed: u64) -> Result<RandomnessRequestId, RandomnessError>;
}
