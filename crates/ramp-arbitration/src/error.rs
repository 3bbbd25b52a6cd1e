//! Structured error hierarchy for the arbitration subsystem.

use thiserror::Error;

use ramp_core::external::RandomnessError;
use ramp_core::{AccountId, CurrencyCode, RandomnessRequestId};

/// Errors arising from registry and selection operations.
#[derive(Debug, Error)]
pub enum ArbitrationError {
    /// The account is already registered as an arbitrator.
    #[error("arbitrator {account} is already registered")]
    AlreadyRegistered {
        /// The duplicate registrant.
        account: AccountId,
    },

    /// The account is not a registered arbitrator.
    #[error("arbitrator {account} is not registered")]
    NotRegistered {
        /// The unknown account.
        account: AccountId,
    },

    /// Registration must support at least one currency.
    #[error("arbitrator registration requires at least one supported currency")]
    EmptyCurrencySet,

    /// No active arbitrator supports the currency; assignment must be
    /// retried later or escalated.
    #[error("no eligible arbitrators for currency {currency}")]
    NoEligibleArbitrators {
        /// The unserved currency.
        currency: CurrencyCode,
    },

    /// The fulfilment does not match any pending selection.
    #[error("unknown randomness request {request_id}")]
    UnknownRequest {
        /// The unmatched correlation id.
        request_id: RandomnessRequestId,
    },

    /// The verifiable randomness source refused the request.
    #[error(transparent)]
    RandomnessUnavailable(#[from] RandomnessError),
}
