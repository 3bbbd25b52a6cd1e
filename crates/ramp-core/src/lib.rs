//! # ramp-core — Foundational Types
//!
//! Shared building blocks for the ramp settlement stack:
//!
//! - **Identity** ([`identity`]): Domain-primitive newtypes for accounts,
//!   trades, offers, tokens, and fiat currency codes. String-backed
//!   identifiers validate at construction and at deserialization.
//!
//! - **Units** ([`units`]): Basis-point rates with checked application to
//!   `u128` base-unit amounts.
//!
//! - **Config** ([`config`]): Versioned, read-only configuration snapshots
//!   (fee schedule, trade limits, time policy) and the [`ConfigProvider`]
//!   interface that serves them.
//!
//! - **External** ([`external`]): Interfaces consumed from collaborators
//!   that sit outside the settlement core: offer book, profile bookkeeping,
//!   token conversion routing, and verifiable randomness.
//!
//! - **Events** ([`event`]): The protocol event vocabulary and an
//!   append-only in-memory event log for off-process indexing.

pub mod config;
pub mod error;
pub mod event;
pub mod external;
pub mod identity;
pub mod units;

// Re-export primary types for ergonomic imports.

pub use error::ValidationError;

pub use identity::{AccountId, CurrencyCode, OfferId, RandomnessRequestId, TokenId, TradeId};

pub use units::BasisPoints;

pub use config::{ConfigProvider, ConfigSnapshot, FeeSchedule, StaticConfig, TimePolicy, TradeLimits};

pub use external::{
    ConversionRouter, OfferProvider, OfferState, OfferSummary, ProfileError, ProfileTracker,
    RandomnessError, RandomnessSource, RouterError,
};

pub use event::{EventLog, EventRecord, ProtocolEvent};
