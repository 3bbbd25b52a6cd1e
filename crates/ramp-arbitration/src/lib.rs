//! # ramp-arbitration — Arbitrator Assignment
//!
//! Maintains the pool of dispute arbitrators and selects one when a
//! dispute opens:
//!
//! - **Registry** ([`registry`]): Currency-scoped arbitrator registration,
//!   administrative activation state, and handled/won reputation counters
//!   with a clamped score.
//!
//! - **Selection** ([`selection`]): Randomized selection among active
//!   arbitrators supporting the trade's fiat currency. With a verifiable
//!   randomness source configured, selection is a two-phase
//!   request/fulfil pair; without one, a documented degraded mode mixes
//!   weak local entropy instead.

pub mod error;
pub mod registry;
pub mod selection;

pub use error::ArbitrationError;
pub use registry::{Arbitrator, ArbitratorRegistry};
pub use selection::{ArbitratorSelector, SelectionOutcome};
