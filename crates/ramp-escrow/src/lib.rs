//! # ramp-escrow — Custody and Fee Settlement
//!
//! Owns every unit of value the settlement core holds in trust:
//!
//! - **Fees** ([`fees`]): Pure, deterministic computation of the
//!   burn / protocol / warchest / arbitrator split from a gross amount
//!   and a fee schedule snapshot.
//!
//! - **Ledger** ([`ledger`]): The [`TokenLedger`] seam through which all
//!   token value moves, plus an in-memory implementation for tests and
//!   single-process embeddings.
//!
//! - **Vault** ([`vault`]): Per-trade escrow records, release/refund with
//!   record zeroing before any transfer, swap-and-burn routing with
//!   slippage protection and a circuit-breaker fallback to the treasury,
//!   the pull-payment payout ledger, and the gated admin surface.
//!
//! ## Ordering Invariant
//!
//! Every release and refund zeroes its escrow record before the first
//! external transfer. A callee that re-enters the vault observes the
//! already-zeroed record and fails the no-balance guard; it cannot drain
//! twice. Payouts to fee destinations never push: they accrue in the
//! pull-payment ledger and leave only through the recipient's own
//! withdrawal call.

pub mod error;
pub mod fees;
pub mod ledger;
pub mod vault;

pub use error::EscrowError;
pub use fees::FeeBreakdown;
pub use ledger::{InMemoryLedger, LedgerError, TokenLedger};
pub use vault::{EscrowRecord, EscrowVault, FeeDestinations, VaultWiring};
