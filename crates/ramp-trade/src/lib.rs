//! # ramp-trade — Trade Lifecycle Engine
//!
//! The state machine coupling custody of escrowed tokens to asynchronous,
//! untrusted human actions (fiat payment, dispute claims):
//!
//! - **State** ([`state`]): The validated-enum lifecycle with its
//!   transition table.
//!
//! - **Records** ([`records`]): The [`Trade`] and [`DisputeRecord`]
//!   storage shapes with append-only transition history.
//!
//! - **Policy** ([`policy`]): The single authorization table every entry
//!   point consults, returning typed denials.
//!
//! - **Engine** ([`engine`]): The [`TradeEngine`] driving creation,
//!   funding, fiat marking, release, cancellation, expiry refund, and
//!   the dispute sub-flow with randomized arbitrator assignment.
//!
//! ## Ordering Invariant
//!
//! Every operation validates, commits the engine's own records, and only
//! then calls the escrow vault or the arbitrator selector. The ordering
//! is load-bearing: a callee may call back into the engine, and must
//! find the already-advanced state.

pub mod engine;
pub mod error;
pub mod policy;
pub mod records;
pub mod state;

pub use engine::{EngineWiring, TradeEngine};
pub use error::TradeError;
pub use policy::{authorize, TradeAction};
pub use records::{DisputeRecord, Trade, TransitionRecord, RATE_SCALE};
pub use state::TradeState;
