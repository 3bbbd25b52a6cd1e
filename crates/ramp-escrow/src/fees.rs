//! Pure fee-split computation.
//!
//! No state, no I/O: a gross amount and a fee schedule snapshot in, a
//! [`FeeBreakdown`] out. Each share rounds down independently, so the sum
//! of shares never exceeds the gross amount for any valid schedule.

use serde::{Deserialize, Serialize};

use ramp_core::config::FeeSchedule;

use crate::error::EscrowError;

/// The four-way fee split computed for one release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// Share destined for swap-and-burn.
    pub burn: u128,
    /// Share routed to the protocol destination.
    pub protocol: u128,
    /// Share routed to the warchest destination.
    pub warchest: u128,
    /// Share paid to the arbitrator; zero on unarbitrated releases.
    pub arbitrator: u128,
}

impl FeeBreakdown {
    /// Compute the split for a gross amount.
    ///
    /// The arbitrator share is charged only when `arbitrator_involved` is
    /// set; routine releases carry no arbitrator fee.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::FeeOverflow`] if any share computation
    /// overflows `u128`.
    pub fn compute(
        gross: u128,
        schedule: &FeeSchedule,
        arbitrator_involved: bool,
    ) -> Result<Self, EscrowError> {
        let overflow = || EscrowError::FeeOverflow { gross };
        let burn = schedule.burn.apply(gross).ok_or_else(overflow)?;
        let protocol = schedule.protocol.apply(gross).ok_or_else(overflow)?;
        let warchest = schedule.warchest.apply(gross).ok_or_else(overflow)?;
        let arbitrator = if arbitrator_involved {
            schedule.arbitrator.apply(gross).ok_or_else(overflow)?
        } else {
            0
        };
        Ok(Self {
            burn,
            protocol,
            warchest,
            arbitrator,
        })
    }

    /// Sum of all shares.
    pub fn total(&self) -> u128 {
        // Each share is at most gross * 10_000 / 10_000; the schedule
        // validation bounds the sum below gross, so plain addition holds.
        self.burn + self.protocol + self.warchest + self.arbitrator
    }

    /// Amount left for the recipient after the split.
    pub fn net(&self, gross: u128) -> u128 {
        gross - self.total()
    }
}
