//! Versioned configuration snapshots.
//!
//! The settlement core never owns parameters; it reads a [`ConfigSnapshot`]
//! from a [`ConfigProvider`] at each call, so a parameter change binds on
//! the very next call. The snapshot carries an explicit schema `version`
//! rather than reserved padding, making persisted-shape evolution visible.

use chrono::Duration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::units::BasisPoints;

/// Fee rates applied on escrow release, expressed in basis points of the
/// gross escrowed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Share converted to the native reward token and burned.
    pub burn: BasisPoints,
    /// Share routed to the protocol destination.
    pub protocol: BasisPoints,
    /// Share routed to the warchest destination.
    pub warchest: BasisPoints,
    /// Share paid to the arbitrator, charged only on arbitrated releases.
    pub arbitrator: BasisPoints,
}

impl FeeSchedule {
    /// Create a schedule, validating that all rates together stay within
    /// the whole.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidFeeSchedule`] if the four rates
    /// sum past 10 000 bps.
    pub fn new(
        burn: BasisPoints,
        protocol: BasisPoints,
        warchest: BasisPoints,
        arbitrator: BasisPoints,
    ) -> Result<Self, ValidationError> {
        let total = u32::from(burn.value())
            + u32::from(protocol.value())
            + u32::from(warchest.value())
            + u32::from(arbitrator.value());
        if total > u32::from(BasisPoints::WHOLE) {
            return Err(ValidationError::InvalidFeeSchedule { total_bps: total });
        }
        Ok(Self {
            burn,
            protocol,
            warchest,
            arbitrator,
        })
    }

    /// Sum of the rates charged on every release, in basis points.
    pub fn base_total_bps(&self) -> u32 {
        u32::from(self.burn.value())
            + u32::from(self.protocol.value())
            + u32::from(self.warchest.value())
    }
}

/// Global bounds on trade size and per-user concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLimits {
    /// Smallest tradable amount in token base units.
    pub min_amount: u128,
    /// Largest tradable amount in token base units.
    pub max_amount: u128,
    /// Maximum simultaneously open trades per participant.
    pub max_active_trades: u32,
}

impl TradeLimits {
    /// Whether an amount sits inside the global bounds.
    pub fn contains(&self, amount: u128) -> bool {
        amount >= self.min_amount && amount <= self.max_amount
    }
}

/// Deadline windows, stored as whole seconds for a serde-stable shape.
///
/// The grace buffer is added to every deadline comparison to absorb clock
/// skew between the check and the record that produced the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePolicy {
    /// Seconds from creation until an unfunded or unpaid trade expires.
    pub funding_window_secs: i64,
    /// Seconds from fiat marking during which a dispute may open.
    pub dispute_window_secs: i64,
    /// Fixed tolerance added to every deadline comparison.
    pub grace_buffer_secs: i64,
}

impl TimePolicy {
    /// Default grace buffer: fifteen minutes.
    pub const DEFAULT_GRACE_SECS: i64 = 15 * 60;

    /// Create a policy from window durations, using the default grace.
    pub fn new(funding_window: Duration, dispute_window: Duration) -> Self {
        Self {
            funding_window_secs: funding_window.num_seconds(),
            dispute_window_secs: dispute_window.num_seconds(),
            grace_buffer_secs: Self::DEFAULT_GRACE_SECS,
        }
    }

    /// Override the grace buffer.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace_buffer_secs = grace.num_seconds();
        self
    }

    /// Funding window as a duration.
    pub fn funding_window(&self) -> Duration {
        Duration::seconds(self.funding_window_secs)
    }

    /// Dispute window as a duration.
    pub fn dispute_window(&self) -> Duration {
        Duration::seconds(self.dispute_window_secs)
    }

    /// Grace buffer as a duration.
    pub fn grace_buffer(&self) -> Duration {
        Duration::seconds(self.grace_buffer_secs)
    }
}

/// A point-in-time view of every tunable the settlement core consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Monotonic schema/content version, bumped on every change.
    pub version: u64,
    /// Fee rates applied on release.
    pub fees: FeeSchedule,
    /// Trade size and concurrency bounds.
    pub limits: TradeLimits,
    /// Deadline windows.
    pub timing: TimePolicy,
    /// Global pause: when set, no new trades are created.
    pub paused: bool,
}

/// Read-only access to the current configuration.
///
/// Implementations must return a coherent snapshot; the core re-reads on
/// every call and never caches across calls.
pub trait ConfigProvider: Send + Sync {
    /// The current snapshot.
    fn snapshot(&self) -> ConfigSnapshot;
}

/// An in-process [`ConfigProvider`] backed by a lock, suitable for tests
/// and single-process embeddings.
#[derive(Debug)]
pub struct StaticConfig {
    inner: RwLock<ConfigSnapshot>,
}

impl StaticConfig {
    /// Wrap an initial snapshot.
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Mutate the snapshot in place, bumping its version.
    pub fn update(&self, f: impl FnOnce(&mut ConfigSnapshot)) {
        let mut guard = self.inner.write();
        f(&mut guard);
        guard.version += 1;
    }
}

impl ConfigProvider for StaticConfig {
    fn snapshot(&self) -> ConfigSnapshot {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bps(v: u16) -> BasisPoints {
        BasisPoints::new(v).unwrap()
    }

    fn sample_snapshot() -> ConfigSnapshot {
        ConfigSnapshot {
            version: 1,
            fees: FeeSchedule::new(bps(50), bps(50), bps(25), bps(100)).unwrap(),
            limits: TradeLimits {
                min_amount: 10,
                max_amount: 1_000_000,
                max_active_trades: 10,
            },
            timing: TimePolicy::new(Duration::hours(24), Duration::hours(48)),
            paused: false,
        }
    }

    #[test]
    fn fee_schedule_rejects_oversum() {
        let result = FeeSchedule::new(bps(5_000), bps(4_000), bps(2_000), bps(0));
        assert!(matches!(
            result,
            Err(ValidationError::InvalidFeeSchedule { total_bps: 11_000 })
        ));
    }

    #[test]
    fn fee_schedule_base_total_excludes_arbitrator() {
        let fees = FeeSchedule::new(bps(50), bps(50), bps(25), bps(100)).unwrap();
        assert_eq!(fees.base_total_bps(), 125);
    }

    #[test]
    fn limits_contains_is_inclusive() {
        let limits = TradeLimits {
            min_amount: 10,
            max_amount: 100,
            max_active_trades: 5,
        };
        assert!(limits.contains(10));
        assert!(limits.contains(100));
        assert!(!limits.contains(9));
        assert!(!limits.contains(101));
    }

    #[test]
    fn time_policy_defaults_grace_to_fifteen_minutes() {
        let timing = TimePolicy::new(Duration::hours(1), Duration::hours(2));
        assert_eq!(timing.grace_buffer(), Duration::minutes(15));
    }

    #[test]
    fn time_policy_grace_override() {
        let timing =
            TimePolicy::new(Duration::hours(1), Duration::hours(2)).with_grace(Duration::zero());
        assert_eq!(timing.grace_buffer_secs, 0);
    }

    #[test]
    fn static_config_update_bumps_version() {
        let config = StaticConfig::new(sample_snapshot());
        config.update(|c| c.paused = true);
        let snap = config.snapshot();
        assert_eq!(snap.version, 2);
        assert!(snap.paused);
    }

    #[test]
    fn snapshot_serde_roundtrip() {
        let snap = sample_snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: ConfigSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
