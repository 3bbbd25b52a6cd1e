//! # Identity Newtypes
//!
//! Domain-primitive newtypes for identifiers throughout the settlement
//! stack. Each identifier is a distinct type: you cannot pass an
//! [`OfferId`] where a [`TradeId`] is expected.
//!
//! ## Validation
//!
//! String-based identifiers ([`TokenId`], [`CurrencyCode`]) validate format
//! at construction time. UUID-based identifiers ([`AccountId`]) and counter
//! identifiers ([`TradeId`], [`OfferId`], [`RandomnessRequestId`]) are
//! always valid by construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Helper macro to implement `Deserialize` for string newtypes that must
/// validate their contents. Deserializes as a plain `String`, then routes
/// through the type's `new()` constructor so that invalid values are
/// rejected at deserialization time, not silently accepted.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// UUID-based identifiers (always valid by construction)
// ---------------------------------------------------------------------------

/// A unique identifier for a participant account: buyer, seller,
/// arbitrator, or a protocol destination such as the treasury.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Create a new random account identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an account identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AccountId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Uuid>().map(Self)
    }
}

// ---------------------------------------------------------------------------
// Counter identifiers
// ---------------------------------------------------------------------------

/// A sequential trade identifier, assigned by the trade engine at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(u64);

impl TradeId {
    /// Wrap a raw sequence number.
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The raw sequence number.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "trade:{}", self.0)
    }
}

/// An identifier referencing an entry in the external offer book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferId(u64);

impl OfferId {
    /// Wrap a raw offer number.
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The raw offer number.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "offer:{}", self.0)
    }
}

/// Correlation identifier for a two-phase randomness request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RandomnessRequestId(u64);

impl RandomnessRequestId {
    /// Wrap a raw request number.
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The raw request number.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RandomnessRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rand-req:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// String-based identifiers (validated at construction)
// ---------------------------------------------------------------------------

/// Identifier of an escrowable token asset.
///
/// # Validation
///
/// Non-empty, at most 32 characters, ASCII alphanumeric plus `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TokenId(String);

impl_validating_deserialize!(TokenId);

impl TokenId {
    /// Maximum identifier length in bytes.
    pub const MAX_LEN: usize = 32;

    /// Create a token identifier, validating format.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTokenId`] if the string is empty,
    /// longer than [`MAX_LEN`](Self::MAX_LEN), or contains characters
    /// outside ASCII alphanumerics, `-`, and `_`.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let valid = !s.is_empty()
            && s.len() <= Self::MAX_LEN
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ValidationError::InvalidTokenId(s));
        }
        Ok(Self(s))
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fiat currency code in ISO 4217 shape: exactly three ASCII uppercase
/// letters (e.g. `"USD"`, `"KES"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CurrencyCode(String);

impl_validating_deserialize!(CurrencyCode);

impl CurrencyCode {
    /// Create a currency code, validating shape.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidCurrencyCode`] unless the string
    /// is exactly three ASCII uppercase letters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let valid = s.len() == 3 && s.chars().all(|c| c.is_ascii_uppercase());
        if !valid {
            return Err(ValidationError::InvalidCurrencyCode(s));
        }
        Ok(Self(s))
    }

    /// Access the code string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
