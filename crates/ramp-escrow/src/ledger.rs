//! The token-movement seam.
//!
//! Every unit of value the vault touches moves through the [`TokenLedger`]
//! trait, keeping the external-transfer surface in one visible place. The
//! in-memory implementation backs tests and single-process embeddings;
//! production embedders adapt their own settlement rails behind the same
//! three calls.

use dashmap::DashMap;
use thiserror::Error;

use ramp_core::{AccountId, TokenId};

/// Errors arising at the token seam.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The source account does not hold enough of the token.
    #[error("insufficient {token} balance for {account}: needed {needed}, available {available}")]
    InsufficientBalance {
        /// Token being moved.
        token: TokenId,
        /// Debited account.
        account: AccountId,
        /// Amount requested.
        needed: u128,
        /// Amount held.
        available: u128,
    },

    /// Crediting the destination would overflow its balance.
    #[error("balance overflow crediting {token} to {account}")]
    BalanceOverflow {
        /// Token being moved.
        token: TokenId,
        /// Credited account.
        account: AccountId,
    },
}

/// Token custody operations the vault relies on.
pub trait TokenLedger: Send + Sync {
    /// Current balance of `account` in `token`.
    fn balance(&self, token: &TokenId, account: &AccountId) -> u128;

    /// Move `amount` of `token` from `from` to `to`.
    fn transfer(
        &self,
        token: &TokenId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), LedgerError>;

    /// Destroy `amount` of `token` held by `from`.
    fn burn(&self, token: &TokenId, from: &AccountId, amount: u128) -> Result<(), LedgerError>;
}

/// DashMap-backed ledger for tests and single-process embeddings.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: DashMap<(TokenId, AccountId), u128>,
    burned: DashMap<TokenId, u128>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit freshly issued tokens to an account.
    pub fn mint(&self, token: &TokenId, to: &AccountId, amount: u128) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        let mut entry = self.balances.entry((token.clone(), *to)).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| LedgerError::BalanceOverflow {
                token: token.clone(),
                account: *to,
            })?;
        Ok(())
    }

    /// Total amount of `token` destroyed so far.
    pub fn total_burned(&self, token: &TokenId) -> u128 {
        self.burned.get(token).map(|v| *v).unwrap_or(0)
    }

    fn debit(&self, token: &TokenId, from: &AccountId, amount: u128) -> Result<(), LedgerError> {
        let mut entry = self.balances.entry((token.clone(), *from)).or_insert(0);
        if *entry < amount {
            return Err(LedgerError::InsufficientBalance {
                token: token.clone(),
                account: *from,
                needed: amount,
                available: *entry,
            });
        }
        *entry -= amount;
        Ok(())
    }
}

impl TokenLedger for InMemoryLedger {
    fn balance(&self, token: &TokenId, account: &AccountId) -> u128 {
        self.balances
            .get(&(token.clone(), *account))
            .map(|v| *v)
            .unwrap_or(0)
    }

    fn transfer(
        &self,
        token: &TokenId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        if amount == 0 || from == to {
            return Ok(());
        }
        self.debit(token, from, amount)?;
        if let Err(err) = self.mint(token, to, amount) {
            // Restore the debit so a failed credit leaves balances intact.
            let mut entry = self.balances.entry((token.clone(), *from)).or_insert(0);
            *entry += amount;
            return Err(err);
        }
        Ok(())
    }

    fn burn(&self, token: &TokenId, from: &AccountId, amount: u128) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        self.debit(token, from, amount)?;
        *self.burned.entry(token.clone()).or_insert(0) += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> TokenId {
        TokenId::new("USDC").unwrap()
    }

    #[test]
    fn mint_and_balance() {
        let ledger = InMemoryLedger::new();
        let account = AccountId::new();
        ledger.mint(&token(), &account, 500).unwrap();
        assert_eq!(ledger.balance(&token(), &account), 500);
    }

    #[test]
    fn transfer_moves_value() {
        let ledger = InMemoryLedger::new();
        let a = AccountId::new();
        let b = AccountId::new();
        ledger.mint(&token(), &a, 100).unwrap();
        ledger.transfer(&token(), &a, &b, 60).unwrap();
        assert_eq!(ledger.balance(&token(), &a), 40);
        assert_eq!(ledger.balance(&token(), &b), 60);
    }

    #[test]
    fn transfer_rejects_insufficient_balance() {
        let ledger = InMemoryLedger::new();
        let a = AccountId::new();
        let b = AccountId::new();
        ledger.mint(&token(), &a, 10).unwrap();
        let err = ledger.transfer(&token(), &a, &b, 11).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                needed: 11,
                available: 10,
                ..
            }
        ));
        assert_eq!(ledger.balance(&token(), &a), 10);
    }

    #[test]
    fn self_transfer_is_a_no_op() {
        let ledger = InMemoryLedger::new();
        let a = AccountId::new();
        ledger.mint(&token(), &a, 10).unwrap();
        ledger.transfer(&token(), &a, &a, 10).unwrap();
        assert_eq!(ledger.balance(&token(), &a), 10);
    }

    #[test]
    fn burn_reduces_balance_and_tracks_total() {
        let ledger = InMemoryLedger::new();
        let a = AccountId::new();
        ledger.mint(&token(), &a, 100).unwrap();
        ledger.burn(&token(), &a, 30).unwrap();
        assert_eq!(ledger.balance(&token(), &a), 70);
        assert_eq!(ledger.total_burned(&token()), 30);
    }

    #[test]
    fn burn_rejects_insufficient_balance() {
        let ledger = InMemoryLedger::new();
        let a = AccountId::new();
        assert!(ledger.burn(&token(), &a, 1).is_err());
    }
}
