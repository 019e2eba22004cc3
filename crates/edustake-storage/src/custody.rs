//! Token custody boundary
//!
//! Staking moves liquid tokens from an owner's account into custody and
//! disbursal moves them back. Disbursals go through `transfer`, which is
//! keyed by a [`TransferId`] so that retrying an interrupted payout never
//! pays twice. The service only sees the trait; the in-memory ledger backs
//! tests and the simulator.

use async_trait::async_trait;
use edustake_core::error::{NeuronError, Result};
use edustake_core::types::{AccountId, Tokens, TransferId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

#[async_trait]
pub trait TokenCustody: Send + Sync {
    /// Take `amount` from the owner's liquid balance
    async fn debit(&self, owner: &AccountId, amount: Tokens) -> Result<()>;

    /// Return `amount` to the owner's liquid balance
    async fn credit(&self, owner: &AccountId, amount: Tokens) -> Result<()>;

    /// Credit `amount` at most once per `transfer`; repeating a settled
    /// transfer succeeds without moving tokens
    async fn transfer(&self, transfer: &TransferId, owner: &AccountId, amount: Tokens) -> Result<()>;
}

/// Liquid balances held in memory
pub struct InMemoryTokenLedger {
    balances: RwLock<HashMap<AccountId, Tokens>>,
    settled: RwLock<HashSet<TransferId>>,
    online: AtomicBool,
}

impl InMemoryTokenLedger {
    pub fn new() -> Self {
        Self {
            balances: RwLock::new(HashMap::new()),
            settled: RwLock::new(HashSet::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Mint liquid tokens to an account
    pub fn deposit(&self, owner: AccountId, amount: Tokens) {
        let mut balances = self.balances.write();
        let balance = balances.entry(owner).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn balance_of(&self, owner: &AccountId) -> Tokens {
        self.balances.read().get(owner).copied().unwrap_or(0)
    }

    pub fn is_settled(&self, transfer: &TransferId) -> bool {
        self.settled.read().contains(transfer)
    }

    /// Simulate the ledger going away or coming back
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(NeuronError::DependencyUnavailable("token ledger offline".into()))
        }
    }
}

impl Default for InMemoryTokenLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenCustody for InMemoryTokenLedger {
    async fn debit(&self, owner: &AccountId, amount: Tokens) -> Result<()> {
        self.ensure_online()?;
        let mut balances = self.balances.write();
        let available = balances.get(owner).copied().unwrap_or(0);
        if available < amount {
            return Err(NeuronError::InsufficientFunds {
                requested: amount,
                available,
            });
        }
        balances.insert(*owner, available - amount);
        Ok(())
    }

    async fn credit(&self, owner: &AccountId, amount: Tokens) -> Result<()> {
        self.ensure_online()?;
        let mut balances = self.balances.write();
        let balance = balances.entry(*owner).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(NeuronError::ArithmeticOverflow("liquid balance"))?;
        Ok(())
    }

    async fn transfer(&self, transfer: &TransferId, owner: &AccountId, amount: Tokens) -> Result<()> {
        self.ensure_online()?;
        let mut settled = self.settled.write();
        if settled.contains(transfer) {
            tracing::debug!(transfer_id = %transfer, "transfer already settled");
            return Ok(());
        }
        let mut balances = self.balances.write();
        let balance = balances.entry(*owner).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(NeuronError::ArithmeticOverflow("liquid balance"))?;
        settled.insert(*transfer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_debit_and_credit() {
        let ledger = InMemoryTokenLedger::new();
        let alice = AccountId::new([1u8; 32]);
        ledger.deposit(alice, 100);

        ledger.debit(&alice, 40).await.unwrap();
        assert_eq!(ledger.balance_of(&alice), 60);

        ledger.credit(&alice, 15).await.unwrap();
        assert_eq!(ledger.balance_of(&alice), 75);
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let ledger = InMemoryTokenLedger::new();
        let bob = AccountId::new([2u8; 32]);
        ledger.deposit(bob, 10);

        assert_eq!(
            ledger.debit(&bob, 11).await,
            Err(NeuronError::InsufficientFunds {
                requested: 11,
                available: 10
            })
        );
        assert_eq!(ledger.balance_of(&bob), 10);
    }

    #[tokio::test]
    async fn test_transfer_settles_once() {
        let ledger = InMemoryTokenLedger::new();
        let carol = AccountId::new([4u8; 32]);
        let transfer = TransferId::generate();

        ledger.transfer(&transfer, &carol, 25).await.unwrap();
        ledger.transfer(&transfer, &carol, 25).await.unwrap();
        assert_eq!(ledger.balance_of(&carol), 25);
        assert!(ledger.is_settled(&transfer));

        ledger.transfer(&TransferId::generate(), &carol, 5).await.unwrap();
        assert_eq!(ledger.balance_of(&carol), 30);
    }

    #[tokio::test]
    async fn test_offline_transfer_is_not_settled() {
        let ledger = InMemoryTokenLedger::new();
        let carol = AccountId::new([4u8; 32]);
        let transfer = TransferId::generate();

        ledger.set_online(false);
        assert!(ledger.transfer(&transfer, &carol, 25).await.is_err());
        assert!(!ledger.is_settled(&transfer));

        ledger.set_online(true);
        ledger.transfer(&transfer, &carol, 25).await.unwrap();
        assert_eq!(ledger.balance_of(&carol), 25);
    }

    #[tokio::test]
    async fn test_offline_ledger() {
        let ledger = InMemoryTokenLedger::new();
        ledger.set_online(false);
        let err = ledger.credit(&AccountId::new([3u8; 32]), 1).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
