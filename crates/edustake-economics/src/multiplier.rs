//! # Educational Multiplier Ledger
//!
//! Completed achievements per account and the multiplier they earn.
//!
//! ## Stacking
//!
//! Boosts stack additively on a 1.0x base and the sum is capped:
//!
//! | Achievement | Boost |
//! |-------------|-------|
//! | Blockchain Basics | +0.1x |
//! | DeFi Explorer | +0.2x |
//! | Smart Contract Developer | +0.3x |
//! | Learning Path Master | +0.4x |
//!
//! Completions are never revoked, so an account's multiplier never
//! decreases.

use async_trait::async_trait;
use edustake_core::error::Result;
use edustake_core::fixed_point::Ratio;
use edustake_core::types::AccountId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Completed learning achievement
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Achievement {
    BlockchainBasics,
    DefiExplorer,
    SmartContractDeveloper,
    LearningPathMaster,
    /// Course-specific boost registered by the course catalogue
    Custom { code: String, boost_bps: u64 },
}

impl Achievement {
    /// Multiplier increment earned by this achievement
    pub fn boost(&self) -> Ratio {
        match self {
            Self::BlockchainBasics => Ratio::from_bps(1_000),
            Self::DefiExplorer => Ratio::from_bps(2_000),
            Self::SmartContractDeveloper => Ratio::from_bps(3_000),
            Self::LearningPathMaster => Ratio::from_bps(4_000),
            Self::Custom { boost_bps, .. } => Ratio::from_bps(*boost_bps),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::BlockchainBasics => "Blockchain Basics",
            Self::DefiExplorer => "DeFi Explorer",
            Self::SmartContractDeveloper => "Smart Contract Developer",
            Self::LearningPathMaster => "Learning Path Master",
            Self::Custom { code, .. } => code,
        }
    }
}

/// Additive composition of boosts on a 1.0x base, capped at `cap`
pub fn compose<'a>(achievements: impl IntoIterator<Item = &'a Achievement>, cap: Ratio) -> Ratio {
    achievements
        .into_iter()
        .fold(Ratio::ONE, |acc, a| acc.saturating_add(a.boost()))
        .clamp_to(cap)
}

/// Read-only view of educational multipliers
#[async_trait]
pub trait MultiplierLedger: Send + Sync {
    /// Current multiplier for `account`
    async fn multiplier(&self, account: &AccountId) -> Result<Ratio>;
}

/// In-process multiplier ledger
pub struct InMemoryMultiplierLedger {
    completions: RwLock<HashMap<AccountId, Vec<Achievement>>>,
    cap: Ratio,
}

impl InMemoryMultiplierLedger {
    /// Create a ledger that caps multipliers at `cap`
    pub fn with_cap(cap: Ratio) -> Self {
        Self {
            completions: RwLock::new(HashMap::new()),
            cap,
        }
    }

    /// Record a completion. Returns false if it was already recorded.
    pub fn record_completion(&self, account: AccountId, achievement: Achievement) -> bool {
        let mut completions = self.completions.write();
        let entry = completions.entry(account).or_default();
        if entry.contains(&achievement) {
            return false;
        }
        tracing::debug!(%account, achievement = achievement.name(), "achievement recorded");
        entry.push(achievement);
        true
    }

    pub fn achievements(&self, account: &AccountId) -> Vec<Achievement> {
        self.completions
            .read()
            .get(account)
            .cloned()
            .unwrap_or_default()
    }

    pub fn multiplier_of(&self, account: &AccountId) -> Ratio {
        let completions = self.completions.read();
        match completions.get(account) {
            Some(list) => compose(list, self.cap),
            None => Ratio::ONE.clamp_to(self.cap),
        }
    }
}

impl Default for InMemoryMultiplierLedger {
    fn default() -> Self {
        Self::with_cap(Ratio::from_bps(crate::constants::MAX_MULTIPLIER_BPS))
    }
}

#[async_trait]
impl MultiplierLedger for InMemoryMultiplierLedger {
    async fn multiplier(&self, account: &AccountId) -> Result<Ratio> {
        Ok(self.multiplier_of(account))
    }
}
