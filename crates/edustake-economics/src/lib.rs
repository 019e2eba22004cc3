//! # EduStake Economics - Neuron Staking & Educational Rewards
//!
//! Pure computation over neuron snapshots: nothing in this crate touches
//! storage, and every function takes `now` explicitly.
//!
//! ## Components
//!
//! - **Policy**: stake and delay bounds, base rate, bonus caps
//! - **Dissolve state machine**: legal lifecycle transitions
//! - **Reward engine**: watermark-based maturity accrual, spawn and merge
//! - **Voting power**: stake scaled by delay and age bonuses
//! - **Multiplier ledger**: educational achievements per account
//!
//! ## Reward Formula
//!
//! ```text
//! reward = stake × base_rate × min(snapshot, multiplier) × elapsed / year
//! ```
//!
//! Evaluated in integer arithmetic with the sub-unit remainder carried on the
//! neuron, so splitting an interval never changes the total paid.
//!
//! ## Default Policy
//!
//! | Parameter | Value |
//! |-----------|-------|
//! | Minimum stake | 1 token |
//! | Dissolve delay | 180 days - 8 years |
//! | Base annual rate | 10% |
//! | Delay bonus | up to 2x at max delay |
//! | Age bonus | up to 1.25x at 4 years |
//! | Educational multiplier cap | 3.0x |

pub mod dissolve;
pub mod multiplier;
pub mod policy;
pub mod rewards;
pub mod voting_power;

// Re-exports
pub use multiplier::{Achievement, InMemoryMultiplierLedger, MultiplierLedger};
pub use policy::{PolicyError, StakingPolicy};
pub use rewards::{AccrualOutcome, RewardEngine};
pub use voting_power::voting_power;

/// Policy constants
pub mod constants {
    use edustake_core::types::{ONE_TOKEN, SECONDS_PER_DAY, SECONDS_PER_YEAR};

    /// Minimum stake to create a neuron: 1 token
    pub const MIN_STAKE: u64 = ONE_TOKEN;

    /// Minimum dissolve delay: 180 days
    pub const MIN_DISSOLVE_DELAY_SECONDS: u64 = 180 * SECONDS_PER_DAY;

    /// Maximum dissolve delay: 8 years
    pub const MAX_DISSOLVE_DELAY_SECONDS: u64 = 8 * SECONDS_PER_YEAR;

    /// Base annual reward rate: 10%
    pub const BASE_ANNUAL_RATE_BPS: u64 = 1_000;

    /// Extra voting power at maximum delay: +100%
    pub const MAX_DELAY_BONUS_BPS: u64 = 10_000;

    /// Age at which the age bonus saturates: 4 years
    pub const MAX_AGE_SECONDS: u64 = 4 * SECONDS_PER_YEAR;

    /// Extra voting power at maximum age: +25%
    pub const MAX_AGE_BONUS_BPS: u64 = 2_500;

    /// Educational multiplier cap: 3.0x
    pub const MAX_MULTIPLIER_BPS: u64 = 30_000;
}

pub use constants::*;
