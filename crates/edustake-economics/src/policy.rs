//! # Staking Policy
//!
//! Tunable bounds and rates. Deserializable so it can be embedded directly
//! in the service configuration.

use crate::constants::*;
use edustake_core::error::{NeuronError, Result};
use edustake_core::fixed_point::Ratio;
use edustake_core::types::Tokens;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Staking policy parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingPolicy {
    /// Minimum stake for a new or spawned neuron (e8s)
    #[serde(default = "default_min_stake")]
    pub min_stake: Tokens,

    /// Lower bound for the initial dissolve delay
    #[serde(default = "default_min_delay")]
    pub min_dissolve_delay_seconds: u64,

    /// Upper bound for any dissolve delay
    #[serde(default = "default_max_delay")]
    pub max_dissolve_delay_seconds: u64,

    /// Annual reward rate in 1/10_000
    #[serde(default = "default_base_rate")]
    pub base_annual_rate_bps: u64,

    /// Voting power bonus reached at the maximum delay
    #[serde(default = "default_delay_bonus")]
    pub max_delay_bonus_bps: u64,

    /// Age at which the age bonus stops growing
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,

    /// Voting power bonus reached at `max_age_seconds`
    #[serde(default = "default_age_bonus")]
    pub max_age_bonus_bps: u64,

    /// Cap on the educational multiplier
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier_bps: u64,

    /// Dissolve delay given to neurons created by spawning maturity
    #[serde(default = "default_min_delay")]
    pub spawn_dissolve_delay_seconds: u64,
}

fn default_min_stake() -> Tokens {
    MIN_STAKE
}

fn default_min_delay() -> u64 {
    MIN_DISSOLVE_DELAY_SECONDS
}

fn default_max_delay() -> u64 {
    MAX_DISSOLVE_DELAY_SECONDS
}

fn default_base_rate() -> u64 {
    BASE_ANNUAL_RATE_BPS
}

fn default_delay_bonus() -> u64 {
    MAX_DELAY_BONUS_BPS
}

fn default_max_age() -> u64 {
    MAX_AGE_SECONDS
}

fn default_age_bonus() -> u64 {
    MAX_AGE_BONUS_BPS
}

fn default_max_multiplier() -> u64 {
    MAX_MULTIPLIER_BPS
}

impl Default for StakingPolicy {
    fn default() -> Self {
        Self {
            min_stake: default_min_stake(),
            min_dissolve_delay_seconds: default_min_delay(),
            max_dissolve_delay_seconds: default_max_delay(),
            base_annual_rate_bps: default_base_rate(),
            max_delay_bonus_bps: default_delay_bonus(),
            max_age_seconds: default_max_age(),
            max_age_bonus_bps: default_age_bonus(),
            max_multiplier_bps: default_max_multiplier(),
            spawn_dissolve_delay_seconds: default_min_delay(),
        }
    }
}

impl StakingPolicy {
    pub fn base_annual_rate(&self) -> Ratio {
        Ratio::from_bps(self.base_annual_rate_bps)
    }

    pub fn max_multiplier(&self) -> Ratio {
        Ratio::from_bps(self.max_multiplier_bps)
    }

    /// Clamp a raw multiplier into `[0, max_multiplier]`
    pub fn clamp_multiplier(&self, raw: Ratio) -> Ratio {
        if raw > self.max_multiplier() {
            tracing::debug!(raw = %raw, cap = %self.max_multiplier(), "clamping multiplier");
        }
        raw.clamp_to(self.max_multiplier())
    }

    /// Check a stake for a new neuron
    pub fn check_stake(&self, amount: Tokens) -> Result<()> {
        if amount < self.min_stake {
            return Err(NeuronError::BelowMinimumStake {
                amount,
                minimum: self.min_stake,
            });
        }
        Ok(())
    }

    /// Check the dissolve delay of a new neuron
    pub fn check_initial_delay(&self, delay: u64) -> Result<()> {
        if delay < self.min_dissolve_delay_seconds || delay > self.max_dissolve_delay_seconds {
            return Err(NeuronError::DelayOutOfRange {
                requested: delay,
                min: self.min_dissolve_delay_seconds,
                max: self.max_dissolve_delay_seconds,
            });
        }
        Ok(())
    }

    /// Check internal consistency
    pub fn validate(&self) -> std::result::Result<(), PolicyError> {
        if self.min_dissolve_delay_seconds > self.max_dissolve_delay_seconds {
            return Err(PolicyError::DelayBounds {
                min: self.min_dissolve_delay_seconds,
                max: self.max_dissolve_delay_seconds,
            });
        }
        if self.max_dissolve_delay_seconds == 0 {
            return Err(PolicyError::Zero("max_dissolve_delay_seconds"));
        }
        if self.max_age_seconds == 0 {
            return Err(PolicyError::Zero("max_age_seconds"));
        }
        if self.min_stake == 0 {
            return Err(PolicyError::Zero("min_stake"));
        }
        if self.max_multiplier_bps < Ratio::ONE.bps() {
            return Err(PolicyError::MultiplierCap(self.max_multiplier_bps));
        }
        if self.spawn_dissolve_delay_seconds < self.min_dissolve_delay_seconds
            || self.spawn_dissolve_delay_seconds > self.max_dissolve_delay_seconds
        {
            return Err(PolicyError::SpawnDelay(self.spawn_dissolve_delay_seconds));
        }
        Ok(())
    }
}

/// Inconsistent policy configuration
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Minimum dissolve delay {min}s exceeds maximum {max}s")]
    DelayBounds { min: u64, max: u64 },

    #[error("{0} must be non-zero")]
    Zero(&'static str),

    #[error("Multiplier cap {0} bps is below 1.0x")]
    MultiplierCap(u64),

    #[error("Spawn dissolve delay {0}s is outside the delay bounds")]
    SpawnDelay(u64),
}
