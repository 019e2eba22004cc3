//! # Reward Accrual
//!
//! Maturity accrues over `(last_reward_computation_at, now]`. Each accrual
//! advances the watermark to `now`, so repeated or irregular calls never pay
//! the same second twice.
//!
//! ## Rounding
//!
//! The reward of an interval is `floor(numerator / denominator)` where
//!
//! ```text
//! numerator   = stake × rate_bps × multiplier_bps × elapsed + carried remainder
//! denominator = 10_000 × 10_000 × SECONDS_PER_YEAR
//! ```
//!
//! and `numerator mod denominator` is carried on the neuron. Splitting an
//! interval at any point therefore pays exactly the same total as accruing
//! it at once.
//!
//! ## Educational multiplier
//!
//! An interval is paid at `min(multiplier_snapshot, current)`, after which
//! the snapshot becomes `current`. Increases take effect from the first
//! accrual that observes them onwards; decreases apply immediately.

use crate::policy::StakingPolicy;
use crate::voting_power;
use edustake_core::error::{NeuronError, Result};
use edustake_core::fixed_point::{Ratio, RATIO_SCALE};
use edustake_core::neuron::{DissolveState, Neuron};
use edustake_core::types::{Timestamp, Tokens, SECONDS_PER_YEAR};
use serde::{Deserialize, Serialize};

/// Denominator of the per-interval reward fraction
pub const REWARD_DENOMINATOR: u128 =
    RATIO_SCALE as u128 * RATIO_SCALE as u128 * SECONDS_PER_YEAR as u128;

/// Result of one accrual step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualOutcome {
    /// Maturity added
    pub reward: Tokens,
    /// Rewarded seconds
    pub elapsed_seconds: u64,
    /// Multiplier the interval was paid at
    pub multiplier: Ratio,
}

/// Reward & voting-power engine
#[derive(Clone, Debug, Default)]
pub struct RewardEngine {
    policy: StakingPolicy,
}

impl RewardEngine {
    pub fn new(policy: StakingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &StakingPolicy {
        &self.policy
    }

    /// Reward for `elapsed` seconds plus the new carried remainder
    pub fn interval_reward(
        &self,
        stake: Tokens,
        multiplier: Ratio,
        elapsed: u64,
        carried: u64,
    ) -> Result<(Tokens, u64)> {
        let numerator = (stake as u128)
            .checked_mul(self.policy.base_annual_rate().bps() as u128)
            .and_then(|v| v.checked_mul(multiplier.bps() as u128))
            .and_then(|v| v.checked_mul(elapsed as u128))
            .and_then(|v| v.checked_add(carried as u128))
            .ok_or(NeuronError::ArithmeticOverflow("reward accrual"))?;

        let reward = u64::try_from(numerator / REWARD_DENOMINATOR)
            .map_err(|_| NeuronError::ArithmeticOverflow("reward accrual"))?;
        // the remainder is below REWARD_DENOMINATOR, which fits in u64
        let remainder = (numerator % REWARD_DENOMINATOR) as u64;
        Ok((reward, remainder))
    }

    /// Last second that earns rewards, given the dissolve state
    fn accrual_horizon(neuron: &Neuron, now: Timestamp) -> Timestamp {
        match neuron.dissolve_state {
            DissolveState::Dissolved { dissolved_at } => dissolved_at.min(now),
            state => state.dissolves_at().map_or(now, |at| at.min(now)),
        }
    }

    /// Integrate rewards up to `now` and advance the watermark
    ///
    /// A `now` behind the watermark (a stale reader racing a newer writer)
    /// is a no-op.
    pub fn accrue(
        &self,
        neuron: &mut Neuron,
        current_multiplier: Ratio,
        now: Timestamp,
    ) -> Result<AccrualOutcome> {
        let current = self.policy.clamp_multiplier(current_multiplier);
        let paid_at = self
            .policy
            .clamp_multiplier(neuron.multiplier_snapshot)
            .min(current);

        if now < neuron.last_reward_computation_at {
            return Ok(AccrualOutcome {
                reward: 0,
                elapsed_seconds: 0,
                multiplier: paid_at,
            });
        }

        let horizon = Self::accrual_horizon(neuron, now);
        let elapsed = horizon.saturating_sub(neuron.last_reward_computation_at);

        let (reward, remainder) = if elapsed == 0 {
            (0, neuron.maturity_remainder)
        } else {
            self.interval_reward(
                neuron.staked_amount,
                paid_at,
                elapsed,
                neuron.maturity_remainder,
            )?
        };

        let maturity = neuron
            .accumulated_maturity
            .checked_add(reward)
            .ok_or(NeuronError::ArithmeticOverflow("maturity"))?;

        neuron.accumulated_maturity = maturity;
        neuron.maturity_remainder = remainder;
        neuron.last_reward_computation_at = now;
        neuron.multiplier_snapshot = current;

        Ok(AccrualOutcome {
            reward,
            elapsed_seconds: elapsed,
            multiplier: paid_at,
        })
    }

    /// Remove maturity for a spawned neuron; `None` takes all of it
    pub fn spawn_maturity(&self, neuron: &mut Neuron, requested: Option<Tokens>) -> Result<Tokens> {
        let available = neuron.accumulated_maturity;
        let amount = match requested {
            Some(0) => return Err(NeuronError::InvalidAmount("cannot spawn zero maturity".into())),
            Some(amount) => amount,
            None if available == 0 => {
                return Err(NeuronError::InvalidAmount("no maturity to spawn".into()))
            }
            None => available,
        };

        if amount > available {
            return Err(NeuronError::InsufficientMaturity {
                requested: amount,
                available,
            });
        }
        self.policy.check_stake(amount)?;

        neuron.accumulated_maturity = available - amount;
        Ok(amount)
    }

    /// Fold all maturity into the stake
    pub fn merge_maturity(&self, neuron: &mut Neuron) -> Result<Tokens> {
        let amount = neuron.accumulated_maturity;
        if amount == 0 {
            return Err(NeuronError::InvalidAmount("no maturity to merge".into()));
        }
        let stake = neuron
            .staked_amount
            .checked_add(amount)
            .ok_or(NeuronError::ArithmeticOverflow("stake"))?;

        neuron.staked_amount = stake;
        neuron.accumulated_maturity = 0;
        Ok(amount)
    }

    /// Empty the neuron for disbursal, returning stake plus maturity
    pub fn drain(&self, neuron: &mut Neuron) -> Result<Tokens> {
        let total = neuron
            .staked_amount
            .checked_add(neuron.accumulated_maturity)
            .ok_or(NeuronError::ArithmeticOverflow("disbursal"))?;

        neuron.staked_amount = 0;
        neuron.accumulated_maturity = 0;
        neuron.maturity_remainder = 0;
        Ok(total)
    }

    /// Voting power under this engine's policy
    pub fn voting_power(&self, neuron: &Neuron, now: Timestamp) -> Tokens {
        voting_power::voting_power(&self.policy, neuron, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::dissolve;
    use edustake_core::types::{AccountId, NeuronId, ONE_TOKEN, SECONDS_PER_DAY};
    use proptest::prelude::*;

    const T0: Timestamp = 1_700_000_000;

    fn make_neuron(stake: Tokens, multiplier: Ratio) -> Neuron {
        Neuron::new(
            NeuronId::generate(),
            AccountId::new([9u8; 32]),
            stake,
            MAX_DISSOLVE_DELAY_SECONDS,
            T0,
            multiplier,
        )
    }

    #[test]
    fn test_one_year_scenario() {
        // 1000 units × 10% × 1.5x × 1 year = 150
        let engine = RewardEngine::default();
        let multiplier = Ratio::from_bps(15_000);
        let mut neuron = make_neuron(1_000, multiplier);

        let outcome = engine.accrue(&mut neuron, multiplier, T0 + 365 * SECONDS_PER_DAY).unwrap();

        assert_eq!(outcome.reward, 150);
        assert_eq!(neuron.accumulated_maturity, 150);
        assert_eq!(neuron.maturity_remainder, 0);
        assert_eq!(neuron.last_reward_computation_at, T0 + 365 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_floor_with_carry() {
        let engine = RewardEngine::default();
        let mut neuron = make_neuron(1_000, Ratio::ONE);

        // 1000 × 10% over one day = 0.2739... -> 0 paid, remainder carried
        engine.accrue(&mut neuron, Ratio::ONE, T0 + SECONDS_PER_DAY).unwrap();
        assert_eq!(neuron.accumulated_maturity, 0);
        assert!(neuron.maturity_remainder > 0);

        // the remaining 364 days complete exactly 100 units
        engine.accrue(&mut neuron, Ratio::ONE, T0 + 365 * SECONDS_PER_DAY).unwrap();
        assert_eq!(neuron.accumulated_maturity, 100);
        assert_eq!(neuron.maturity_remainder, 0);
    }

    #[test]
    fn test_zero_elapsed_is_noop() {
        let engine = RewardEngine::default();
        let mut neuron = make_neuron(ONE_TOKEN, Ratio::ONE);
        let before = neuron.clone();
        let outcome = engine.accrue(&mut neuron, Ratio::ONE, T0).unwrap();
        assert_eq!(outcome.reward, 0);
        assert_eq!(neuron, before);
    }

    #[test]
    fn test_duplicate_call_is_idempotent() {
        let engine = RewardEngine::default();
        let mut neuron = make_neuron(ONE_TOKEN, Ratio::ONE);
        let now = T0 + 40 * SECONDS_PER_DAY;
        engine.accrue(&mut neuron, Ratio::ONE, now).unwrap();
        let after_first = neuron.clone();
        engine.accrue(&mut neuron, Ratio::ONE, now).unwrap();
        assert_eq!(neuron, after_first);
    }

    #[test]
    fn test_stale_now_is_noop() {
        let engine = RewardEngine::default();
        let mut neuron = make_neuron(ONE_TOKEN, Ratio::ONE);
        engine.accrue(&mut neuron, Ratio::ONE, T0 + 100).unwrap();
        let snapshot = neuron.clone();
        engine.accrue(&mut neuron, Ratio::ONE, T0 + 50).unwrap();
        assert_eq!(neuron, snapshot);
    }

    #[test]
    fn test_multiplier_increase_is_prospective() {
        let engine = RewardEngine::default();
        let year = 365 * SECONDS_PER_DAY;
        let mut neuron = make_neuron(1_000, Ratio::ONE);

        // multiplier rose to 2.0x somewhere inside the first year: the
        // whole first year is paid at the old 1.0x
        let first = engine.accrue(&mut neuron, Ratio::from_bps(20_000), T0 + year).unwrap();
        assert_eq!(first.multiplier, Ratio::ONE);
        assert_eq!(first.reward, 100);

        // the next year sees 2.0x
        let second = engine.accrue(&mut neuron, Ratio::from_bps(20_000), T0 + 2 * year).unwrap();
        assert_eq!(second.multiplier, Ratio::from_bps(20_000));
        assert_eq!(second.reward, 200);
    }

    #[test]
    fn test_multiplier_decrease_applies_immediately() {
        let engine = RewardEngine::default();
        let mut neuron = make_neuron(1_000, Ratio::from_bps(20_000));
        let outcome = engine.accrue(&mut neuron, Ratio::ONE, T0 + 365 * SECONDS_PER_DAY).unwrap();
        assert_eq!(outcome.reward, 100);
    }

    #[test]
    fn test_multiplier_above_cap_is_clamped() {
        let engine = RewardEngine::default();
        let huge = Ratio::from_bps(90_000);
        let mut neuron = make_neuron(1_000, huge);
        let outcome = engine.accrue(&mut neuron, huge, T0 + 365 * SECONDS_PER_DAY).unwrap();
        assert_eq!(outcome.multiplier, Ratio::from_bps(MAX_MULTIPLIER_BPS));
        assert_eq!(outcome.reward, 300);
        assert_eq!(neuron.multiplier_snapshot, Ratio::from_bps(MAX_MULTIPLIER_BPS));
    }

    #[test]
    fn test_no_rewards_after_dissolved() {
        let engine = RewardEngine::default();
        let mut neuron = make_neuron(1_000, Ratio::ONE);
        neuron.dissolve_state = edustake_core::neuron::DissolveState::Locked {
            dissolve_delay_seconds: 365 * SECONDS_PER_DAY,
        };
        dissolve::start_dissolving(&mut neuron, T0).unwrap();

        // two years later only the first year earned anything
        let outcome = engine.accrue(&mut neuron, Ratio::ONE, T0 + 730 * SECONDS_PER_DAY).unwrap();
        assert_eq!(outcome.elapsed_seconds, 365 * SECONDS_PER_DAY);
        assert_eq!(neuron.accumulated_maturity, 100);
        assert_eq!(neuron.last_reward_computation_at, T0 + 730 * SECONDS_PER_DAY);

        dissolve::resolve(&mut neuron, T0 + 730 * SECONDS_PER_DAY);
        let again = engine.accrue(&mut neuron, Ratio::ONE, T0 + 900 * SECONDS_PER_DAY).unwrap();
        assert_eq!(again.reward, 0);
    }

    #[test]
    fn test_spawn_maturity() {
        let engine = RewardEngine::default();
        let mut neuron = make_neuron(ONE_TOKEN, Ratio::ONE);
        neuron.accumulated_maturity = 3 * ONE_TOKEN;

        assert!(matches!(
            engine.spawn_maturity(&mut neuron, Some(4 * ONE_TOKEN)),
            Err(NeuronError::InsufficientMaturity { .. })
        ));
        assert!(matches!(
            engine.spawn_maturity(&mut neuron, Some(ONE_TOKEN / 2)),
            Err(NeuronError::BelowMinimumStake { .. })
        ));
        assert_eq!(neuron.accumulated_maturity, 3 * ONE_TOKEN);

        assert_eq!(engine.spawn_maturity(&mut neuron, Some(ONE_TOKEN)).unwrap(), ONE_TOKEN);
        assert_eq!(neuron.accumulated_maturity, 2 * ONE_TOKEN);
        assert_eq!(engine.spawn_maturity(&mut neuron, None).unwrap(), 2 * ONE_TOKEN);
        assert_eq!(neuron.accumulated_maturity, 0);
    }

    #[test]
    fn test_merge_maturity() {
        let engine = RewardEngine::default();
        let mut neuron = make_neuron(1_000, Ratio::ONE);
        assert!(engine.merge_maturity(&mut neuron).is_err());
        neuron.accumulated_maturity = 250;
        assert_eq!(engine.merge_maturity(&mut neuron).unwrap(), 250);
        assert_eq!(neuron.staked_amount, 1_250);
        assert_eq!(neuron.accumulated_maturity, 0);
    }

    #[test]
    fn test_drain() {
        let engine = RewardEngine::default();
        let mut neuron = make_neuron(1_000, Ratio::ONE);
        neuron.accumulated_maturity = 7;
        neuron.maturity_remainder = 99;
        assert_eq!(engine.drain(&mut neuron).unwrap(), 1_007);
        assert_eq!(neuron.staked_amount, 0);
        assert_eq!(neuron.maturity_remainder, 0);
    }

    #[test]
    fn test_overflow_reported() {
        let engine = RewardEngine::default();
        let mut neuron = make_neuron(u64::MAX, Ratio::from_bps(MAX_MULTIPLIER_BPS));
        let result = engine.accrue(&mut neuron, Ratio::from_bps(MAX_MULTIPLIER_BPS), u64::MAX);
        assert!(matches!(result, Err(NeuronError::ArithmeticOverflow(_))));
    }

    proptest! {
        #[test]
        fn prop_split_accrual_matches_single(
            stake in 0u64..=1_000_000 * ONE_TOKEN,
            multiplier_bps in 10_000u64..=MAX_MULTIPLIER_BPS,
            t1 in 0u64..=3 * 365 * SECONDS_PER_DAY,
            extra in 0u64..=3 * 365 * SECONDS_PER_DAY,
        ) {
            let engine = RewardEngine::default();
            let multiplier = Ratio::from_bps(multiplier_bps);
            let mut once = make_neuron(stake, multiplier);
            let mut split = once.clone();

            engine.accrue(&mut once, multiplier, T0 + t1 + extra).unwrap();
            engine.accrue(&mut split, multiplier, T0 + t1).unwrap();
            engine.accrue(&mut split, multiplier, T0 + t1 + extra).unwrap();

            prop_assert_eq!(once.accumulated_maturity, split.accumulated_maturity);
            prop_assert_eq!(once.maturity_remainder, split.maturity_remainder);
            prop_assert_eq!(once.last_reward_computation_at, split.last_reward_computation_at);
        }
    }
}
