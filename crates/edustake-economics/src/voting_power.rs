//! # Voting Power
//!
//! ```text
//! voting_power = stake × delay_factor × age_factor
//! delay_factor = 1 + max_delay_bonus × min(delay, max_delay) / max_delay
//! age_factor   = 1 + max_age_bonus   × min(age, max_age)     / max_age
//! ```
//!
//! Factors are `Ratio`s, the product is taken in `u128` and floored once.
//! A dissolved neuron has no voting power.

use crate::policy::StakingPolicy;
use edustake_core::fixed_point::{Ratio, RATIO_SCALE};
use edustake_core::neuron::{Neuron, NeuronState};
use edustake_core::types::{Timestamp, Tokens};

/// Bonus factor for the remaining dissolve delay
pub fn delay_factor(policy: &StakingPolicy, delay_seconds: u64) -> Ratio {
    bonus_factor(
        delay_seconds,
        policy.max_dissolve_delay_seconds,
        policy.max_delay_bonus_bps,
    )
}

/// Bonus factor for neuron age
pub fn age_factor(policy: &StakingPolicy, age_seconds: u64) -> Ratio {
    bonus_factor(age_seconds, policy.max_age_seconds, policy.max_age_bonus_bps)
}

fn bonus_factor(value: u64, saturation: u64, max_bonus_bps: u64) -> Ratio {
    if saturation == 0 {
        return Ratio::ONE;
    }
    let capped = value.min(saturation) as u128;
    let bonus = max_bonus_bps as u128 * capped / saturation as u128;
    // bonus <= max_bonus_bps, which is a u64
    Ratio::from_bps(RATIO_SCALE + bonus as u64)
}

/// Voting power of `neuron` at `now`, saturating at `u64::MAX`
pub fn voting_power(policy: &StakingPolicy, neuron: &Neuron, now: Timestamp) -> Tokens {
    if neuron.state_at(now) == NeuronState::Dissolved {
        return 0;
    }

    let delay = delay_factor(policy, neuron.dissolve_delay_at(now));
    let age = age_factor(policy, neuron.age_seconds(now));

    let scale = RATIO_SCALE as u128;
    let power = neuron.staked_amount as u128 * delay.bps() as u128 * age.bps() as u128
        / (scale * scale);
    u64::try_from(power).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use edustake_core::neuron::DissolveState;
    use edustake_core::types::{AccountId, NeuronId};

    const T0: Timestamp = 1_700_000_000;

    fn make_neuron(stake: Tokens, delay: u64) -> Neuron {
        Neuron::new(
            NeuronId::generate(),
            AccountId::new([3u8; 32]),
            stake,
            delay,
            T0,
            edustake_core::fixed_point::Ratio::ONE,
        )
    }

    #[test]
    fn test_max_delay_doubles() {
        let policy = StakingPolicy::default();
        let neuron = make_neuron(1_000, MAX_DISSOLVE_DELAY_SECONDS);
        assert_eq!(voting_power(&policy, &neuron, T0), 2_000);
    }

    #[test]
    fn test_half_delay() {
        let policy = StakingPolicy::default();
        let neuron = make_neuron(1_000, MAX_DISSOLVE_DELAY_SECONDS / 2);
        assert_eq!(voting_power(&policy, &neuron, T0), 1_500);
    }

    #[test]
    fn test_full_age_and_delay() {
        let policy = StakingPolicy::default();
        let neuron = make_neuron(1_000, MAX_DISSOLVE_DELAY_SECONDS);
        // 1000 × 2.0 × 1.25
        assert_eq!(voting_power(&policy, &neuron, T0 + MAX_AGE_SECONDS), 2_500);
        // age bonus is capped
        assert_eq!(voting_power(&policy, &neuron, T0 + 3 * MAX_AGE_SECONDS), 2_500);
    }

    #[test]
    fn test_floor_rounding() {
        let policy = StakingPolicy::default();
        // delay factor 1.0001..., stake 3 -> 3.0003 -> 3
        let neuron = make_neuron(3, MAX_DISSOLVE_DELAY_SECONDS / 10_000 + 1);
        assert_eq!(voting_power(&policy, &neuron, T0), 3);
    }

    #[test]
    fn test_dissolved_has_no_power() {
        let policy = StakingPolicy::default();
        let mut neuron = make_neuron(1_000, MIN_DISSOLVE_DELAY_SECONDS);
        neuron.dissolve_state = DissolveState::Dissolved { dissolved_at: T0 };
        assert_eq!(voting_power(&policy, &neuron, T0 + 1), 0);
    }

    #[test]
    fn test_monotonic_in_stake_and_delay() {
        let policy = StakingPolicy::default();
        let small = make_neuron(1_000, MIN_DISSOLVE_DELAY_SECONDS);
        let bigger_stake = make_neuron(2_000, MIN_DISSOLVE_DELAY_SECONDS);
        let longer = make_neuron(1_000, MIN_DISSOLVE_DELAY_SECONDS * 4);
        let base = voting_power(&policy, &small, T0);
        assert!(voting_power(&policy, &bigger_stake, T0) > base);
        assert!(voting_power(&policy, &longer, T0) > base);
        assert!(voting_power(&policy, &small, T0 + MAX_AGE_SECONDS / 2) > base);
    }

    #[test]
    fn test_huge_stake_saturates() {
        let policy = StakingPolicy::default();
        let neuron = make_neuron(u64::MAX, MAX_DISSOLVE_DELAY_SECONDS);
        assert_eq!(voting_power(&policy, &neuron, T0), u64::MAX);
    }
}
