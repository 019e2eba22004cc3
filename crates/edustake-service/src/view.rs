//! Read-only projections returned to callers

use edustake_core::neuron::{DissolveState, Neuron, NeuronState};
use edustake_core::types::{AccountId, NeuronId, Timestamp, Tokens};
use edustake_economics::rewards::RewardEngine;
use serde::Serialize;

/// A neuron as seen at one instant
///
/// State and voting power are derived against the read time and never
/// written back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NeuronView {
    pub id: NeuronId,
    pub owner: AccountId,
    pub staked_amount: Tokens,
    pub state: NeuronState,
    /// Remaining delay: full delay when locked, countdown when dissolving
    pub dissolve_delay_seconds: u64,
    pub accumulated_maturity: Tokens,
    pub voting_power: Tokens,
    pub created_at: Timestamp,
    /// When dissolving completes, if the timer is running or done
    pub dissolves_at: Option<Timestamp>,
    pub followees: Vec<NeuronId>,
    /// A payout has started; the neuron accepts only `disburse`
    pub disbursing: bool,
}

impl NeuronView {
    pub fn project(neuron: &Neuron, engine: &RewardEngine, now: Timestamp) -> Self {
        let resolved = neuron.dissolve_state.resolve(now);
        Self {
            id: neuron.id,
            owner: neuron.owner,
            staked_amount: neuron.staked_amount,
            state: resolved.stored_state(),
            dissolve_delay_seconds: resolved.dissolve_delay_seconds(now),
            accumulated_maturity: neuron.accumulated_maturity,
            voting_power: engine.voting_power(neuron, now),
            created_at: neuron.created_at,
            dissolves_at: match resolved {
                DissolveState::Dissolved { dissolved_at } => Some(dissolved_at),
                state => state.dissolves_at(),
            },
            followees: neuron.followees.iter().copied().collect(),
            disbursing: neuron.is_disbursing(),
        }
    }
}

/// Portfolio totals for one account
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OwnerSummary {
    pub owner: Option<AccountId>,
    pub neuron_count: usize,
    pub locked: usize,
    pub dissolving: usize,
    pub dissolved: usize,
    pub total_staked: Tokens,
    pub total_maturity: Tokens,
    pub total_voting_power: Tokens,
}

impl OwnerSummary {
    pub fn from_views(owner: AccountId, views: &[NeuronView]) -> Self {
        let mut summary = Self {
            owner: Some(owner),
            ..Self::default()
        };
        for view in views {
            summary.neuron_count += 1;
            match view.state {
                NeuronState::Locked => summary.locked += 1,
                NeuronState::Dissolving => summary.dissolving += 1,
                NeuronState::Dissolved => summary.dissolved += 1,
            }
            summary.total_staked = summary.total_staked.saturating_add(view.staked_amount);
            summary.total_maturity = summary
                .total_maturity
                .saturating_add(view.accumulated_maturity);
            summary.total_voting_power = summary
                .total_voting_power
                .saturating_add(view.voting_power);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edustake_core::fixed_point::Ratio;
    use edustake_core::types::SECONDS_PER_DAY;

    fn neuron(delay: u64) -> Neuron {
        Neuron::new(
            NeuronId::generate(),
            AccountId::new([9u8; 32]),
            1_000,
            delay,
            0,
            Ratio::ONE,
        )
    }

    #[test]
    fn test_projection_resolves_lazily() {
        let engine = RewardEngine::default();
        let mut n = neuron(200 * SECONDS_PER_DAY);
        n.dissolve_state = DissolveState::Dissolving {
            dissolving_since: 0,
            dissolve_delay_seconds: 200 * SECONDS_PER_DAY,
        };

        let mid = NeuronView::project(&n, &engine, 50 * SECONDS_PER_DAY);
        assert_eq!(mid.state, NeuronState::Dissolving);
        assert_eq!(mid.dissolve_delay_seconds, 150 * SECONDS_PER_DAY);

        let after = NeuronView::project(&n, &engine, 201 * SECONDS_PER_DAY);
        assert_eq!(after.state, NeuronState::Dissolved);
        assert_eq!(after.voting_power, 0);
        assert_eq!(after.dissolves_at, Some(200 * SECONDS_PER_DAY));
        assert_eq!(
            NeuronView::project(&n, &engine, 201 * SECONDS_PER_DAY),
            after
        );
    }

    #[test]
    fn test_summary_totals() {
        let engine = RewardEngine::default();
        let mut a = neuron(200 * SECONDS_PER_DAY);
        a.accumulated_maturity = 7;
        let mut b = neuron(300 * SECONDS_PER_DAY);
        b.dissolve_state = DissolveState::Dissolved { dissolved_at: 0 };

        let views = vec![
            NeuronView::project(&a, &engine, 10),
            NeuronView::project(&b, &engine, 10),
        ];
        let summary = OwnerSummary::from_views(a.owner, &views);
        assert_eq!(summary.neuron_count, 2);
        assert_eq!(summary.locked, 1);
        assert_eq!(summary.dissolved, 1);
        assert_eq!(summary.total_staked, 2_000);
        assert_eq!(summary.total_maturity, 7);
        assert_eq!(summary.total_voting_power, views[0].voting_power);
    }
}
