//! Neuron record and dissolve lifecycle state
//!
//! The lifecycle is a tagged variant rather than a status string plus loose
//! fields: `dissolving_since` only exists inside `Dissolving`, and a
//! `Dissolved` neuron has no delay at all. The transition from `Dissolving`
//! to `Dissolved` is never written by a timer; it is derived from the stored
//! fields and `now` by [`DissolveState::resolve`].

use crate::fixed_point::Ratio;
use crate::types::{AccountId, NeuronId, Timestamp, Tokens, TransferId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Coarse lifecycle state, as reported to callers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeuronState {
    Locked,
    Dissolving,
    Dissolved,
}

impl NeuronState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Dissolving => "dissolving",
            Self::Dissolved => "dissolved",
        }
    }
}

impl fmt::Display for NeuronState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stored lifecycle state with its timing data
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DissolveState {
    /// Timer stopped; the full delay will count down once dissolving starts
    Locked { dissolve_delay_seconds: u64 },
    /// Timer running since `dissolving_since`
    Dissolving {
        dissolving_since: Timestamp,
        dissolve_delay_seconds: u64,
    },
    /// Funds are liquid
    Dissolved { dissolved_at: Timestamp },
}

impl DissolveState {
    /// State as stored, without lazy resolution
    pub fn stored_state(&self) -> NeuronState {
        match self {
            Self::Locked { .. } => NeuronState::Locked,
            Self::Dissolving { .. } => NeuronState::Dissolving,
            Self::Dissolved { .. } => NeuronState::Dissolved,
        }
    }

    /// Moment a dissolving neuron becomes dissolved
    pub fn dissolves_at(&self) -> Option<Timestamp> {
        match *self {
            Self::Dissolving {
                dissolving_since,
                dissolve_delay_seconds,
            } => Some(dissolving_since.saturating_add(dissolve_delay_seconds)),
            _ => None,
        }
    }

    /// Apply the time-driven `Dissolving -> Dissolved` transition
    pub fn resolve(&self, now: Timestamp) -> Self {
        match self.dissolves_at() {
            Some(at) if now >= at => Self::Dissolved { dissolved_at: at },
            _ => *self,
        }
    }

    /// Lifecycle state at `now`
    pub fn state_at(&self, now: Timestamp) -> NeuronState {
        self.resolve(now).stored_state()
    }

    /// Remaining delay at `now`: the configured delay while locked, the
    /// countdown while dissolving, zero once dissolved
    pub fn dissolve_delay_seconds(&self, now: Timestamp) -> u64 {
        match self.resolve(now) {
            Self::Locked {
                dissolve_delay_seconds,
            } => dissolve_delay_seconds,
            Self::Dissolving {
                dissolving_since,
                dissolve_delay_seconds,
            } => dissolve_delay_seconds.saturating_sub(now.saturating_sub(dissolving_since)),
            Self::Dissolved { .. } => 0,
        }
    }

    pub fn dissolving_since(&self) -> Option<Timestamp> {
        match *self {
            Self::Dissolving {
                dissolving_since, ..
            } => Some(dissolving_since),
            _ => None,
        }
    }
}

/// Payout recorded on a neuron before its tokens leave custody
///
/// While set, the neuron's balances are frozen: only the disbursal that
/// created it may finish or withdraw it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDisbursal {
    pub transfer_id: TransferId,
    pub amount: Tokens,
    pub started_at: Timestamp,
}

/// A neuron: staked tokens plus their lock state and accrued maturity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neuron {
    /// Immutable identifier
    pub id: NeuronId,

    /// Controlling account
    pub owner: AccountId,

    /// Staked amount in e8s
    pub staked_amount: Tokens,

    /// Lifecycle state
    pub dissolve_state: DissolveState,

    /// Creation time, drives the age bonus
    pub created_at: Timestamp,

    /// Rewards accrued but not yet spawned or merged
    pub accumulated_maturity: Tokens,

    /// Sub-unit reward carried between accruals, always below the reward
    /// denominator
    pub maturity_remainder: u64,

    /// Rewards are integrated up to this moment and never again before it
    pub last_reward_computation_at: Timestamp,

    /// Educational multiplier observed at the watermark
    pub multiplier_snapshot: Ratio,

    /// Neurons this neuron defers to (stored, not interpreted)
    pub followees: BTreeSet<NeuronId>,

    /// Disbursal whose transfer has started but not been settled
    pub pending_disbursal: Option<PendingDisbursal>,
}

impl Neuron {
    /// Create a freshly locked neuron
    pub fn new(
        id: NeuronId,
        owner: AccountId,
        staked_amount: Tokens,
        dissolve_delay_seconds: u64,
        now: Timestamp,
        multiplier: Ratio,
    ) -> Self {
        Self {
            id,
            owner,
            staked_amount,
            dissolve_state: DissolveState::Locked {
                dissolve_delay_seconds,
            },
            created_at: now,
            accumulated_maturity: 0,
            maturity_remainder: 0,
            last_reward_computation_at: now,
            multiplier_snapshot: multiplier,
            followees: BTreeSet::new(),
            pending_disbursal: None,
        }
    }

    /// Lifecycle state at `now` (lazily resolved)
    pub fn state_at(&self, now: Timestamp) -> NeuronState {
        self.dissolve_state.state_at(now)
    }

    /// Remaining dissolve delay at `now`
    pub fn dissolve_delay_at(&self, now: Timestamp) -> u64 {
        self.dissolve_state.dissolve_delay_seconds(now)
    }

    pub fn is_owned_by(&self, account: &AccountId) -> bool {
        self.owner == *account
    }

    pub fn age_seconds(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.created_at)
    }

    pub fn is_disbursing(&self) -> bool {
        self.pending_disbursal.is_some()
    }
}
