//! # Dissolve State Machine
//!
//! Pure transitions over a neuron snapshot. Every transition resolves the
//! time-driven `Dissolving -> Dissolved` step first, validates, and only
//! then writes; a rejected transition leaves the neuron untouched.
//!
//! | From | Operation | To |
//! |------|-----------|----|
//! | Locked | start dissolving | Dissolving |
//! | Dissolving | stop dissolving | Locked (remaining delay) |
//! | Dissolving | time passes | Dissolved |
//! | Locked | increase delay | Locked |
//! | Dissolved | disburse | removed |

use crate::policy::StakingPolicy;
use edustake_core::error::{NeuronError, Result};
use edustake_core::neuron::{DissolveState, Neuron, NeuronState};
use edustake_core::types::Timestamp;

/// Persist the lazily derived state. Returns true if it changed.
pub fn resolve(neuron: &mut Neuron, now: Timestamp) -> bool {
    let resolved = neuron.dissolve_state.resolve(now);
    if resolved != neuron.dissolve_state {
        neuron.dissolve_state = resolved;
        true
    } else {
        false
    }
}

fn invalid_state(neuron: &Neuron, expected: NeuronState, now: Timestamp) -> NeuronError {
    NeuronError::InvalidState {
        id: neuron.id,
        expected,
        actual: neuron.state_at(now),
    }
}

/// `Locked -> Dissolving`; the full delay starts counting down at `now`
pub fn start_dissolving(neuron: &mut Neuron, now: Timestamp) -> Result<()> {
    resolve(neuron, now);
    match neuron.dissolve_state {
        DissolveState::Locked {
            dissolve_delay_seconds,
        } => {
            neuron.dissolve_state = DissolveState::Dissolving {
                dissolving_since: now,
                dissolve_delay_seconds,
            };
            Ok(())
        }
        _ => Err(invalid_state(neuron, NeuronState::Locked, now)),
    }
}

/// `Dissolving -> Locked`; the stored delay becomes what was left
pub fn stop_dissolving(neuron: &mut Neuron, now: Timestamp) -> Result<()> {
    resolve(neuron, now);
    match neuron.dissolve_state {
        DissolveState::Dissolving { .. } => {
            let remaining = neuron.dissolve_state.dissolve_delay_seconds(now);
            neuron.dissolve_state = DissolveState::Locked {
                dissolve_delay_seconds: remaining,
            };
            Ok(())
        }
        _ => Err(invalid_state(neuron, NeuronState::Dissolving, now)),
    }
}

/// `Locked -> Locked` with a strictly larger delay, bounded by the policy
pub fn increase_dissolve_delay(
    neuron: &mut Neuron,
    new_delay: u64,
    policy: &StakingPolicy,
    now: Timestamp,
) -> Result<()> {
    resolve(neuron, now);
    match neuron.dissolve_state {
        DissolveState::Locked {
            dissolve_delay_seconds,
        } => {
            if new_delay <= dissolve_delay_seconds {
                return Err(NeuronError::DelayNotIncreasing {
                    current: dissolve_delay_seconds,
                    requested: new_delay,
                });
            }
            if new_delay > policy.max_dissolve_delay_seconds {
                return Err(NeuronError::DelayExceedsMaximum {
                    requested: new_delay,
                    max: policy.max_dissolve_delay_seconds,
                });
            }
            neuron.dissolve_state = DissolveState::Locked {
                dissolve_delay_seconds: new_delay,
            };
            Ok(())
        }
        _ => Err(invalid_state(neuron, NeuronState::Locked, now)),
    }
}

/// Precondition of disbursement
pub fn ensure_dissolved(neuron: &mut Neuron, now: Timestamp) -> Result<()> {
    resolve(neuron, now);
    match neuron.dissolve_state {
        DissolveState::Dissolved { .. } => Ok(()),
        _ => Err(invalid_state(neuron, NeuronState::Dissolved, now)),
    }
}
