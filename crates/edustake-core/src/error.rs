//! Error types for EduStake neuron operations

use crate::neuron::NeuronState;
use crate::types::{NeuronId, Tokens};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for neuron operations
pub type Result<T> = std::result::Result<T, NeuronError>;

/// Error classes callers use to decide whether and how to retry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad input, rejected before any mutation
    Validation,
    /// Illegal transition for the current state
    State,
    /// Caller does not control the neuron
    Authorization,
    /// No such neuron
    NotFound,
    /// Conflicting concurrent write; retry the whole operation
    Concurrency,
    /// Neuron store unreachable or too slow
    StorageUnavailable,
    /// Clock, multiplier ledger or token custody unreachable
    DependencyUnavailable,
}

impl ErrorKind {
    /// Stable lowercase label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::State => "state",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::Concurrency => "concurrency",
            Self::StorageUnavailable => "storage_unavailable",
            Self::DependencyUnavailable => "dependency_unavailable",
        }
    }
}

/// Errors that can occur in neuron operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NeuronError {
    // === Validation ===
    #[error("Stake {amount} is below the minimum of {minimum}")]
    BelowMinimumStake { amount: Tokens, minimum: Tokens },

    #[error("Dissolve delay {requested}s is outside [{min}s, {max}s]")]
    DelayOutOfRange { requested: u64, min: u64, max: u64 },

    #[error("Dissolve delay {requested}s does not exceed the current {current}s")]
    DelayNotIncreasing { current: u64, requested: u64 },

    #[error("Dissolve delay {requested}s exceeds the maximum of {max}s")]
    DelayExceedsMaximum { requested: u64, max: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid followee: {0}")]
    InvalidFollowee(NeuronId),

    #[error("Insufficient maturity: requested {requested}, available {available}")]
    InsufficientMaturity { requested: Tokens, available: Tokens },

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Tokens, available: Tokens },

    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    // === State ===
    #[error("Neuron {id} is {actual:?}, operation requires {expected:?}")]
    InvalidState {
        id: NeuronId,
        expected: NeuronState,
        actual: NeuronState,
    },

    #[error("Update of neuron {from} tried to change its id to {to}")]
    IdentityChanged { from: NeuronId, to: NeuronId },

    // === Authorization ===
    #[error("Caller does not own neuron {0}")]
    NotOwner(NeuronId),

    // === Lookup ===
    #[error("Neuron not found: {0}")]
    NotFound(NeuronId),

    // === Concurrency ===
    #[error("Neuron id already exists: {0}")]
    DuplicateId(NeuronId),

    #[error("Concurrent update conflict on neuron {0}")]
    Conflict(NeuronId),

    #[error("Disbursal of neuron {0} is in progress")]
    DisbursalInProgress(NeuronId),

    // === Availability ===
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),
}

impl NeuronError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BelowMinimumStake { .. }
            | Self::DelayOutOfRange { .. }
            | Self::DelayNotIncreasing { .. }
            | Self::DelayExceedsMaximum { .. }
            | Self::InvalidAmount(_)
            | Self::InvalidFollowee(_)
            | Self::InsufficientMaturity { .. }
            | Self::InsufficientFunds { .. }
            | Self::ArithmeticOverflow(_) => ErrorKind::Validation,
            Self::InvalidState { .. } | Self::IdentityChanged { .. } => ErrorKind::State,
            Self::NotOwner(_) => ErrorKind::Authorization,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DuplicateId(_) | Self::Conflict(_) | Self::DisbursalInProgress(_) => {
                ErrorKind::Concurrency
            }
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Self::DependencyUnavailable(_) => ErrorKind::DependencyUnavailable,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self.kind() {
            ErrorKind::Validation => 1001,
            ErrorKind::State => 1002,
            ErrorKind::Authorization => 1003,
            ErrorKind::NotFound => 1004,
            ErrorKind::Concurrency => 1005,
            ErrorKind::StorageUnavailable => 1006,
            ErrorKind::DependencyUnavailable => 1007,
        }
    }

    /// Whether re-running the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Concurrency | ErrorKind::StorageUnavailable | ErrorKind::DependencyUnavailable
        )
    }
}
