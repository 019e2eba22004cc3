//! # EduStake Core
//!
//! Core data structures for EduStake neuron staking.
//!
//! This crate provides the fundamental building blocks:
//! - `Neuron` - Staked tokens plus their lock/dissolve lifecycle
//! - `DissolveState` - Tagged lifecycle state (locked, dissolving, dissolved)
//! - `Ratio` - Fixed-point factor in 1/10_000 units
//! - `Clock` - Injectable time source
//!
//! ## Lifecycle
//!
//! ```text
//!            StartDissolving                 time passes
//!   Locked ──────────────────► Dissolving ─────────────────► Dissolved
//!     ▲  │                        │                              │
//!     │  └─ IncreaseDissolveDelay │                              │ Disburse
//!     └───────────────────────────┘                              ▼
//!            StopDissolving                                  (removed)
//! ```

pub mod clock;
pub mod error;
pub mod fixed_point;
pub mod neuron;
pub mod types;

pub use clock::*;
pub use error::*;
pub use fixed_point::*;
pub use neuron::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::error::{ErrorKind, NeuronError, Result};
    pub use crate::fixed_point::Ratio;
    pub use crate::neuron::{DissolveState, Neuron, NeuronState, PendingDisbursal};
    pub use crate::types::*;
}
