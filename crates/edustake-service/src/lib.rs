//! # EduStake Service
//!
//! Neuron operations over the store, the multiplier ledger and token
//! custody, plus the runtime pieces around them.
//!
//! ## Layout
//!
//! - `service` - `NeuronService`, one atomic store update per operation
//! - `view` - Read projections (`NeuronView`, `OwnerSummary`)
//! - `sweep` - Periodic reward accrual
//! - `runtime` - Wiring, snapshots and shutdown handling
//! - `config` - TOML configuration
//! - `metrics` - Prometheus counters

pub mod config;
pub mod metrics;
pub mod runtime;
pub mod service;
pub mod sweep;
pub mod view;

pub use config::ServiceConfig;
pub use metrics::ServiceMetrics;
pub use runtime::{RuntimeState, StakingRuntime};
pub use service::{NeuronService, SweepReport};
pub use sweep::{RewardSweeper, SweepStats};
pub use view::{NeuronView, OwnerSummary};
