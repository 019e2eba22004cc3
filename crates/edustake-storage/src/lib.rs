//! # EduStake Storage
//!
//! Authoritative neuron storage and the token custody boundary.
//!
//! ## Layout
//!
//! - `neuron_store` - Neuron records with per-neuron serialized mutation
//! - `snapshot` - Durable bincode snapshots of a store
//! - `custody` - Token debit/credit collaborator

pub mod custody;
pub mod neuron_store;
pub mod snapshot;

// Re-export for convenience
pub use custody::{InMemoryTokenLedger, TokenCustody};
pub use neuron_store::{InMemoryNeuronStore, Mutator, NeuronStore, RemoveGuard, Splitter};
pub use snapshot::{SnapshotError, StoreSnapshot};
