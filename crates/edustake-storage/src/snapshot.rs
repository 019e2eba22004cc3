//! Durable store snapshots
//!
//! A snapshot is the full neuron set encoded with bincode. Writes go to a
//! sibling temp file first and are renamed into place, so a crash mid-write
//! leaves the previous snapshot intact.

use crate::neuron_store::InMemoryNeuronStore;
use edustake_core::error::NeuronError;
use edustake_core::neuron::Neuron;
use edustake_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Current on-disk format
pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Unsupported snapshot version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },

    #[error("Store error: {0}")]
    Store(#[from] NeuronError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    /// Clock reading when the snapshot was taken
    pub taken_at: Timestamp,
    pub neurons: Vec<Neuron>,
}

impl StoreSnapshot {
    /// Capture every neuron of `store`
    pub fn capture(store: &InMemoryNeuronStore, taken_at: Timestamp) -> Result<Self, SnapshotError> {
        Ok(Self {
            version: SNAPSHOT_VERSION,
            taken_at,
            neurons: store.all_neurons()?,
        })
    }

    /// Replace the content of `store` with this snapshot
    pub fn restore_into(self, store: &InMemoryNeuronStore) -> Result<usize, SnapshotError> {
        let count = self.neurons.len();
        store.replace_all(self.neurons)?;
        tracing::info!(neurons = count, taken_at = self.taken_at, "snapshot restored");
        Ok(count)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = bincode::deserialize(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let bytes = self.to_bytes()?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
        Ok(())
    }

    /// Load a snapshot; `Ok(None)` when no file exists yet
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(Self::from_bytes(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
