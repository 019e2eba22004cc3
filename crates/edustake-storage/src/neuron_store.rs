//! Neuron persistence layer
//!
//! Every neuron sits behind its own mutex. `update_atomic` holds that mutex
//! for the whole read-apply-write window, so two updates of the same neuron
//! never interleave while updates of different neurons run in parallel.
//! Readers take the same mutex to clone the record and therefore always see
//! a complete pre- or post-update version.

use async_trait::async_trait;
use edustake_core::error::{NeuronError, Result};
use edustake_core::neuron::Neuron;
use edustake_core::types::{AccountId, NeuronId};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mutation applied by `update_atomic`; an error aborts without writing
pub type Mutator = Box<dyn FnOnce(Neuron) -> Result<Neuron> + Send>;

/// Mutation applied by `split_atomic`: the updated neuron plus a new one
/// carved out of it
pub type Splitter = Box<dyn FnOnce(Neuron) -> Result<(Neuron, Neuron)> + Send>;

/// Precondition checked by `remove_atomic` under the neuron's lock
pub type RemoveGuard = Box<dyn FnOnce(&Neuron) -> Result<()> + Send>;

/// Authoritative neuron collection
#[async_trait]
pub trait NeuronStore: Send + Sync {
    /// Fetch a consistent copy of one neuron
    async fn get(&self, id: &NeuronId) -> Result<Neuron>;

    /// All neurons of `owner`, by creation time then insertion order
    async fn list_by_owner(&self, owner: &AccountId) -> Result<Vec<Neuron>>;

    /// Every stored id, by insertion order
    async fn list_ids(&self) -> Result<Vec<NeuronId>>;

    /// Insert a new neuron
    async fn create_atomic(&self, initial: Neuron) -> Result<NeuronId>;

    /// Read, mutate and write back one neuron as a single step
    async fn update_atomic(&self, id: &NeuronId, mutator: Mutator) -> Result<Neuron>;

    /// Update one neuron and insert the neuron split off it as a single
    /// step; on any error neither is written
    async fn split_atomic(&self, id: &NeuronId, splitter: Splitter) -> Result<(Neuron, Neuron)>;

    /// Delete a neuron if `guard` accepts its current value
    async fn remove_atomic(&self, id: &NeuronId, guard: RemoveGuard) -> Result<Neuron>;

    /// Number of stored neurons
    async fn len(&self) -> Result<usize>;
}

struct Entry {
    neuron: Neuron,
    /// Insertion order, breaks `created_at` ties
    seq: u64,
    /// Set when deleted while another task still holds the `Arc`
    removed: bool,
}

/// In-memory store with per-neuron locks
pub struct InMemoryNeuronStore {
    neurons: RwLock<HashMap<NeuronId, Arc<Mutex<Entry>>>>,
    next_seq: AtomicU64,
    lock_timeout: Duration,
    online: AtomicBool,
}

impl InMemoryNeuronStore {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

    pub fn new() -> Self {
        Self::with_lock_timeout(Self::DEFAULT_LOCK_TIMEOUT)
    }

    /// Bound how long an operation waits for a busy neuron
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            neurons: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            lock_timeout,
            online: AtomicBool::new(true),
        }
    }

    /// Take the store offline (every call fails with `StorageUnavailable`)
    /// or bring it back
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
        tracing::info!(online, "neuron store availability changed");
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(NeuronError::StorageUnavailable("neuron store offline".into()))
        }
    }

    fn entry(&self, id: &NeuronId) -> Result<Arc<Mutex<Entry>>> {
        self.neurons
            .read()
            .get(id)
            .cloned()
            .ok_or(NeuronError::NotFound(*id))
    }

    fn lock<'a>(&self, id: &NeuronId, entry: &'a Mutex<Entry>) -> Result<MutexGuard<'a, Entry>> {
        let guard = entry
            .try_lock_for(self.lock_timeout)
            .ok_or(NeuronError::Conflict(*id))?;
        if guard.removed {
            return Err(NeuronError::NotFound(*id));
        }
        Ok(guard)
    }

    /// Consistent copies of every neuron, by insertion order
    pub fn all_neurons(&self) -> Result<Vec<Neuron>> {
        self.ensure_online()?;
        let entries: Vec<(NeuronId, Arc<Mutex<Entry>>)> = self
            .neurons
            .read()
            .iter()
            .map(|(id, e)| (*id, e.clone()))
            .collect();

        let mut rows = Vec::with_capacity(entries.len());
        for (id, entry) in &entries {
            match self.lock(id, entry) {
                Ok(guard) => rows.push((guard.seq, guard.neuron.clone())),
                Err(NeuronError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, n)| n).collect())
    }

    /// Replace the whole content; used when loading a snapshot
    pub fn replace_all(&self, neurons: Vec<Neuron>) -> Result<()> {
        self.ensure_online()?;
        let mut map = HashMap::with_capacity(neurons.len());
        for neuron in neurons {
            let id = neuron.id;
            let seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
            let entry = Entry {
                neuron,
                seq,
                removed: false,
            };
            if map.insert(id, Arc::new(Mutex::new(entry))).is_some() {
                return Err(NeuronError::DuplicateId(id));
            }
        }
        *self.neurons.write() = map;
        Ok(())
    }
}

fn ensure_same_id(id: &NeuronId, updated: &Neuron) -> Result<()> {
    if updated.id == *id {
        Ok(())
    } else {
        Err(NeuronError::IdentityChanged {
            from: *id,
            to: updated.id,
        })
    }
}

impl Default for InMemoryNeuronStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NeuronStore for InMemoryNeuronStore {
    async fn get(&self, id: &NeuronId) -> Result<Neuron> {
        self.ensure_online()?;
        let entry = self.entry(id)?;
        let guard = self.lock(id, &entry)?;
        Ok(guard.neuron.clone())
    }

    async fn list_by_owner(&self, owner: &AccountId) -> Result<Vec<Neuron>> {
        self.ensure_online()?;
        let entries: Vec<(NeuronId, Arc<Mutex<Entry>>)> = self
            .neurons
            .read()
            .iter()
            .map(|(id, e)| (*id, e.clone()))
            .collect();

        let mut owned = Vec::new();
        for (id, entry) in &entries {
            let guard = match self.lock(id, entry) {
                Ok(guard) => guard,
                Err(NeuronError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if guard.neuron.owner == *owner {
                owned.push((guard.neuron.created_at, guard.seq, guard.neuron.clone()));
            }
        }
        owned.sort_by_key(|(created_at, seq, _)| (*created_at, *seq));
        Ok(owned.into_iter().map(|(_, _, n)| n).collect())
    }

    async fn list_ids(&self) -> Result<Vec<NeuronId>> {
        self.ensure_online()?;
        Ok(self.all_neurons()?.into_iter().map(|n| n.id).collect())
    }

    async fn create_atomic(&self, initial: Neuron) -> Result<NeuronId> {
        self.ensure_online()?;
        let id = initial.id;
        let mut neurons = self.neurons.write();
        if neurons.contains_key(&id) {
            return Err(NeuronError::DuplicateId(id));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
        neurons.insert(
            id,
            Arc::new(Mutex::new(Entry {
                neuron: initial,
                seq,
                removed: false,
            })),
        );
        tracing::debug!(neuron_id = %id, "neuron stored");
        Ok(id)
    }

    async fn update_atomic(&self, id: &NeuronId, mutator: Mutator) -> Result<Neuron> {
        self.ensure_online()?;
        let entry = self.entry(id)?;
        let mut guard = self.lock(id, &entry)?;

        let updated = mutator(guard.neuron.clone())?;
        ensure_same_id(id, &updated)?;
        guard.neuron = updated.clone();
        Ok(updated)
    }

    async fn split_atomic(&self, id: &NeuronId, splitter: Splitter) -> Result<(Neuron, Neuron)> {
        self.ensure_online()?;
        let entry = self.entry(id)?;
        let mut guard = self.lock(id, &entry)?;

        let (updated, split) = splitter(guard.neuron.clone())?;
        ensure_same_id(id, &updated)?;

        // entry lock before map lock, as everywhere else
        let mut neurons = self.neurons.write();
        if neurons.contains_key(&split.id) {
            return Err(NeuronError::DuplicateId(split.id));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
        neurons.insert(
            split.id,
            Arc::new(Mutex::new(Entry {
                neuron: split.clone(),
                seq,
                removed: false,
            })),
        );
        guard.neuron = updated.clone();
        tracing::debug!(neuron_id = %id, split_id = %split.id, "neuron split");
        Ok((updated, split))
    }

    async fn remove_atomic(&self, id: &NeuronId, guard_fn: RemoveGuard) -> Result<Neuron> {
        self.ensure_online()?;
        let entry = self.entry(id)?;
        let mut guard = self.lock(id, &entry)?;

        guard_fn(&guard.neuron)?;
        guard.removed = true;
        let neuron = guard.neuron.clone();
        drop(guard);

        self.neurons.write().remove(id);
        tracing::debug!(neuron_id = %id, "neuron removed");
        Ok(neuron)
    }

    async fn len(&self) -> Result<usize> {
        self.ensure_online()?;
        Ok(self.neurons.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edustake_core::fixed_point::Ratio;
    use std::sync::Arc;

    fn make_neuron(owner: u8, created_at: u64) -> Neuron {
        Neuron::new(
            NeuronId::generate(),
            AccountId::new([owner; 32]),
            1_000,
            100,
            created_at,
            Ratio::ONE,
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryNeuronStore::new();
        let neuron = make_neuron(1, 10);
        let id = store.create_atomic(neuron.clone()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), neuron);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = InMemoryNeuronStore::new();
        let neuron = make_neuron(1, 10);
        store.create_atomic(neuron.clone()).await.unwrap();
        assert!(matches!(
            store.create_atomic(neuron).await,
            Err(NeuronError::DuplicateId(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryNeuronStore::new();
        let id = NeuronId::generate();
        assert_eq!(store.get(&id).await, Err(NeuronError::NotFound(id)));
    }

    #[tokio::test]
    async fn test_failed_mutator_writes_nothing() {
        let store = InMemoryNeuronStore::new();
        let neuron = make_neuron(1, 10);
        let id = store.create_atomic(neuron.clone()).await.unwrap();

        let result = store
            .update_atomic(
                &id,
                Box::new(|mut n| {
                    n.staked_amount = 0;
                    Err(NeuronError::InvalidAmount("nope".into()))
                }),
            )
            .await;

        assert_eq!(result, Err(NeuronError::InvalidAmount("nope".into())));
        assert_eq!(store.get(&id).await.unwrap(), neuron);
    }

    #[tokio::test]
    async fn test_update_cannot_change_id() {
        let store = InMemoryNeuronStore::new();
        let neuron = make_neuron(1, 10);
        let id = store.create_atomic(neuron.clone()).await.unwrap();
        let other = NeuronId::generate();

        let result = store
            .update_atomic(
                &id,
                Box::new(move |mut n| {
                    n.id = other;
                    Ok(n)
                }),
            )
            .await;

        assert_eq!(result, Err(NeuronError::IdentityChanged { from: id, to: other }));
        assert_eq!(store.get(&id).await.unwrap(), neuron);
    }

    #[tokio::test]
    async fn test_split_writes_both_neurons() {
        let store = InMemoryNeuronStore::new();
        let id = store.create_atomic(make_neuron(1, 10)).await.unwrap();
        let child = make_neuron(1, 20);
        let child_id = child.id;

        let (parent, split) = store
            .split_atomic(
                &id,
                Box::new(move |mut n| {
                    n.staked_amount -= 400;
                    let mut child = child;
                    child.staked_amount = 400;
                    Ok((n, child))
                }),
            )
            .await
            .unwrap();

        assert_eq!(parent.staked_amount, 600);
        assert_eq!(store.get(&id).await.unwrap().staked_amount, 600);
        assert_eq!(store.get(&child_id).await.unwrap(), split);
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_split_writes_nothing() {
        let store = InMemoryNeuronStore::new();
        let parent = make_neuron(1, 10);
        let id = store.create_atomic(parent.clone()).await.unwrap();
        let taken = make_neuron(2, 10);
        let taken_id = store.create_atomic(taken.clone()).await.unwrap();

        // the new neuron cannot be inserted, so the parent keeps its stake
        let result = store
            .split_atomic(
                &id,
                Box::new(move |mut n| {
                    n.staked_amount = 0;
                    Ok((n, taken))
                }),
            )
            .await;

        assert_eq!(result, Err(NeuronError::DuplicateId(taken_id)));
        assert_eq!(store.get(&id).await.unwrap(), parent);
        assert_eq!(store.len().await.unwrap(), 2);

        store.set_online(false);
        let offline = store
            .split_atomic(&id, Box::new(|n| Ok((n.clone(), n))))
            .await;
        assert!(matches!(offline, Err(NeuronError::StorageUnavailable(_))));
        store.set_online(true);
        assert_eq!(store.get(&id).await.unwrap(), parent);
    }

    #[tokio::test]
    async fn test_list_by_owner_ordering() {
        let store = InMemoryNeuronStore::new();
        let late = make_neuron(1, 30);
        let early = make_neuron(1, 10);
        let tie_a = make_neuron(1, 20);
        let tie_b = make_neuron(1, 20);
        let other = make_neuron(2, 5);

        for n in [&late, &early, &tie_a, &tie_b, &other] {
            store.create_atomic((*n).clone()).await.unwrap();
        }

        let ids: Vec<NeuronId> = store
            .list_by_owner(&AccountId::new([1u8; 32]))
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![early.id, tie_a.id, tie_b.id, late.id]);
    }

    #[tokio::test]
    async fn test_remove_atomic_guard() {
        let store = InMemoryNeuronStore::new();
        let id = store.create_atomic(make_neuron(1, 10)).await.unwrap();

        let refused = store
            .remove_atomic(
                &id,
                Box::new(|_: &Neuron| Err(NeuronError::InvalidAmount("keep".into()))),
            )
            .await;
        assert!(refused.is_err());
        assert!(store.get(&id).await.is_ok());

        store
            .remove_atomic(&id, Box::new(|_: &Neuron| Ok(())))
            .await
            .unwrap();
        assert_eq!(store.get(&id).await, Err(NeuronError::NotFound(id)));
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_store() {
        let store = InMemoryNeuronStore::new();
        store.set_online(false);
        assert!(matches!(
            store.create_atomic(make_neuron(1, 10)).await,
            Err(NeuronError::StorageUnavailable(_))
        ));
        store.set_online(true);
        assert!(store.create_atomic(make_neuron(1, 10)).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(InMemoryNeuronStore::with_lock_timeout(Duration::from_secs(5)));
        let id = store.create_atomic(make_neuron(1, 10)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store
                        .update_atomic(
                            &id,
                            Box::new(|mut n| {
                                n.accumulated_maturity += 1;
                                Ok(n)
                            }),
                        )
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get(&id).await.unwrap().accumulated_maturity, 800);
    }

    #[tokio::test]
    async fn test_replace_all() {
        let store = InMemoryNeuronStore::new();
        store.create_atomic(make_neuron(1, 10)).await.unwrap();
        let fresh = vec![make_neuron(2, 1), make_neuron(2, 2)];
        store.replace_all(fresh.clone()).unwrap();
        assert_eq!(store.all_neurons().unwrap(), fresh);
    }
}
