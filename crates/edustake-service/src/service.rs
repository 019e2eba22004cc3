//! Neuron service
//!
//! Every mutating operation is one `update_atomic` on the neuron store whose
//! mutator, in order:
//!
//! 1. re-checks ownership
//! 2. resolves the lazy `Dissolving -> Dissolved` step
//! 3. accrues rewards up to `now`
//! 4. applies the requested transition
//!
//! The clock and the multiplier are read before entering the store, so no
//! neuron lock is ever held across a collaborator call. Transitions run at
//! `max(now, watermark)` so a slow writer never stamps a time the neuron has
//! already moved past. Every awaited collaborator call is bounded by the
//! configured operation timeout.
//!
//! Spawning writes parent and child in one `split_atomic`. Disbursal is the
//! only operation that moves tokens out, and it runs in three steps:
//!
//! 1. mark the neuron with a [`PendingDisbursal`] carrying a fresh transfer id
//! 2. pay through the idempotent custody `transfer`
//! 3. remove the neuron, guarded on that transfer id
//!
//! Balances stay on the record until step 3, and a marked neuron refuses
//! every other mutation. A failure after step 1 leaves the mark in place and
//! the next `disburse` resumes under the same transfer id, so an interrupted
//! payout is neither lost nor paid twice.

use crate::config::ServiceConfig;
use crate::metrics::ServiceMetrics;
use crate::view::{NeuronView, OwnerSummary};
use edustake_core::clock::Clock;
use edustake_core::error::{NeuronError, Result};
use edustake_core::fixed_point::Ratio;
use edustake_core::neuron::{Neuron, PendingDisbursal};
use edustake_core::types::{AccountId, NeuronId, Timestamp, Tokens, TransferId};
use edustake_economics::dissolve;
use edustake_economics::multiplier::MultiplierLedger;
use edustake_economics::rewards::{AccrualOutcome, RewardEngine};
use edustake_storage::custody::TokenCustody;
use edustake_storage::neuron_store::{Mutator, NeuronStore, Splitter};
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Most followees a neuron may register
pub const MAX_FOLLOWEES: usize = 15;

/// Outcome of one pass over every neuron
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Neurons examined
    pub visited: usize,
    /// Neurons whose maturity grew
    pub accrued: usize,
    /// Neurons that could not be accrued this pass
    pub failed: usize,
    /// Maturity credited across all neurons
    pub total_reward: Tokens,
}

/// Orchestrates neuron operations over the store and its collaborators
pub struct NeuronService {
    store: Arc<dyn NeuronStore>,
    multipliers: Arc<dyn MultiplierLedger>,
    custody: Arc<dyn TokenCustody>,
    clock: Arc<dyn Clock>,
    engine: RewardEngine,
    operation_timeout: Duration,
    metrics: Option<Arc<ServiceMetrics>>,
}

impl NeuronService {
    pub fn new(
        config: &ServiceConfig,
        store: Arc<dyn NeuronStore>,
        multipliers: Arc<dyn MultiplierLedger>,
        custody: Arc<dyn TokenCustody>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            multipliers,
            custody,
            clock,
            engine: RewardEngine::new(config.policy.clone()),
            operation_timeout: config.storage.operation_timeout(),
            metrics: None,
        }
    }

    /// Attach a metrics registry
    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn engine(&self) -> &RewardEngine {
        &self.engine
    }

    pub fn metrics(&self) -> Option<&Arc<ServiceMetrics>> {
        self.metrics.as_ref()
    }

    // ---------------------------------------------------------------------
    // Public operations
    // ---------------------------------------------------------------------

    /// Stake `amount` for `owner` with an initial `delay_seconds`
    pub async fn create_neuron(
        &self,
        owner: AccountId,
        amount: Tokens,
        delay_seconds: u64,
    ) -> Result<NeuronId> {
        let result = self.do_create_neuron(owner, amount, delay_seconds).await;
        self.observe("create_neuron", &result);
        result
    }

    pub async fn get_neuron(&self, id: &NeuronId) -> Result<NeuronView> {
        let result: Result<NeuronView> = async {
            let neuron = self.bounded_store(self.store.get(id)).await?;
            let now = self.clock.now()?;
            Ok(NeuronView::project(&neuron, &self.engine, now))
        }
        .await;
        self.observe("get_neuron", &result);
        result
    }

    /// All neurons of `owner`, oldest first
    pub async fn list_neurons(&self, owner: &AccountId) -> Result<Vec<NeuronView>> {
        let result: Result<Vec<NeuronView>> = async {
            let neurons = self.bounded_store(self.store.list_by_owner(owner)).await?;
            let now = self.clock.now()?;
            Ok(neurons
                .iter()
                .map(|n| NeuronView::project(n, &self.engine, now))
                .collect())
        }
        .await;
        self.observe("list_neurons", &result);
        result
    }

    pub async fn owner_summary(&self, owner: &AccountId) -> Result<OwnerSummary> {
        let views = self.list_neurons(owner).await?;
        Ok(OwnerSummary::from_views(*owner, &views))
    }

    pub async fn increase_dissolve_delay(
        &self,
        id: &NeuronId,
        caller: &AccountId,
        new_delay_seconds: u64,
    ) -> Result<NeuronView> {
        let result = self
            .apply(id, caller, move |neuron, engine, now| {
                dissolve::increase_dissolve_delay(neuron, new_delay_seconds, engine.policy(), now)
            })
            .await
            .map(|(neuron, ())| neuron);
        if result.is_ok() {
            info!(neuron_id = %id, new_delay_seconds, "dissolve delay increased");
        }
        self.finish("increase_dissolve_delay", result)
    }

    pub async fn start_dissolving(&self, id: &NeuronId, caller: &AccountId) -> Result<NeuronView> {
        let result = self
            .apply(id, caller, |neuron, _, now| dissolve::start_dissolving(neuron, now))
            .await
            .map(|(neuron, ())| neuron);
        if result.is_ok() {
            info!(neuron_id = %id, "dissolving started");
        }
        self.finish("start_dissolving", result)
    }

    pub async fn stop_dissolving(&self, id: &NeuronId, caller: &AccountId) -> Result<NeuronView> {
        let result = self
            .apply(id, caller, |neuron, _, now| dissolve::stop_dissolving(neuron, now))
            .await
            .map(|(neuron, ())| neuron);
        if result.is_ok() {
            info!(neuron_id = %id, "dissolving stopped");
        }
        self.finish("stop_dissolving", result)
    }

    /// Move maturity into a new neuron; `None` spawns all of it
    pub async fn spawn_maturity(
        &self,
        id: &NeuronId,
        caller: &AccountId,
        amount: Option<Tokens>,
    ) -> Result<NeuronId> {
        let result = self.do_spawn_maturity(id, caller, amount).await;
        self.observe("spawn_maturity", &result);
        result
    }

    /// Fold maturity into the stake; returns the merged amount
    pub async fn merge_maturity(&self, id: &NeuronId, caller: &AccountId) -> Result<Tokens> {
        let result = self
            .apply(id, caller, |neuron, engine, _| engine.merge_maturity(neuron))
            .await
            .map(|(_, merged)| merged);
        if let Ok(amount) = &result {
            info!(neuron_id = %id, amount = *amount, "maturity merged");
        }
        self.observe("merge_maturity", &result);
        result
    }

    /// Pay out stake and maturity of a dissolved neuron and delete it
    ///
    /// Retrying after a failure resumes the interrupted payout.
    pub async fn disburse(&self, id: &NeuronId, caller: &AccountId) -> Result<Tokens> {
        let result = self.do_disburse(id, caller).await;
        self.observe("disburse", &result);
        result
    }

    /// Replace the followee set
    pub async fn set_followees(
        &self,
        id: &NeuronId,
        caller: &AccountId,
        followees: Vec<NeuronId>,
    ) -> Result<NeuronView> {
        let result = self.do_set_followees(id, caller, followees).await;
        self.finish("set_followees", result)
    }

    /// Accrue up to now without any other change
    pub async fn refresh_rewards(&self, id: &NeuronId, caller: &AccountId) -> Result<AccrualOutcome> {
        let result = self
            .apply_accrual(id, Some(caller))
            .await
            .map(|(_, accrued)| accrued);
        if let Ok(accrued) = &result {
            info!(neuron_id = %id, reward = accrued.reward, "rewards refreshed");
        }
        self.observe("refresh_rewards", &result);
        result
    }

    /// Accrue every neuron up to now
    ///
    /// A neuron that fails is logged and counted; the pass continues.
    pub async fn sweep_rewards(&self) -> Result<SweepReport> {
        let ids = self.bounded_store(self.store.list_ids()).await?;
        let mut report = SweepReport::default();

        for id in ids {
            report.visited += 1;
            match self.apply_accrual(&id, None).await {
                Ok((_, accrued)) => {
                    let reward = accrued.reward;
                    if reward > 0 {
                        report.accrued += 1;
                        report.total_reward = report.total_reward.saturating_add(reward);
                    }
                }
                // disbursed since the id list was taken
                Err(NeuronError::NotFound(_)) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(neuron_id = %id, kind = e.kind().as_str(), "sweep accrual failed: {}", e);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_sweep(report.failed as u64);
        }
        info!(
            visited = report.visited,
            accrued = report.accrued,
            failed = report.failed,
            total_reward = report.total_reward,
            "reward sweep complete"
        );
        Ok(report)
    }

    // ---------------------------------------------------------------------
    // Operation bodies
    // ---------------------------------------------------------------------

    async fn do_create_neuron(
        &self,
        owner: AccountId,
        amount: Tokens,
        delay_seconds: u64,
    ) -> Result<NeuronId> {
        let policy = self.engine.policy();
        policy.check_stake(amount)?;
        policy.check_initial_delay(delay_seconds)?;

        let multiplier = self.multiplier_of(&owner).await?;
        let now = self.clock.now()?;

        self.bounded_dependency(self.custody.debit(&owner, amount))
            .await?;

        let neuron = Neuron::new(
            NeuronId::generate(),
            owner,
            amount,
            delay_seconds,
            now,
            multiplier,
        );
        match self.bounded_store(self.store.create_atomic(neuron)).await {
            Ok(id) => {
                self.count_neurons(1);
                info!(neuron_id = %id, %owner, amount, delay_seconds, "neuron created");
                Ok(id)
            }
            Err(e) => {
                self.refund(&owner, amount).await;
                Err(e)
            }
        }
    }

    async fn do_spawn_maturity(
        &self,
        id: &NeuronId,
        caller: &AccountId,
        amount: Option<Tokens>,
    ) -> Result<NeuronId> {
        let (multiplier, now) = self.preflight(id, Some(caller)).await?;

        let engine = self.engine.clone();
        let owner = *caller;
        let child_id = NeuronId::generate();
        let (report, mut receipt) = oneshot::channel();
        let splitter: Splitter = Box::new(move |mut parent| {
            let (_, accrued) = settle(&mut parent, &owner, &engine, multiplier, now)?;
            let spawned = engine.spawn_maturity(&mut parent, amount)?;
            // the multiplier snapshot was refreshed by the accrual above
            let child = Neuron::new(
                child_id,
                parent.owner,
                spawned,
                engine.policy().spawn_dissolve_delay_seconds,
                parent.last_reward_computation_at,
                parent.multiplier_snapshot,
            );
            let _ = report.send(accrued.reward);
            Ok((parent, child))
        });

        let (_, child) = self
            .bounded_store(self.store.split_atomic(id, splitter))
            .await?;
        if let Ok(reward) = receipt.try_recv() {
            self.count_accrual(reward);
        }
        self.count_neurons(1);
        info!(neuron_id = %id, child_id = %child.id, amount = child.staked_amount, "maturity spawned");
        Ok(child.id)
    }

    async fn do_disburse(&self, id: &NeuronId, caller: &AccountId) -> Result<Tokens> {
        let (multiplier, now) = self.preflight(id, Some(caller)).await?;

        let engine = self.engine.clone();
        let owner = *caller;
        let transfer_id = TransferId::generate();
        let mark: Mutator = Box::new(move |mut neuron| {
            if !neuron.is_owned_by(&owner) {
                return Err(NeuronError::NotOwner(neuron.id));
            }
            if neuron.is_disbursing() {
                // resume under the original transfer id
                return Ok(neuron);
            }
            // the final accrual stops at the dissolve moment
            let (now, _) = settle(&mut neuron, &owner, &engine, multiplier, now)?;
            dissolve::ensure_dissolved(&mut neuron, now)?;
            let amount = neuron
                .staked_amount
                .checked_add(neuron.accumulated_maturity)
                .ok_or(NeuronError::ArithmeticOverflow("disbursal"))?;
            neuron.pending_disbursal = Some(PendingDisbursal {
                transfer_id,
                amount,
                started_at: now,
            });
            Ok(neuron)
        });
        let marked = self.bounded_store(self.store.update_atomic(id, mark)).await?;
        let pending = marked.pending_disbursal.ok_or(NeuronError::Conflict(*id))?;
        if pending.transfer_id != transfer_id {
            info!(neuron_id = %id, transfer_id = %pending.transfer_id, "resuming disbursal");
        }

        if let Err(e) = self
            .bounded_dependency(self.custody.transfer(&pending.transfer_id, &owner, pending.amount))
            .await
        {
            // a retryable failure may still have reached the ledger
            if !e.is_retryable() {
                self.withdraw_disbursal(id, pending.transfer_id).await;
            }
            return Err(e);
        }

        let settled = pending.transfer_id;
        self.bounded_store(self.store.remove_atomic(
            id,
            Box::new(move |neuron: &Neuron| match neuron.pending_disbursal {
                Some(p) if p.transfer_id == settled => Ok(()),
                _ => Err(NeuronError::Conflict(neuron.id)),
            }),
        ))
        .await
        .map_err(|e| {
            warn!(neuron_id = %id, transfer_id = %settled, "payout settled but neuron not removed: {}", e);
            e
        })?;

        self.count_neurons(-1);
        info!(neuron_id = %id, %owner, amount = pending.amount, "neuron disbursed");
        Ok(pending.amount)
    }

    async fn do_set_followees(
        &self,
        id: &NeuronId,
        caller: &AccountId,
        followees: Vec<NeuronId>,
    ) -> Result<Neuron> {
        let followees: BTreeSet<NeuronId> = followees.into_iter().collect();
        if followees.len() > MAX_FOLLOWEES {
            return Err(NeuronError::InvalidAmount(format!(
                "{} followees exceeds the limit of {}",
                followees.len(),
                MAX_FOLLOWEES
            )));
        }
        if followees.contains(id) {
            return Err(NeuronError::InvalidFollowee(*id));
        }
        for followee in &followees {
            match self.bounded_store(self.store.get(followee)).await {
                Ok(_) => {}
                Err(NeuronError::NotFound(_)) => return Err(NeuronError::InvalidFollowee(*followee)),
                Err(e) => return Err(e),
            }
        }

        let count = followees.len();
        let (updated, ()) = self
            .apply(id, caller, move |neuron, _, _| {
                neuron.followees = followees;
                Ok(())
            })
            .await?;
        info!(neuron_id = %id, followees = count, "followees updated");
        Ok(updated)
    }

    // ---------------------------------------------------------------------
    // Plumbing
    // ---------------------------------------------------------------------

    /// Owner pre-check plus the collaborator reads a mutation needs
    async fn preflight(&self, id: &NeuronId, caller: Option<&AccountId>) -> Result<(Ratio, Timestamp)> {
        let current = self.bounded_store(self.store.get(id)).await?;
        if let Some(caller) = caller {
            if !current.is_owned_by(caller) {
                return Err(NeuronError::NotOwner(*id));
            }
        }
        let multiplier = self.multiplier_of(&current.owner).await?;
        let now = self.clock.now()?;
        Ok((multiplier, now))
    }

    /// Run `transition` inside one atomic update after resolve and accrual
    async fn apply<T, F>(&self, id: &NeuronId, caller: &AccountId, transition: F) -> Result<(Neuron, T)>
    where
        F: FnOnce(&mut Neuron, &RewardEngine, Timestamp) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (multiplier, now) = self.preflight(id, Some(caller)).await?;

        let engine = self.engine.clone();
        let owner = *caller;
        let (report, mut receipt) = oneshot::channel();
        let mutator: Mutator = Box::new(move |mut neuron| {
            let (now, accrued) = settle(&mut neuron, &owner, &engine, multiplier, now)?;
            let output = transition(&mut neuron, &engine, now)?;
            let _ = report.send((accrued.reward, output));
            Ok(neuron)
        });

        let updated = self.bounded_store(self.store.update_atomic(id, mutator)).await?;
        let (reward, output) = receipt.try_recv().map_err(|_| {
            NeuronError::StorageUnavailable(format!("update of {} returned without applying", id))
        })?;
        self.count_accrual(reward);
        Ok((updated, output))
    }

    /// Resolve and accrue only; `caller` of `None` skips the owner check
    ///
    /// A neuron being disbursed is left as it is and reports no reward.
    async fn apply_accrual(
        &self,
        id: &NeuronId,
        caller: Option<&AccountId>,
    ) -> Result<(Neuron, AccrualOutcome)> {
        let (multiplier, now) = self.preflight(id, caller).await?;

        let engine = self.engine.clone();
        let (report, mut receipt) = oneshot::channel();
        let mutator: Mutator = Box::new(move |mut neuron| {
            if neuron.is_disbursing() {
                return Ok(neuron);
            }
            let now = now.max(neuron.last_reward_computation_at);
            dissolve::resolve(&mut neuron, now);
            let _ = report.send(engine.accrue(&mut neuron, multiplier, now)?);
            Ok(neuron)
        });

        let updated = self.bounded_store(self.store.update_atomic(id, mutator)).await?;
        let accrued = receipt.try_recv().unwrap_or(AccrualOutcome {
            reward: 0,
            elapsed_seconds: 0,
            multiplier,
        });
        self.count_accrual(accrued.reward);
        debug!(neuron_id = %id, reward = accrued.reward, maturity = updated.accumulated_maturity, "accrued");
        Ok((updated, accrued))
    }

    /// Current multiplier, clamped to the policy cap
    async fn multiplier_of(&self, owner: &AccountId) -> Result<Ratio> {
        let raw = self
            .bounded_dependency(self.multipliers.multiplier(owner))
            .await?;
        Ok(self.engine.policy().clamp_multiplier(raw))
    }

    async fn bounded_store<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(NeuronError::StorageUnavailable(format!(
                "neuron store did not answer within {:?}",
                self.operation_timeout
            ))),
        }
    }

    async fn bounded_dependency<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(NeuronError::DependencyUnavailable(format!(
                "collaborator did not answer within {:?}",
                self.operation_timeout
            ))),
        }
    }

    /// Undo a debit after a failed insert
    async fn refund(&self, owner: &AccountId, amount: Tokens) {
        if let Err(e) = self.bounded_dependency(self.custody.credit(owner, amount)).await {
            warn!(%owner, amount, "failed to refund stake after aborted create: {}", e);
        }
    }

    /// Clear a disbursal mark after a payout the ledger definitely refused
    ///
    /// If this fails the mark stays, which is safe: the next `disburse`
    /// resumes the same transfer.
    async fn withdraw_disbursal(&self, id: &NeuronId, transfer_id: TransferId) {
        let clear: Mutator = Box::new(move |mut neuron| {
            if matches!(neuron.pending_disbursal, Some(p) if p.transfer_id == transfer_id) {
                neuron.pending_disbursal = None;
            }
            Ok(neuron)
        });
        if let Err(e) = self.bounded_store(self.store.update_atomic(id, clear)).await {
            warn!(neuron_id = %id, %transfer_id, "disbursal mark left in place: {}", e);
        }
    }

    fn count_neurons(&self, delta: i64) {
        if let Some(metrics) = &self.metrics {
            metrics.add_neurons(delta);
        }
    }

    fn count_accrual(&self, amount: Tokens) {
        if let Some(metrics) = &self.metrics {
            if amount > 0 {
                metrics.record_accrual(amount);
            }
        }
    }

    fn finish(&self, operation: &'static str, result: Result<Neuron>) -> Result<NeuronView> {
        let result = result.and_then(|neuron| {
            let now = self.clock.now()?;
            Ok(NeuronView::project(&neuron, &self.engine, now.max(neuron.last_reward_computation_at)))
        });
        self.observe(operation, &result);
        result
    }

    fn observe<T>(&self, operation: &'static str, result: &Result<T>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => {
                warn!(
                    operation,
                    kind = e.kind().as_str(),
                    code = e.code(),
                    "operation failed: {}",
                    e
                );
                e.kind().as_str()
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.observe(operation, outcome);
        }
    }
}

/// Shared head of every neuron mutation: owner check, disbursal freeze,
/// lazy resolution and accrual
///
/// Returns the effective time, never earlier than the watermark.
fn settle(
    neuron: &mut Neuron,
    owner: &AccountId,
    engine: &RewardEngine,
    multiplier: Ratio,
    now: Timestamp,
) -> Result<(Timestamp, AccrualOutcome)> {
    if !neuron.is_owned_by(owner) {
        return Err(NeuronError::NotOwner(neuron.id));
    }
    if neuron.is_disbursing() {
        return Err(NeuronError::DisbursalInProgress(neuron.id));
    }
    let now = now.max(neuron.last_reward_computation_at);
    dissolve::resolve(neuron, now);
    let accrued = engine.accrue(neuron, multiplier, now)?;
    Ok((now, accrued))
}
