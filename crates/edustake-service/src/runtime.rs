//! Service runtime
//!
//! Wires the in-memory store, ledgers, clock and metrics into a
//! `NeuronService`, restores the last snapshot, runs the reward sweep until
//! a shutdown signal and persists a snapshot on the way out.

use crate::config::ServiceConfig;
use crate::metrics::ServiceMetrics;
use crate::service::NeuronService;
use crate::sweep::RewardSweeper;
use edustake_core::clock::Clock;
use edustake_economics::multiplier::InMemoryMultiplierLedger;
use edustake_economics::policy::StakingPolicy;
use edustake_storage::custody::InMemoryTokenLedger;
use edustake_storage::neuron_store::InMemoryNeuronStore;
use edustake_storage::snapshot::StoreSnapshot;
use edustake_core::fixed_point::Ratio;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;

/// Runtime state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// A fully wired staking service
pub struct StakingRuntime {
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
    store: Arc<InMemoryNeuronStore>,
    multipliers: Arc<InMemoryMultiplierLedger>,
    custody: Arc<InMemoryTokenLedger>,
    metrics: Option<Arc<ServiceMetrics>>,
    service: Arc<NeuronService>,
    state: parking_lot::RwLock<RuntimeState>,
}

impl StakingRuntime {
    pub fn new(config: ServiceConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        config.validate()?;

        let store = Arc::new(InMemoryNeuronStore::with_lock_timeout(
            config.storage.lock_timeout(),
        ));
        let multipliers = Arc::new(InMemoryMultiplierLedger::with_cap(Ratio::from_bps(
            config.policy.max_multiplier_bps,
        )));
        let custody = Arc::new(InMemoryTokenLedger::new());

        let mut service = NeuronService::new(
            &config,
            store.clone(),
            multipliers.clone(),
            custody.clone(),
            clock.clone(),
        );
        let metrics = if config.metrics.enabled {
            let metrics = Arc::new(ServiceMetrics::new()?);
            service = service.with_metrics(metrics.clone());
            Some(metrics)
        } else {
            None
        };

        Ok(Self {
            config,
            clock,
            store,
            multipliers,
            custody,
            metrics,
            service: Arc::new(service),
            state: parking_lot::RwLock::new(RuntimeState::Starting),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn policy(&self) -> &StakingPolicy {
        &self.config.policy
    }

    pub fn service(&self) -> Arc<NeuronService> {
        self.service.clone()
    }

    pub fn store(&self) -> &Arc<InMemoryNeuronStore> {
        &self.store
    }

    pub fn multipliers(&self) -> &Arc<InMemoryMultiplierLedger> {
        &self.multipliers
    }

    pub fn custody(&self) -> &Arc<InMemoryTokenLedger> {
        &self.custody
    }

    pub fn metrics(&self) -> Option<&Arc<ServiceMetrics>> {
        self.metrics.as_ref()
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.read()
    }

    /// Restore neurons from `path`; returns how many were loaded
    pub fn load_snapshot(&self, path: &Path) -> anyhow::Result<usize> {
        let count = match StoreSnapshot::load(path)? {
            Some(snapshot) => snapshot.restore_into(&self.store)?,
            None => {
                tracing::info!("No snapshot at {}, starting empty", path.display());
                0
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.set_neurons(count);
        }
        Ok(count)
    }

    /// Write every neuron to `path`
    pub fn save_snapshot(&self, path: &Path) -> anyhow::Result<usize> {
        let snapshot = StoreSnapshot::capture(&self.store, self.clock.now()?)?;
        let count = snapshot.neurons.len();
        snapshot.save(path)?;
        tracing::info!("Snapshot of {} neurons written to {}", count, path.display());
        Ok(count)
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn run(&self) -> anyhow::Result<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Run until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        if let Some(path) = &self.config.storage.snapshot_path {
            self.load_snapshot(path)?;
        }

        let sweeper = self.config.sweep.enabled.then(|| {
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            let sweeper = RewardSweeper::new(self.service.clone(), self.config.sweep.interval());
            let handle = tokio::spawn(async move { sweeper.run(shutdown_rx).await });
            (shutdown_tx, handle)
        });

        *self.state.write() = RuntimeState::Running;
        tracing::info!(
            sweep = self.config.sweep.enabled,
            metrics = self.config.metrics.enabled,
            "EduStake service running"
        );

        shutdown.await;

        *self.state.write() = RuntimeState::Stopping;
        tracing::info!("Shutting down");

        if let Some((shutdown_tx, handle)) = sweeper {
            let _ = shutdown_tx.send(()).await;
            if let Err(e) = handle.await {
                tracing::warn!("Reward sweep task ended abnormally: {}", e);
            }
        }

        if let Some(path) = &self.config.storage.snapshot_path {
            self.save_snapshot(path)?;
        }

        *self.state.write() = RuntimeState::Stopped;
        Ok(())
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
