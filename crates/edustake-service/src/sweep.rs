//! Background reward sweep
//!
//! Periodically accrues every neuron so inactive ones do not sit on a stale
//! watermark. Accrual is idempotent, so a sweep racing user operations can
//! never pay a second twice.

use crate::service::{NeuronService, SweepReport};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Statistics for the sweep loop
#[derive(Clone, Debug, Default)]
pub struct SweepStats {
    /// Completed passes
    pub sweeps: u64,
    /// Passes that could not list the store
    pub aborted: u64,
    /// Last completed pass
    pub last_report: Option<SweepReport>,
}

/// Runs `NeuronService::sweep_rewards` on an interval
pub struct RewardSweeper {
    service: Arc<NeuronService>,
    interval: Duration,
    stats: RwLock<SweepStats>,
}

impl RewardSweeper {
    pub fn new(service: Arc<NeuronService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            stats: RwLock::new(SweepStats::default()),
        }
    }

    pub fn stats(&self) -> SweepStats {
        self.stats.read().clone()
    }

    /// One pass, recorded in the statistics
    pub async fn sweep_once(&self) {
        match self.service.sweep_rewards().await {
            Ok(report) => {
                let mut stats = self.stats.write();
                stats.sweeps += 1;
                stats.last_report = Some(report);
            }
            Err(e) => {
                self.stats.write().aborted += 1;
                warn!(kind = e.kind().as_str(), "reward sweep aborted: {}", e);
            }
        }
    }

    /// Run until `shutdown_rx` yields or closes
    pub async fn run(&self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!("Starting reward sweep (interval: {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Reward sweep shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use edustake_core::clock::ManualClock;
    use edustake_core::types::{AccountId, ONE_TOKEN, SECONDS_PER_DAY};
    use edustake_economics::multiplier::InMemoryMultiplierLedger;
    use edustake_storage::custody::InMemoryTokenLedger;
    use edustake_storage::neuron_store::InMemoryNeuronStore;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_accrues_until_shutdown() {
        let clock = Arc::new(ManualClock::new(1_000));
        let custody = Arc::new(InMemoryTokenLedger::new());
        let owner = AccountId::new([5u8; 32]);
        custody.deposit(owner, 100 * ONE_TOKEN);

        let service = Arc::new(NeuronService::new(
            &ServiceConfig::default(),
            Arc::new(InMemoryNeuronStore::new()),
            Arc::new(InMemoryMultiplierLedger::default()),
            custody,
            clock.clone(),
        ));
        let id = service
            .create_neuron(owner, 100 * ONE_TOKEN, 365 * SECONDS_PER_DAY)
            .await
            .unwrap();
        clock.advance(30 * SECONDS_PER_DAY);

        let sweeper = Arc::new(RewardSweeper::new(service.clone(), Duration::from_secs(60)));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let runner = {
            let sweeper = sweeper.clone();
            tokio::spawn(async move { sweeper.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown_tx.send(()).await.unwrap();
        runner.await.unwrap();

        let stats = sweeper.stats();
        assert_eq!(stats.sweeps, 2);
        let report = stats.last_report.unwrap();
        assert_eq!(report.visited, 1);
        // the clock did not move between the two passes
        assert_eq!(report.total_reward, 0);

        let view = service.get_neuron(&id).await.unwrap();
        assert!(view.accumulated_maturity > 0);
    }

    #[tokio::test]
    async fn test_sweep_once_counts_aborts() {
        let store = Arc::new(InMemoryNeuronStore::new());
        let service = Arc::new(NeuronService::new(
            &ServiceConfig::default(),
            store.clone(),
            Arc::new(InMemoryMultiplierLedger::default()),
            Arc::new(InMemoryTokenLedger::new()),
            Arc::new(ManualClock::new(0)),
        ));
        store.set_online(false);

        let sweeper = RewardSweeper::new(service, Duration::from_secs(1));
        sweeper.sweep_once().await;
        assert_eq!(sweeper.stats().aborted, 1);
        assert_eq!(sweeper.stats().sweeps, 0);
    }
}
