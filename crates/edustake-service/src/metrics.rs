//! Prometheus metrics for the neuron service

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Service metrics registry
pub struct ServiceMetrics {
    registry: Registry,
    operations: IntCounterVec,
    neurons: IntGauge,
    sweeps: IntCounter,
    sweep_failures: IntCounter,
    maturity_accrued: IntCounter,
}

impl ServiceMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new("edustake_operations_total", "Neuron operations by outcome"),
            &["operation", "outcome"],
        )?;
        let neurons = IntGauge::new("edustake_neurons", "Neurons currently stored")?;
        let sweeps = IntCounter::new("edustake_sweeps_total", "Completed reward sweeps")?;
        let sweep_failures = IntCounter::new(
            "edustake_sweep_failures_total",
            "Neurons a sweep failed to accrue",
        )?;
        let maturity_accrued = IntCounter::new(
            "edustake_maturity_accrued_e8s_total",
            "Maturity credited by accrual",
        )?;

        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(neurons.clone()))?;
        registry.register(Box::new(sweeps.clone()))?;
        registry.register(Box::new(sweep_failures.clone()))?;
        registry.register(Box::new(maturity_accrued.clone()))?;

        Ok(Self {
            registry,
            operations,
            neurons,
            sweeps,
            sweep_failures,
            maturity_accrued,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count one finished operation; `outcome` is "ok" or an error kind
    pub fn observe(&self, operation: &str, outcome: &str) {
        self.operations
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations
            .with_label_values(&[operation, outcome])
            .get()
    }

    pub fn set_neurons(&self, count: usize) {
        self.neurons.set(count as i64);
    }

    pub fn neurons(&self) -> i64 {
        self.neurons.get()
    }

    pub fn add_neurons(&self, delta: i64) {
        self.neurons.add(delta);
    }

    pub fn record_sweep(&self, failures: u64) {
        self.sweeps.inc();
        self.sweep_failures.inc_by(failures);
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps.get()
    }

    pub fn record_accrual(&self, amount: u64) {
        self.maturity_accrued.inc_by(amount);
    }

    /// Render in the text exposition format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
