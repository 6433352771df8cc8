use std::sync::Arc;

use prometheus::Registry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    collector::PingCollector,
    config::Config,
    error::StartupError,
    probe::ProbeEngine,
    targets::{Reconciler, TargetRegistry, spawn_refresh},
};

/// A running exporter: targets reconciled, refresh loop spawned, collector registered.
pub struct Exporter {
    targets: Arc<TargetRegistry>,
    reconciler: Arc<Reconciler>,
    collector: PingCollector,
    registry: Registry,
    shutdown: CancellationToken,
    refresh: Option<JoinHandle<()>>,
}

impl Exporter {
    pub async fn start(config: &Config, engine: Arc<dyn ProbeEngine>) -> Result<Self, StartupError> {
        config.validate()?;
        let targets = TargetRegistry::from_config(config)?;
        Self::start_with_targets(config, targets, engine).await
    }

    /// Like [`Exporter::start`] with a prebuilt target registry.
    ///
    /// The collector is registered before any target is reconciled, so a registration
    /// failure leaves the engine untouched.
    pub async fn start_with_targets(
        config: &Config,
        targets: TargetRegistry,
        engine: Arc<dyn ProbeEngine>,
    ) -> Result<Self, StartupError> {
        let collector = PingCollector::new(Arc::clone(&engine))?;
        let registry = Registry::new();
        registry.register(Box::new(collector.clone()))?;

        let targets = Arc::new(targets);
        let reconciler = Arc::new(Reconciler::new(engine, config.probe_options()));

        let report = reconciler.reconcile_initial(&targets).await;
        info!(
            "Monitoring {} addresses for {} targets ({} could not be resolved)",
            report.started,
            targets.len(),
            report.failed
        );

        let shutdown = CancellationToken::new();
        let refresh = spawn_refresh(
            Arc::clone(&reconciler),
            Arc::clone(&targets),
            config.dns.refresh,
            shutdown.child_token(),
        );

        Ok(Self { targets, reconciler, collector, registry, shutdown, refresh })
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn collector(&self) -> &PingCollector {
        &self.collector
    }

    /// Registry holding the ping collector, ready to be gathered on scrape.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Stop the refresh loop, aborting a cycle in flight, and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.refresh.take() {
            if let Err(e) = handle.await {
                warn!("DNS refresh task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for Exporter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
