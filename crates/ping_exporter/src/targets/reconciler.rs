use std::{collections::BTreeSet, net::IpAddr, sync::Arc, time::Duration};

use tokio::{
    task::{JoinHandle, JoinSet},
    time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ResolutionError, Target, TargetRegistry};
use crate::probe::{ProbeEngine, ProbeKey, ProbeOptions};

/// Start/stop calls issued by one reconciliation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub started: usize,
    pub stopped: usize,
}

/// Completion summary of a pass over all targets.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub reconciled: usize,
    pub failed: usize,
    pub started: usize,
    pub stopped: usize,
    pub cancelled: bool,
}

impl CycleReport {
    fn record(&mut self, outcome: Option<ReconcileOutcome>) {
        match outcome {
            Some(outcome) => {
                self.reconciled += 1;
                self.started += outcome.started;
                self.stopped += outcome.stopped;
            }
            None => self.failed += 1,
        }
    }
}

/// Aligns the engine's monitored addresses with each target's DNS answer.
pub struct Reconciler {
    engine: Arc<dyn ProbeEngine>,
    options: ProbeOptions,
    dns_timeout: Duration,
}

impl Reconciler {
    /// DNS lookups are bounded by the probe timeout unless overridden.
    pub fn new(engine: Arc<dyn ProbeEngine>, options: ProbeOptions) -> Self {
        Self { engine, dns_timeout: options.timeout, options }
    }

    pub fn with_dns_timeout(mut self, dns_timeout: Duration) -> Self {
        self.dns_timeout = dns_timeout;
        self
    }

    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    /// Resolve `target` to a non-empty address set.
    ///
    /// Literal IP hostnames resolve to themselves without a lookup.
    pub async fn resolve(&self, target: &Target) -> Result<BTreeSet<IpAddr>, ResolutionError> {
        if let Ok(ip) = target.host().parse::<IpAddr>() {
            return Ok(BTreeSet::from([ip]));
        }

        let addrs = timeout(self.dns_timeout, target.resolver().lookup_ip(target.host()))
            .await
            .map_err(|_| ResolutionError::Timeout {
                host: target.host().to_string(),
                timeout: self.dns_timeout,
            })??;

        let addrs: BTreeSet<IpAddr> = addrs.into_iter().collect();
        if addrs.is_empty() {
            return Err(ResolutionError::NoAddresses { host: target.host().to_string() });
        }

        Ok(addrs)
    }

    /// Stop probes for vanished addresses, start probes for new ones, then record the
    /// new address set. On resolution failure nothing is touched.
    pub async fn reconcile(&self, target: &Target) -> Result<ReconcileOutcome, ResolutionError> {
        let addrs = self.resolve(target).await?;

        let mut resolved = target.resolved().lock().await;
        let mut outcome = ReconcileOutcome::default();

        for ip in resolved.difference(&addrs) {
            let key = ProbeKey::new(target.host(), *ip);
            info!("removing target for host {} ({})", target.host(), ip);
            self.engine.stop(&key);
            outcome.stopped += 1;
        }

        for ip in addrs.difference(&resolved) {
            let key = ProbeKey::new(target.host(), *ip);
            info!("adding target for host {} ({})", target.host(), ip);
            if let Err(e) = self.engine.start(&key, *ip, &self.options) {
                error!("{e}");
            }
            outcome.started += 1;
        }

        *resolved = addrs;
        Ok(outcome)
    }

    async fn reconcile_logged(&self, target: &Target) -> Option<ReconcileOutcome> {
        match self.reconcile(target).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(host = target.host(), "could not refresh dns: {e}");
                None
            }
        }
    }

    /// Reconcile every target once, in order, each no earlier than its start delay
    /// after the call began.
    pub async fn reconcile_initial(&self, registry: &TargetRegistry) -> CycleReport {
        let began = Instant::now();
        let mut report = CycleReport::default();

        for target in registry.targets() {
            sleep_until(began + target.start_delay()).await;
            report.record(self.reconcile_logged(target).await);
        }

        report
    }

    /// One refresh cycle: a task per target, all awaited. Cancelling `token` aborts the
    /// tasks still in flight.
    pub async fn run_cycle(
        self: &Arc<Self>,
        registry: &TargetRegistry,
        token: &CancellationToken,
    ) -> CycleReport {
        let mut tasks = JoinSet::new();
        for target in registry.targets() {
            let reconciler = Arc::clone(self);
            let target = Arc::clone(target);
            tasks.spawn(async move { reconciler.reconcile_logged(&target).await });
        }

        let mut report = CycleReport::default();
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tasks.shutdown().await;
                    report.cancelled = true;
                    break;
                }
                next = tasks.join_next() => match next {
                    Some(Ok(outcome)) => report.record(outcome),
                    Some(Err(e)) => {
                        error!("reconciliation task failed: {e}");
                        report.failed += 1;
                    }
                    None => break,
                },
            }
        }

        report
    }
}

/// Periodically re-reconcile all targets until `token` is cancelled.
///
/// Returns `None` when `period` is zero, which disables refreshing.
pub fn spawn_refresh(
    reconciler: Arc<Reconciler>,
    registry: Arc<TargetRegistry>,
    period: Duration,
    token: CancellationToken,
) -> Option<JoinHandle<()>> {
    if period.is_zero() {
        info!("DNS refresh disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    info!("refreshing DNS");
                    let report = reconciler.run_cycle(&registry, &token).await;
                    if report.failed > 0 {
                        warn!(
                            "DNS refresh finished with {} of {} targets failing",
                            report.failed,
                            registry.len()
                        );
                    }
                    debug!(?report, "DNS refresh cycle complete");
                }
            }
        }

        debug!("DNS refresh stopped");
    }))
}
