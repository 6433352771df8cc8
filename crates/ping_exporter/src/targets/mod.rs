//! Configured targets and the reconciliation that keeps the engine's monitored
//! addresses in line with DNS.
//!
//! Each [`Target`] remembers the address set it last resolved to. The [`Reconciler`]
//! is the only writer of that set: it resolves the hostname, starts and stops probes
//! for the difference, then records the new set.

mod reconciler;
mod resolver;

use std::{
    collections::BTreeSet,
    fmt,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use tokio::sync::Mutex;

use crate::{config::Config, error::StartupError};

pub use reconciler::{CycleReport, ReconcileOutcome, Reconciler, spawn_refresh};
pub use resolver::{NameserverResolver, Resolve, ResolutionError, SystemResolver};

/// Spacing between consecutive targets' first reconciliation.
pub const START_DELAY_STEP: Duration = Duration::from_millis(10);

/// A configured hostname together with its current resolution.
pub struct Target {
    host: String,
    nameserver: Option<SocketAddr>,
    start_delay: Duration,
    resolver: Arc<dyn Resolve>,
    /// Locked across diff-and-apply so overlapping reconciliations of one target never interleave.
    resolved: Mutex<BTreeSet<IpAddr>>,
}

impl Target {
    /// Target using the system resolver, or `nameserver` when one is given.
    pub fn new(
        host: impl Into<String>,
        nameserver: Option<SocketAddr>,
        start_delay: Duration,
        dns_timeout: Duration,
    ) -> Self {
        let resolver: Arc<dyn Resolve> = match nameserver {
            Some(addr) => Arc::new(NameserverResolver::new(addr, dns_timeout)),
            None => Arc::new(SystemResolver),
        };

        Self {
            host: host.into(),
            nameserver,
            start_delay,
            resolver,
            resolved: Mutex::new(BTreeSet::new()),
        }
    }

    /// Target backed by an arbitrary resolver.
    pub fn with_resolver(
        host: impl Into<String>,
        resolver: Arc<dyn Resolve>,
        start_delay: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            nameserver: None,
            start_delay,
            resolver,
            resolved: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn nameserver(&self) -> Option<SocketAddr> {
        self.nameserver
    }

    pub fn start_delay(&self) -> Duration {
        self.start_delay
    }

    pub(crate) fn resolver(&self) -> &dyn Resolve {
        self.resolver.as_ref()
    }

    pub(crate) fn resolved(&self) -> &Mutex<BTreeSet<IpAddr>> {
        &self.resolved
    }

    /// Addresses currently being probed for this target.
    pub async fn resolved_addresses(&self) -> BTreeSet<IpAddr> {
        self.resolved.lock().await.clone()
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("host", &self.host)
            .field("nameserver", &self.nameserver)
            .field("start_delay", &self.start_delay)
            .finish_non_exhaustive()
    }
}

/// Ordered, fixed set of targets for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: Vec<Arc<Target>>,
}

impl TargetRegistry {
    pub fn new(targets: Vec<Target>) -> Result<Self, StartupError> {
        if targets.is_empty() {
            return Err(StartupError::NoTargets);
        }
        Ok(Self { targets: targets.into_iter().map(Arc::new).collect() })
    }

    /// One target per configured hostname, the i-th delayed by `i * START_DELAY_STEP`.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let targets = config
            .targets
            .iter()
            .enumerate()
            .map(|(i, host)| {
                Target::new(
                    host.clone(),
                    config.dns.nameserver,
                    START_DELAY_STEP * i as u32,
                    config.ping.timeout,
                )
            })
            .collect();

        Self::new(targets)
    }

    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
