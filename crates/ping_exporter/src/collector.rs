//! Prometheus collector turning probing engine exports into gauges.
//!
//! Every scrape pulls a fresh export from the engine. A non-empty export replaces
//! the last good snapshot as a whole; an empty one leaves it in place, so scrapes
//! keep serving the most recent complete picture while the engine has nothing new.

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use prometheus::{
    GaugeVec, Opts,
    core::{Collector, Desc},
    proto::MetricFamily,
};
use tracing::{debug, error};

use crate::probe::{ProbeEngine, ProbeKey, ProbeStatistics, Snapshot};

pub const METRIC_PREFIX: &str = "ping_";

/// Labels carried by every metric.
pub const LABEL_NAMES: [&str; 3] = ["target", "ip", "ip_version"];

/// Extra label of the combined `ping_rtt_ms` metric.
pub const RTT_TYPE_LABEL: &str = "type";

const RTT_SUFFIX: &str = "rtt_ms";
const RTT_HELP: &str = "Round trip time in millis (deprecated)";
const LOSS_SUFFIX: &str = "loss_percent";
const LOSS_HELP: &str = "Packet loss as a ratio of sent packets (0 to 1)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RttKind {
    Best,
    Worst,
    Mean,
    Median,
    StdDev,
}

impl RttKind {
    const ALL: [RttKind; 5] =
        [RttKind::Best, RttKind::Worst, RttKind::Mean, RttKind::Median, RttKind::StdDev];

    /// Value of the `type` label in the combined metric.
    fn tag(self) -> &'static str {
        match self {
            RttKind::Best => "best",
            RttKind::Worst => "worst",
            RttKind::Mean => "mean",
            RttKind::Median => "median",
            RttKind::StdDev => "std_dev",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            RttKind::Best => "rtt_best_ms",
            RttKind::Worst => "rtt_worst_ms",
            RttKind::Mean => "rtt_mean_ms",
            RttKind::Median => "rtt_median_ms",
            RttKind::StdDev => "rtt_std_deviation_ms",
        }
    }

    fn help(self) -> &'static str {
        match self {
            RttKind::Best => "Best round trip time in millis",
            RttKind::Worst => "Worst round trip time in millis",
            RttKind::Mean => "Mean round trip time in millis",
            RttKind::Median => "Median round trip time in millis",
            RttKind::StdDev => "Standard deviation in millis",
        }
    }

    fn of(self, stats: &ProbeStatistics) -> Duration {
        match self {
            RttKind::Best => stats.best,
            RttKind::Worst => stats.worst,
            RttKind::Mean => stats.mean,
            RttKind::Median => stats.median,
            RttKind::StdDev => stats.std_dev,
        }
    }
}

fn metric_name(suffix: &str) -> String {
    format!("{METRIC_PREFIX}{suffix}")
}

fn label_names(with_type: bool) -> Vec<String> {
    let mut names: Vec<String> = LABEL_NAMES.iter().map(|l| l.to_string()).collect();
    if with_type {
        names.push(RTT_TYPE_LABEL.to_string());
    }
    names
}

fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

/// The last complete export seen, guarded by its own lock.
#[derive(Default)]
struct SnapshotCache {
    last_good: Mutex<Arc<Snapshot>>,
}

impl SnapshotCache {
    /// Fetch a new export and swap it in if it carries data. Returns the snapshot to
    /// render; the lock is released before the caller touches it.
    fn refresh(&self, engine: &dyn ProbeEngine) -> Arc<Snapshot> {
        let mut last_good = self.last_good.lock();

        let fresh = engine.export();
        if fresh.is_empty() {
            debug!("probing engine export unavailable, serving cached snapshot");
        } else {
            *last_good = Arc::new(fresh);
        }

        Arc::clone(&last_good)
    }
}

/// Gauges built from scratch for one scrape, so concurrent scrapes never share
/// label state.
struct ScrapeGauges {
    rtt: GaugeVec,
    by_kind: Vec<(RttKind, GaugeVec)>,
    loss: GaugeVec,
}

impl ScrapeGauges {
    fn new() -> prometheus::Result<Self> {
        let labels = LABEL_NAMES;
        let rtt_labels = [LABEL_NAMES[0], LABEL_NAMES[1], LABEL_NAMES[2], RTT_TYPE_LABEL];

        let rtt = GaugeVec::new(Opts::new(metric_name(RTT_SUFFIX), RTT_HELP), &rtt_labels)?;
        let by_kind = RttKind::ALL
            .into_iter()
            .map(|kind| {
                GaugeVec::new(Opts::new(metric_name(kind.suffix()), kind.help()), &labels)
                    .map(|gauge| (kind, gauge))
            })
            .collect::<prometheus::Result<Vec<_>>>()?;
        let loss = GaugeVec::new(Opts::new(metric_name(LOSS_SUFFIX), LOSS_HELP), &labels)?;

        Ok(Self { rtt, by_kind, loss })
    }

    fn observe(&self, key: &ProbeKey, stats: &ProbeStatistics) {
        let [target, ip, version] = key.label_values();
        let labels = [target.as_str(), ip.as_str(), version.as_str()];

        if stats.has_replies() {
            for (kind, gauge) in &self.by_kind {
                let value = millis(kind.of(stats));
                gauge.with_label_values(&labels).set(value);
                self.rtt
                    .with_label_values(&[labels[0], labels[1], labels[2], kind.tag()])
                    .set(value);
            }
        }

        match stats.loss_ratio() {
            Some(loss) => self.loss.with_label_values(&labels).set(loss),
            None => debug!(%key, "no probes sent yet, skipping loss"),
        }
    }

    fn into_families(self) -> Vec<MetricFamily> {
        let mut families = self.rtt.collect();
        families.extend(self.loss.collect());
        for (_, gauge) in &self.by_kind {
            families.extend(gauge.collect());
        }
        families.retain(|family| !family.get_metric().is_empty());
        families
    }
}

/// Scrape-time collector over a [`ProbeEngine`].
///
/// Clones share the same cache. Separately constructed collectors are fully
/// independent.
#[derive(Clone)]
pub struct PingCollector {
    engine: Arc<dyn ProbeEngine>,
    cache: Arc<SnapshotCache>,
    descs: Vec<Desc>,
}

impl PingCollector {
    pub fn new(engine: Arc<dyn ProbeEngine>) -> prometheus::Result<Self> {
        let mut descs = vec![
            Desc::new(
                metric_name(RTT_SUFFIX),
                RTT_HELP.to_string(),
                label_names(true),
                HashMap::new(),
            )?,
            Desc::new(
                metric_name(LOSS_SUFFIX),
                LOSS_HELP.to_string(),
                label_names(false),
                HashMap::new(),
            )?,
        ];
        for kind in RttKind::ALL {
            descs.push(Desc::new(
                metric_name(kind.suffix()),
                kind.help().to_string(),
                label_names(false),
                HashMap::new(),
            )?);
        }

        Ok(Self { engine, cache: Arc::new(SnapshotCache::default()), descs })
    }

    /// Snapshot that the next scrape falls back to if the engine has nothing new.
    pub fn last_good(&self) -> Arc<Snapshot> {
        Arc::clone(&self.cache.last_good.lock())
    }
}

impl Collector for PingCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let snapshot = self.cache.refresh(self.engine.as_ref());
        if snapshot.is_empty() {
            return Vec::new();
        }

        let gauges = match ScrapeGauges::new() {
            Ok(gauges) => gauges,
            Err(e) => {
                error!("failed to build ping gauges: {e}");
                return Vec::new();
            }
        };

        for (key, stats) in snapshot.iter() {
            gauges.observe(key, stats);
        }

        gauges.into_families()
    }
}
