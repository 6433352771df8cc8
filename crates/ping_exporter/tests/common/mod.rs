//! Shared fakes for the integration tests.
#![allow(dead_code)]

use std::{
    collections::{HashSet, VecDeque},
    net::IpAddr,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use ping_exporter::{
    EngineError, ProbeEngine, ProbeKey, ProbeOptions, ProbeStatistics, ResolutionError, Snapshot,
    targets::Resolve,
};
use prometheus::proto::MetricFamily;

pub fn ip(raw: &str) -> IpAddr {
    raw.parse().unwrap()
}

pub fn options() -> ProbeOptions {
    ProbeOptions {
        interval: Duration::from_secs(5),
        timeout: Duration::from_secs(4),
        history_size: 10,
    }
}

pub fn stats(sent: u64, lost: u64, best: u64, worst: u64, mean: u64, median: u64, std_dev: u64) -> ProbeStatistics {
    ProbeStatistics {
        sent,
        lost,
        best: Duration::from_millis(best),
        worst: Duration::from_millis(worst),
        mean: Duration::from_millis(mean),
        median: Duration::from_millis(median),
        std_dev: Duration::from_millis(std_dev),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Start(ProbeKey, IpAddr),
    Stop(ProbeKey),
}

/// Records start/stop calls and hands out queued exports, empty once the queue is drained.
#[derive(Default)]
pub struct ScriptedEngine {
    calls: Mutex<Vec<EngineCall>>,
    exports: Mutex<VecDeque<Snapshot>>,
    rejected: Mutex<HashSet<IpAddr>>,
    last_options: Mutex<Option<ProbeOptions>>,
}

impl ScriptedEngine {
    pub fn push_export(&self, snapshot: Snapshot) {
        self.exports.lock().push_back(snapshot);
    }

    pub fn reject(&self, addr: IpAddr) {
        self.rejected.lock().insert(addr);
    }

    pub fn take_calls(&self) -> Vec<EngineCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub fn last_options(&self) -> Option<ProbeOptions> {
        *self.last_options.lock()
    }
}

impl ProbeEngine for ScriptedEngine {
    fn start(&self, key: &ProbeKey, addr: IpAddr, options: &ProbeOptions) -> Result<(), EngineError> {
        self.calls.lock().push(EngineCall::Start(key.clone(), addr));
        *self.last_options.lock() = Some(*options);

        if self.rejected.lock().contains(&addr) {
            return Err(EngineError::Rejected { key: key.clone(), reason: "scripted".into() });
        }
        Ok(())
    }

    fn stop(&self, key: &ProbeKey) {
        self.calls.lock().push(EngineCall::Stop(key.clone()));
    }

    fn export(&self) -> Snapshot {
        self.exports.lock().pop_front().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub enum Answer {
    Addrs(Vec<IpAddr>),
    Fail,
    Hang,
}

/// Resolver returning whatever answer is currently set.
pub struct ScriptedResolver {
    answer: Mutex<Answer>,
    lookups: AtomicUsize,
}

impl ScriptedResolver {
    pub fn new(addrs: &[&str]) -> Self {
        Self {
            answer: Mutex::new(Answer::Addrs(addrs.iter().map(|a| ip(a)).collect())),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, answer: Answer) {
        *self.answer.lock() = answer;
    }

    pub fn answer_with(&self, addrs: &[&str]) {
        self.set(Answer::Addrs(addrs.iter().map(|a| ip(a)).collect()));
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolve for ScriptedResolver {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolutionError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.lock().clone();
        match answer {
            Answer::Addrs(addrs) => Ok(addrs),
            Answer::Fail => Err(ResolutionError::Lookup {
                host: host.to_string(),
                source: "scripted failure".into(),
            }),
            Answer::Hang => std::future::pending().await,
        }
    }
}

/// Value of the gauge in `families` named `name` whose labels include all of `labels`.
pub fn gauge(families: &[MetricFamily], name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    families
        .iter()
        .filter(|family| family.get_name() == name)
        .flat_map(|family| family.get_metric().iter())
        .find(|metric| {
            labels.iter().all(|(k, v)| {
                metric.get_label().iter().any(|pair| pair.get_name() == *k && pair.get_value() == *v)
            })
        })
        .map(|metric| metric.get_gauge().get_value())
}

/// Number of samples across all families named `name`.
pub fn samples(families: &[MetricFamily], name: &str) -> usize {
    families
        .iter()
        .filter(|family| family.get_name() == name)
        .map(|family| family.get_metric().len())
        .sum()
}

/// Distinct `target` label values in `families`.
pub fn targets_in(families: &[MetricFamily]) -> HashSet<String> {
    families
        .iter()
        .flat_map(|family| family.get_metric().iter())
        .flat_map(|metric| metric.get_label().iter())
        .filter(|pair| pair.get_name() == "target")
        .map(|pair| pair.get_value().to_string())
        .collect()
}
