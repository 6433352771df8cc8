//! Scrape behaviour of the ping collector.

mod common;

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use common::{ScriptedEngine, gauge, ip, samples, stats, targets_in};
use ping_exporter::{
    EngineError, PingCollector, ProbeEngine, ProbeKey, ProbeOptions, Snapshot, server::render,
};
use prometheus::{Registry, core::Collector};

const RTT_METRICS: [&str; 5] = [
    "ping_rtt_best_ms",
    "ping_rtt_worst_ms",
    "ping_rtt_mean_ms",
    "ping_rtt_median_ms",
    "ping_rtt_std_deviation_ms",
];

fn key(host: &str, addr: &str) -> ProbeKey {
    ProbeKey::new(host, ip(addr))
}

fn collector_with(engine: &Arc<ScriptedEngine>) -> PingCollector {
    PingCollector::new(Arc::clone(engine) as Arc<dyn ProbeEngine>).unwrap()
}

#[test]
fn test_successful_probes_emit_all_rtt_metrics() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_export(Snapshot::from([(
        key("example.com", "93.184.216.34"),
        stats(10, 0, 1, 5, 3, 3, 2),
    )]));

    let families = collector_with(&engine).collect();
    let labels = [("target", "example.com"), ("ip", "93.184.216.34"), ("ip_version", "4")];

    for (name, expected) in RTT_METRICS.iter().zip([1.0, 5.0, 3.0, 3.0, 2.0]) {
        assert_eq!(gauge(&families, name, &labels), Some(expected), "{name}");
        assert_eq!(samples(&families, name), 1);
    }

    assert_eq!(samples(&families, "ping_rtt_ms"), 5);
    for (tag, expected) in [("best", 1.0), ("worst", 5.0), ("mean", 3.0), ("median", 3.0), ("std_dev", 2.0)] {
        let mut tagged = labels.to_vec();
        tagged.push(("type", tag));
        assert_eq!(gauge(&families, "ping_rtt_ms", &tagged), Some(expected), "type={tag}");
    }

    assert_eq!(gauge(&families, "ping_loss_percent", &labels), Some(0.0));
}

#[test]
fn test_total_loss_emits_only_loss() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_export(Snapshot::from([(key("example.com", "10.0.0.1"), stats(10, 10, 0, 0, 0, 0, 0))]));

    let families = collector_with(&engine).collect();

    assert_eq!(samples(&families, "ping_rtt_ms"), 0);
    for name in RTT_METRICS {
        assert_eq!(samples(&families, name), 0, "{name}");
    }
    assert_eq!(gauge(&families, "ping_loss_percent", &[("target", "example.com")]), Some(1.0));
}

#[test]
fn test_partial_loss_ratio() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_export(Snapshot::from([(key("example.com", "10.0.0.1"), stats(4, 1, 1, 1, 1, 1, 0))]));

    let families = collector_with(&engine).collect();

    assert_eq!(gauge(&families, "ping_loss_percent", &[("ip", "10.0.0.1")]), Some(0.25));
    assert_eq!(samples(&families, "ping_rtt_best_ms"), 1);
}

#[test]
fn test_nothing_sent_emits_nothing_for_key() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_export(Snapshot::from([
        (key("fresh.example", "10.0.0.1"), stats(0, 0, 0, 0, 0, 0, 0)),
        (key("busy.example", "10.0.0.2"), stats(2, 0, 1, 1, 1, 1, 0)),
    ]));

    let collector = collector_with(&engine);
    let registry = Registry::new();
    registry.register(Box::new(collector.clone())).unwrap();

    let families = registry.gather();
    assert_eq!(targets_in(&families), HashSet::from(["busy.example".to_string()]));
    assert_eq!(samples(&families, "ping_loss_percent"), 1);

    let text = render(&registry).unwrap();
    assert!(!text.contains("NaN"));
    assert!(!text.contains("Inf"));
    assert!(!text.contains("fresh.example"));
}

#[test]
fn test_no_export_yet_is_empty_not_error() {
    let engine = Arc::new(ScriptedEngine::default());
    let collector = collector_with(&engine);
    let registry = Registry::new();
    registry.register(Box::new(collector.clone())).unwrap();

    assert!(collector.collect().is_empty());
    assert_eq!(render(&registry).unwrap(), "");
    assert!(collector.last_good().is_empty());
}

#[test]
fn test_empty_export_serves_previous_output() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_export(Snapshot::from([
        (key("a.example", "10.0.0.1"), stats(10, 1, 1, 5, 3, 3, 2)),
        (key("b.example", "2001:db8::1"), stats(10, 10, 0, 0, 0, 0, 0)),
    ]));

    let registry = Registry::new();
    registry.register(Box::new(collector_with(&engine))).unwrap();

    let first = render(&registry).unwrap();
    // Queue is drained now: every further export is empty.
    let second = render(&registry).unwrap();
    let third = render(&registry).unwrap();

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(second, third);
}

#[test]
fn test_new_export_replaces_snapshot_in_full() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_export(Snapshot::from([
        (key("a.example", "10.0.0.1"), stats(1, 0, 1, 1, 1, 1, 0)),
        (key("b.example", "10.0.0.2"), stats(1, 0, 1, 1, 1, 1, 0)),
    ]));
    engine.push_export(Snapshot::from([(key("c.example", "10.0.0.3"), stats(1, 0, 1, 1, 1, 1, 0))]));

    let collector = collector_with(&engine);
    let before = targets_in(&collector.collect());
    let after = targets_in(&collector.collect());

    assert_eq!(before, HashSet::from(["a.example".to_string(), "b.example".to_string()]));
    assert_eq!(after, HashSet::from(["c.example".to_string()]));
    assert_eq!(collector.last_good().len(), 1);
}

#[test]
fn test_ipv6_labels() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_export(Snapshot::from([(key("example.com", "2001:db8::1"), stats(1, 0, 1, 1, 1, 1, 0))]));

    let families = collector_with(&engine).collect();
    let labels = [("target", "example.com"), ("ip", "2001:db8::1"), ("ip_version", "6")];
    assert_eq!(gauge(&families, "ping_loss_percent", &labels), Some(0.0));
}

/// Alternates between two complete snapshots on every export.
struct Alternating {
    calls: AtomicUsize,
    even: Snapshot,
    odd: Snapshot,
}

impl ProbeEngine for Alternating {
    fn start(&self, _: &ProbeKey, _: std::net::IpAddr, _: &ProbeOptions) -> Result<(), EngineError> {
        Ok(())
    }

    fn stop(&self, _: &ProbeKey) {}

    fn export(&self) -> Snapshot {
        match self.calls.fetch_add(1, Ordering::SeqCst) % 3 {
            0 => self.even.clone(),
            1 => self.odd.clone(),
            _ => Snapshot::new(),
        }
    }
}

#[test]
fn test_concurrent_scrapes_see_whole_snapshots() {
    let even: HashSet<String> = ["a1", "a2", "a3"].iter().map(|s| s.to_string()).collect();
    let odd: HashSet<String> = ["b1", "b2"].iter().map(|s| s.to_string()).collect();

    let to_snapshot = |hosts: &HashSet<String>, base: u8| -> Snapshot {
        hosts
            .iter()
            .enumerate()
            .map(|(i, host)| {
                let addr = std::net::IpAddr::from([10, base, 0, i as u8 + 1]);
                (ProbeKey::new(host.clone(), addr), stats(5, 1, 1, 2, 1, 1, 0))
            })
            .collect()
    };

    let engine = Arc::new(Alternating {
        calls: AtomicUsize::new(0),
        even: to_snapshot(&even, 1),
        odd: to_snapshot(&odd, 2),
    });
    let collector = PingCollector::new(engine).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let collector = collector.clone();
            let (even, odd) = (&even, &odd);
            scope.spawn(move || {
                for _ in 0..200 {
                    let seen = targets_in(&collector.collect());
                    assert!(seen == *even || seen == *odd, "mixed snapshot: {seen:?}");
                }
            });
        }
    });
}
