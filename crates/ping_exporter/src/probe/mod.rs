//! Contract with the external probing engine.
//!
//! The engine owns ICMP scheduling, history retention and RTT aggregation. This crate
//! only tells it which addresses to probe and reads back its statistics.

mod key;

use std::{collections::HashMap, net::IpAddr, time::Duration};

use thiserror::Error;

pub use key::{IpVersion, KeyParseError, ProbeKey};

/// Point-in-time statistics for one probed address.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProbeStatistics {
    pub sent: u64,
    pub lost: u64,
    pub best: Duration,
    pub worst: Duration,
    pub mean: Duration,
    pub median: Duration,
    pub std_dev: Duration,
}

impl ProbeStatistics {
    /// At least one echo came back.
    pub fn has_replies(&self) -> bool {
        self.sent > self.lost
    }

    /// Fraction of sent probes that were lost, or `None` before the first probe went out.
    pub fn loss_ratio(&self) -> Option<f64> {
        if self.sent == 0 {
            return None;
        }
        Some(self.lost as f64 / self.sent as f64)
    }
}

/// Full export of the engine: every monitored key with its latest statistics.
pub type Snapshot = HashMap<ProbeKey, ProbeStatistics>;

/// Per-address probing parameters handed to the engine on start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOptions {
    pub interval: Duration,
    pub timeout: Duration,
    pub history_size: usize,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("probing engine refused to monitor {key}: {reason}")]
    Rejected { key: ProbeKey, reason: String },
}

/// Operations the exporter needs from a probing engine.
///
/// All methods must return promptly: `export` is called under the snapshot lock on
/// every scrape and `start`/`stop` are called from the reconciliation tasks.
pub trait ProbeEngine: Send + Sync {
    fn start(&self, key: &ProbeKey, addr: IpAddr, options: &ProbeOptions) -> Result<(), EngineError>;

    fn stop(&self, key: &ProbeKey);

    /// May be empty before the first probe round completes.
    fn export(&self) -> Snapshot;
}
