//! Interface counter collection.
//!
//! [`StatisticsCollector::reset`] records a baseline of every tracked
//! interface's kernel counters; [`StatisticsCollector::snapshot`] returns the
//! difference since then. Counters are read with `cat` on the owning host so
//! the values come from inside that host's namespace.

pub mod summary;

pub use summary::ThroughputSummary;

use crate::error::AppError;
use crate::logging::{LogLevel, Logger};
use crate::process::{ExecTarget, LineCollector, OutputHandling, ProcessSupervisor, RunOptions};
use crate::topology::Topology;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const SYSFS_NET: &str = "/sys/class/net";

/// A per-interface kernel counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    TxPackets,
    TxBytes,
    RxPackets,
    RxBytes,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::TxPackets, Metric::TxBytes, Metric::RxPackets, Metric::RxBytes];

    /// File name under `statistics/`
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TxPackets => "tx_packets",
            Metric::TxBytes => "tx_bytes",
            Metric::RxPackets => "rx_packets",
            Metric::RxBytes => "rx_bytes",
        }
    }

    fn index(&self) -> usize {
        match self {
            Metric::TxPackets => 0,
            Metric::TxBytes => 1,
            Metric::RxPackets => 2,
            Metric::RxBytes => 3,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Counters = [u64; 4];

/// Counter deltas since the last reset.
///
/// Serialised column-wise: `ifaces` is sorted, and entry `i` of each metric
/// list belongs to `ifaces[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub ifaces: Vec<String>,
    pub tx_packets: Vec<u64>,
    pub tx_bytes: Vec<u64>,
    pub rx_packets: Vec<u64>,
    pub rx_bytes: Vec<u64>,
}

impl StatisticsSnapshot {
    fn column(&self, metric: Metric) -> &[u64] {
        match metric {
            Metric::TxPackets => &self.tx_packets,
            Metric::TxBytes => &self.tx_bytes,
            Metric::RxPackets => &self.rx_packets,
            Metric::RxBytes => &self.rx_bytes,
        }
    }

    pub fn get(&self, iface: &str, metric: Metric) -> Option<u64> {
        let index = self.ifaces.iter().position(|i| i == iface)?;
        self.column(metric).get(index).copied()
    }

    pub fn is_all_zero(&self) -> bool {
        Metric::ALL
            .iter()
            .all(|m| self.column(*m).iter().all(|v| *v == 0))
    }

    fn push(&mut self, iface: &str, counters: Counters) {
        self.ifaces.push(iface.to_string());
        self.tx_packets.push(counters[Metric::TxPackets.index()]);
        self.tx_bytes.push(counters[Metric::TxBytes.index()]);
        self.rx_packets.push(counters[Metric::RxPackets.index()]);
        self.rx_bytes.push(counters[Metric::RxBytes.index()]);
    }
}

/// Reads and diffs counters of a fixed interface set
#[derive(Debug, Clone)]
pub struct StatisticsCollector {
    supervisor: ProcessSupervisor,
    logger: Logger,
    /// Interface to owning host, sorted by interface
    interfaces: BTreeMap<String, String>,
    sysfs_root: PathBuf,
    baseline: BTreeMap<String, Counters>,
}

impl StatisticsCollector {
    pub fn new(supervisor: ProcessSupervisor, logger: Logger, interfaces: BTreeMap<String, String>) -> Self {
        Self {
            supervisor,
            logger,
            interfaces,
            sysfs_root: PathBuf::from(SYSFS_NET),
            baseline: BTreeMap::new(),
        }
    }

    /// Track every interface of `topology`
    pub fn for_topology(topology: &Topology, logger: Logger) -> Self {
        Self::new(topology.supervisor().clone(), logger, topology.interfaces().clone())
    }

    /// Read counters below `root` instead of `/sys/class/net`
    pub fn with_sysfs_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.sysfs_root = root.as_ref().to_path_buf();
        self
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.interfaces.keys().map(String::as_str)
    }

    /// Record the current counters as the new baseline
    pub async fn reset(&mut self) {
        self.baseline = self.read_all().await;
    }

    /// Counter deltas since the last [`reset`](Self::reset). Without a
    /// baseline the raw counters are returned.
    pub async fn snapshot(&self) -> StatisticsSnapshot {
        let now = self.read_all().await;
        let mut snapshot = StatisticsSnapshot::default();
        for (iface, current) in &now {
            let base = self.baseline.get(iface).copied().unwrap_or_default();
            let mut delta = [0u64; 4];
            for metric in Metric::ALL {
                let i = metric.index();
                delta[i] = current[i].saturating_sub(base[i]);
            }
            snapshot.push(iface, delta);
        }
        snapshot
    }

    async fn read_all(&self) -> BTreeMap<String, Counters> {
        let mut all = BTreeMap::new();
        for (iface, host) in &self.interfaces {
            let mut counters = [0u64; 4];
            for metric in Metric::ALL {
                counters[metric.index()] = self.read_counter(host, iface, metric).await;
            }
            all.insert(iface.clone(), counters);
        }
        all
    }

    /// One counter value; zero (with an error logged) when nothing parses
    pub async fn read_counter(&self, host: &str, iface: &str, metric: Metric) -> u64 {
        let path = self.sysfs_root.join(iface).join("statistics").join(metric.as_str());
        let collector = LineCollector::new();
        let callback = collector.callback(|line| line.trim().parse::<u64>().ok());

        let result = self
            .supervisor
            .run(
                &ExecTarget::host(host),
                format!("cat {}", path.display()),
                RunOptions::new()
                    .allow_failure()
                    .output(OutputHandling::new().echo(LogLevel::Trace, false, false).callback(callback)),
            )
            .await;

        match (result, collector.take().first()) {
            (Ok(_), Some(value)) => *value,
            (result, _) => {
                let error = AppError::counter_read(iface, metric.as_str());
                let mut entry = self
                    .logger
                    .error(&format!("failed to get metric {} {}", iface, metric))
                    .error_info(&error);
                if let Err(e) = result {
                    entry = entry.field("cause", e.to_string());
                }
                entry.log().await;
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::DirectSubstrate;
    use std::sync::Arc;

    fn write_counters(root: &Path, iface: &str, values: [u64; 4]) {
        let dir = root.join(iface).join("statistics");
        std::fs::create_dir_all(&dir).unwrap();
        for metric in Metric::ALL {
            std::fs::write(dir.join(metric.as_str()), format!("{}\n", values[metric.index()])).unwrap();
        }
    }

    fn collector(root: &Path, ifaces: &[(&str, &str)]) -> (StatisticsCollector, crate::logging::LogCapture) {
        let (logger, capture) = Logger::capture("STATS");
        let supervisor = ProcessSupervisor::new(Arc::new(DirectSubstrate), logger.named("PROC"));
        let interfaces = ifaces.iter().map(|(i, h)| (i.to_string(), h.to_string())).collect();
        (
            StatisticsCollector::new(supervisor, logger, interfaces).with_sysfs_root(root),
            capture,
        )
    }

    #[tokio::test]
    async fn test_reset_then_snapshot_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        write_counters(dir.path(), "h1-eth0", [10, 15_000, 12, 18_000]);
        write_counters(dir.path(), "r1-eth0", [3, 400, 5, 600]);
        let (mut stats, _) = collector(dir.path(), &[("h1-eth0", "h1"), ("r1-eth0", "r1")]);

        stats.reset().await;
        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.ifaces, ["h1-eth0", "r1-eth0"]);
        assert!(snapshot.is_all_zero());
    }

    #[tokio::test]
    async fn test_snapshot_is_delta_since_reset() {
        let dir = tempfile::tempdir().unwrap();
        write_counters(dir.path(), "h1-eth0", [10, 15_000, 12, 18_000]);
        let (mut stats, _) = collector(dir.path(), &[("h1-eth0", "h1")]);

        stats.reset().await;
        write_counters(dir.path(), "h1-eth0", [20, 30_000, 112, 168_000]);
        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.get("h1-eth0", Metric::TxPackets), Some(10));
        assert_eq!(snapshot.get("h1-eth0", Metric::TxBytes), Some(15_000));
        assert_eq!(snapshot.get("h1-eth0", Metric::RxPackets), Some(100));
        assert_eq!(snapshot.get("h1-eth0", Metric::RxBytes), Some(150_000));
        assert_eq!(snapshot.get("h2-eth0", Metric::RxBytes), None);
    }

    #[tokio::test]
    async fn test_unreadable_counter_is_zero_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        write_counters(dir.path(), "h1-eth0", [1, 2, 3, 4]);
        let (stats, capture) = collector(dir.path(), &[("h1-eth0", "h1"), ("h9-eth0", "h9")]);

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.get("h1-eth0", Metric::RxBytes), Some(4));
        assert_eq!(snapshot.get("h9-eth0", Metric::TxPackets), Some(0));
        assert!(capture.contains(LogLevel::Error, "failed to get metric h9-eth0 tx_packets"));
    }

    #[test]
    fn test_snapshot_serialises_column_wise() {
        let mut snapshot = StatisticsSnapshot::default();
        snapshot.push("h1-eth0", [1, 2, 3, 4]);
        snapshot.push("h2-eth0", [5, 6, 7, 8]);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["ifaces"], serde_json::json!(["h1-eth0", "h2-eth0"]));
        assert_eq!(json["rx_packets"], serde_json::json!([3, 7]));
    }
}
