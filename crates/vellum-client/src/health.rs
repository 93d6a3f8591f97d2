use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vellum_common::protocol::commands::Command;

use crate::config::BackoffConfig;
use crate::executor::ExecutorInner;

/// Last-known status of one cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone)]
struct NodeHealth {
    status: NodeStatus,
    consecutive_failures: u32,
    /// Earliest instant at which the node may be probed again.
    retry_after: Instant,
}

/// Per-node health state, keyed by cluster tag.
///
/// Nodes with no record are healthy; a record appears on the first reported
/// failure and disappears again on recovery. Transitions for one node are
/// serialized under the map lock, so two concurrent failure reports cannot
/// lose an increment; different nodes update independently. The lock is
/// never held across I/O.
pub struct HealthTracker {
    records: Mutex<HashMap<String, NodeHealth>>,
    backoff: BackoffConfig,
}

impl HealthTracker {
    pub fn new(backoff: BackoffConfig) -> Self {
        HealthTracker {
            records: Mutex::new(HashMap::new()),
            backoff,
        }
    }

    pub fn is_healthy(&self, tag: &str) -> bool {
        self.records
            .lock()
            .get(tag)
            .map(|r| r.status == NodeStatus::Healthy)
            .unwrap_or(true)
    }

    pub fn consecutive_failures(&self, tag: &str) -> u32 {
        self.records
            .lock()
            .get(tag)
            .map(|r| r.consecutive_failures)
            .unwrap_or(0)
    }

    /// Records a transport-level failure or node-fault response. The node
    /// leaves rotation until a probe succeeds; the probe delay grows with
    /// consecutive failures.
    pub fn report_failure(&self, tag: &str) {
        let mut records = self.records.lock();
        let record = records.entry(tag.to_string()).or_insert_with(|| NodeHealth {
            status: NodeStatus::Healthy,
            consecutive_failures: 0,
            retry_after: Instant::now(),
        });
        record.consecutive_failures += 1;
        let delay = self.backoff.delay_for(record.consecutive_failures);
        record.retry_after = Instant::now() + delay;
        if record.status == NodeStatus::Healthy {
            record.status = NodeStatus::Unhealthy;
            warn!(node = tag, next_probe_in = ?delay, "Node marked unhealthy");
        } else {
            debug!(
                node = tag,
                failures = record.consecutive_failures,
                next_probe_in = ?delay,
                "Node still unhealthy"
            );
        }
    }

    /// Records a successful exchange; the node re-enters rotation and its
    /// failure count resets.
    pub fn report_success(&self, tag: &str) {
        let mut records = self.records.lock();
        if let Some(record) = records.remove(tag) {
            if record.status == NodeStatus::Unhealthy {
                info!(node = tag, "Node recovered");
            }
        }
    }

    /// Unhealthy nodes whose backoff has elapsed and which may be probed.
    pub fn probe_candidates(&self, now: Instant) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|(_, r)| r.status == NodeStatus::Unhealthy && r.retry_after <= now)
            .map(|(tag, _)| tag.clone())
            .collect()
    }

    /// Drops records for nodes that disappeared from a new topology.
    pub fn retain(&self, tags: &HashSet<String>) {
        self.records.lock().retain(|tag, _| tags.contains(tag));
    }
}

/// Background loop probing unhealthy nodes back into rotation.
///
/// Each round collects the nodes whose backoff elapsed and issues a
/// health-check command pinned to each of them, in parallel. The pinned
/// attempt path reports the outcome to the [`HealthTracker`], so a
/// successful probe transitions the node back to healthy and a failed one
/// extends its backoff.
pub(crate) struct NodeProber {
    inner: Arc<ExecutorInner>,
}

impl NodeProber {
    pub(crate) fn spawn(inner: Arc<ExecutorInner>) -> JoinHandle<()> {
        tokio::spawn(async move { NodeProber { inner }.run().await })
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.inner.config.probe_interval);
        loop {
            interval.tick().await;
            self.probe_round().await;
        }
    }

    async fn probe_round(&self) {
        let due = self.inner.health.probe_candidates(Instant::now());
        if due.is_empty() {
            return;
        }

        let topology = self.inner.topology.current();
        let probes: Vec<_> = due
            .iter()
            .filter_map(|tag| topology.node_by_tag(tag))
            .map(|node| {
                let node = node.clone();
                let inner = &self.inner;
                async move {
                    let command = Command::health_check();
                    match inner.attempt(&command, &node, None, None).await {
                        Ok(_) => debug!(node = %node.cluster_tag, "Probe succeeded"),
                        Err(err) => debug!(node = %node.cluster_tag, %err, "Probe failed"),
                    }
                }
            })
            .collect();

        futures::future::join_all(probes).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker() -> HealthTracker {
        HealthTracker::new(BackoffConfig::default())
    }

    #[test]
    fn test_unknown_node_is_healthy() {
        assert!(tracker().is_healthy("A"));
    }

    #[test]
    fn test_failure_marks_unhealthy() {
        let tracker = tracker();
        tracker.report_failure("A");
        assert!(!tracker.is_healthy("A"));
        assert_eq!(tracker.consecutive_failures("A"), 1);
    }

    #[test]
    fn test_success_resets_node() {
        let tracker = tracker();
        tracker.report_failure("A");
        tracker.report_failure("A");
        tracker.report_success("A");
        assert!(tracker.is_healthy("A"));
        assert_eq!(tracker.consecutive_failures("A"), 0);
    }

    #[test]
    fn test_concurrent_failures_are_not_lost() {
        let tracker = Arc::new(tracker());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.report_failure("A");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.consecutive_failures("A"), 800);
    }

    #[test]
    fn test_nodes_are_independent() {
        let tracker = tracker();
        tracker.report_failure("A");
        assert!(!tracker.is_healthy("A"));
        assert!(tracker.is_healthy("B"));
    }

    #[test]
    fn test_probe_eligibility_respects_backoff() {
        let tracker = HealthTracker::new(BackoffConfig {
            first_probe_delay: Duration::from_secs(10),
            max_probe_delay: Duration::from_secs(60),
            multiplier: 2.0,
        });
        tracker.report_failure("A");

        let now = Instant::now();
        assert!(tracker.probe_candidates(now).is_empty());
        assert_eq!(
            tracker.probe_candidates(now + Duration::from_secs(11)),
            vec!["A".to_string()]
        );
    }

    #[test]
    fn test_repeated_failures_extend_backoff() {
        let tracker = HealthTracker::new(BackoffConfig {
            first_probe_delay: Duration::from_secs(10),
            max_probe_delay: Duration::from_secs(300),
            multiplier: 2.0,
        });
        tracker.report_failure("A");
        tracker.report_failure("A");
        tracker.report_failure("A");

        // Three failures: delay is 10 * 2^2 = 40 seconds.
        let now = Instant::now();
        assert!(tracker.probe_candidates(now + Duration::from_secs(30)).is_empty());
        assert!(!tracker
            .probe_candidates(now + Duration::from_secs(41))
            .is_empty());
    }

    #[test]
    fn test_retain_drops_departed_nodes() {
        let tracker = tracker();
        tracker.report_failure("A");
        tracker.report_failure("B");

        let survivors: HashSet<String> = ["B".to_string()].into_iter().collect();
        tracker.retain(&survivors);

        assert!(tracker.is_healthy("A"));
        assert_eq!(tracker.consecutive_failures("A"), 0);
        assert!(!tracker.is_healthy("B"));
    }
}
