use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use vellum_common::protocol::topology::{ServerNode, ServerRole, Topology};

use crate::health::HealthTracker;

/// Node preference for read commands.
///
/// Writes always go through leader-preferred ordering (index 0 first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadBalanceBehavior {
    /// Reads also prefer index 0, like writes.
    #[default]
    None,
    /// Successive reads rotate the preferred starting node.
    RoundRobin,
    /// Reads prefer the node with the lowest measured round-trip time.
    /// Falls back to `None` ordering until the first measurement lands.
    FastestNode,
}

/// Orders the nodes to attempt for one command.
///
/// Healthy nodes come first in rotation order starting from the preferred
/// index; unhealthy nodes (and, for reads, `Rehab` nodes) are appended as a
/// fallback tail rather than dropped: trying a known-bad node beats
/// failing outright when nothing better exists. The result is never empty
/// for a non-empty topology.
pub struct NodeSelector {
    behavior: ReadBalanceBehavior,
    round_robin: AtomicUsize,
    fastest: RwLock<Option<String>>,
}

impl NodeSelector {
    pub fn new(behavior: ReadBalanceBehavior) -> Self {
        NodeSelector {
            behavior,
            round_robin: AtomicUsize::new(0),
            fastest: RwLock::new(None),
        }
    }

    /// Records the winner of a speed-test round.
    pub fn record_fastest(&self, tag: impl Into<String>) {
        *self.fastest.write() = Some(tag.into());
    }

    pub fn fastest(&self) -> Option<String> {
        self.fastest.read().clone()
    }

    /// Ordered candidate list, first-to-try first. Recomputed fresh for
    /// every attempt, since health can change mid-retry-loop.
    pub fn candidates(
        &self,
        topology: &Topology,
        health: &HealthTracker,
        is_read: bool,
    ) -> Vec<ServerNode> {
        let nodes = &topology.nodes;
        if nodes.is_empty() {
            return Vec::new();
        }

        let start = if is_read {
            self.preferred_read_index(nodes)
        } else {
            0
        };

        let mut preferred = Vec::with_capacity(nodes.len());
        let mut fallback = Vec::new();
        for offset in 0..nodes.len() {
            let node = &nodes[(start + offset) % nodes.len()];
            let usable = health.is_healthy(&node.cluster_tag)
                && (!is_read || node.role == ServerRole::Member);
            if usable {
                preferred.push(node.clone());
            } else {
                fallback.push(node.clone());
            }
        }
        preferred.append(&mut fallback);
        preferred
    }

    fn preferred_read_index(&self, nodes: &[ServerNode]) -> usize {
        match self.behavior {
            ReadBalanceBehavior::None => 0,
            ReadBalanceBehavior::RoundRobin => {
                self.round_robin.fetch_add(1, Ordering::Relaxed) % nodes.len()
            }
            ReadBalanceBehavior::FastestNode => self
                .fastest
                .read()
                .as_deref()
                .and_then(|tag| nodes.iter().position(|n| n.cluster_tag == tag))
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffConfig;

    fn topology(tags: &[&str]) -> Topology {
        Topology::new(
            1,
            tags.iter()
                .map(|t| ServerNode::new(format!("http://{}", t), *t))
                .collect(),
        )
    }

    fn tags(candidates: &[ServerNode]) -> Vec<&str> {
        candidates.iter().map(|n| n.cluster_tag.as_str()).collect()
    }

    #[test]
    fn test_writes_prefer_first_node() {
        let selector = NodeSelector::new(ReadBalanceBehavior::RoundRobin);
        let health = HealthTracker::new(BackoffConfig::default());
        let topo = topology(&["A", "B", "C"]);

        for _ in 0..5 {
            let candidates = selector.candidates(&topo, &health, false);
            assert_eq!(tags(&candidates), vec!["A", "B", "C"]);
        }
    }

    #[test]
    fn test_round_robin_rotates_reads() {
        let selector = NodeSelector::new(ReadBalanceBehavior::RoundRobin);
        let health = HealthTracker::new(BackoffConfig::default());
        let topo = topology(&["A", "B", "C"]);

        assert_eq!(tags(&selector.candidates(&topo, &health, true)), vec!["A", "B", "C"]);
        assert_eq!(tags(&selector.candidates(&topo, &health, true)), vec!["B", "C", "A"]);
        assert_eq!(tags(&selector.candidates(&topo, &health, true)), vec!["C", "A", "B"]);
        assert_eq!(tags(&selector.candidates(&topo, &health, true)), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_unhealthy_node_is_demoted_not_dropped() {
        let selector = NodeSelector::new(ReadBalanceBehavior::None);
        let health = HealthTracker::new(BackoffConfig::default());
        let topo = topology(&["A", "B", "C"]);

        health.report_failure("A");
        let candidates = selector.candidates(&topo, &health, true);
        assert_eq!(tags(&candidates), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_all_unhealthy_returns_full_rotation() {
        let selector = NodeSelector::new(ReadBalanceBehavior::None);
        let health = HealthTracker::new(BackoffConfig::default());
        let topo = topology(&["A", "B", "C"]);

        for tag in ["A", "B", "C"] {
            health.report_failure(tag);
        }
        let candidates = selector.candidates(&topo, &health, true);
        assert_eq!(candidates.len(), 3);
        assert_eq!(tags(&candidates), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_rehab_node_is_demoted_for_reads_only() {
        let selector = NodeSelector::new(ReadBalanceBehavior::None);
        let health = HealthTracker::new(BackoffConfig::default());
        let topo = Topology::new(
            1,
            vec![
                ServerNode::new("http://a", "A").with_role(ServerRole::Rehab),
                ServerNode::new("http://b", "B"),
            ],
        );

        assert_eq!(tags(&selector.candidates(&topo, &health, true)), vec!["B", "A"]);
        assert_eq!(tags(&selector.candidates(&topo, &health, false)), vec!["A", "B"]);
    }

    #[test]
    fn test_fastest_node_preferred_once_measured() {
        let selector = NodeSelector::new(ReadBalanceBehavior::FastestNode);
        let health = HealthTracker::new(BackoffConfig::default());
        let topo = topology(&["A", "B", "C"]);

        // No measurement yet: leader-preferred ordering.
        assert_eq!(tags(&selector.candidates(&topo, &health, true)), vec!["A", "B", "C"]);

        selector.record_fastest("B");
        assert_eq!(tags(&selector.candidates(&topo, &health, true)), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_fastest_tag_missing_from_topology_falls_back() {
        let selector = NodeSelector::new(ReadBalanceBehavior::FastestNode);
        let health = HealthTracker::new(BackoffConfig::default());
        let topo = topology(&["A", "B"]);

        selector.record_fastest("Z");
        assert_eq!(tags(&selector.candidates(&topo, &health, true)), vec!["A", "B"]);
    }

    #[test]
    fn test_empty_topology_yields_no_candidates() {
        let selector = NodeSelector::new(ReadBalanceBehavior::None);
        let health = HealthTracker::new(BackoffConfig::default());
        let topo = Topology::new(1, vec![]);
        assert!(selector.candidates(&topo, &health, true).is_empty());
    }
}
