use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use vellum_common::protocol::topology::Topology;

/// Shared holder of the active topology snapshot.
///
/// Readers get a cheap `Arc` clone and can never observe a
/// partially-constructed topology. Updates are single-writer-wins with a
/// strict highest-etag-wins rule: within one executor the active etag never
/// decreases, regardless of the order in which candidate topologies arrive.
pub struct TopologyHolder {
    current: RwLock<Arc<Topology>>,
}

impl TopologyHolder {
    pub fn new(initial: Topology) -> Self {
        TopologyHolder {
            current: RwLock::new(Arc::new(initial.deduped())),
        }
    }

    pub fn current(&self) -> Arc<Topology> {
        self.current.read().clone()
    }

    pub fn etag(&self) -> i64 {
        self.current.read().etag
    }

    /// Adopts the candidate if it is strictly newer than the held topology,
    /// or if the held topology is still the unauthoritative seed. Empty
    /// candidates are never adopted.
    pub fn try_update(&self, candidate: Topology) -> bool {
        if candidate.is_empty() {
            debug!(etag = candidate.etag, "Rejecting empty topology candidate");
            return false;
        }
        let mut current = self.current.write();
        if current.etag != Topology::UNKNOWN_ETAG && candidate.etag <= current.etag {
            return false;
        }
        *current = Arc::new(candidate.deduped());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_common::protocol::topology::ServerNode;

    fn topology(etag: i64, tags: &[&str]) -> Topology {
        Topology::new(
            etag,
            tags.iter()
                .map(|t| ServerNode::new(format!("http://{}", t), *t))
                .collect(),
        )
    }

    #[test]
    fn test_newer_etag_is_adopted() {
        let holder = TopologyHolder::new(topology(1, &["A"]));
        assert!(holder.try_update(topology(2, &["A", "B"])));
        assert_eq!(holder.etag(), 2);
        assert_eq!(holder.current().len(), 2);
    }

    #[test]
    fn test_equal_and_older_etags_are_rejected() {
        let holder = TopologyHolder::new(topology(5, &["A"]));
        assert!(!holder.try_update(topology(5, &["B"])));
        assert!(!holder.try_update(topology(4, &["B"])));
        assert_eq!(holder.current().nodes[0].cluster_tag, "A");
    }

    #[test]
    fn test_out_of_order_arrival_keeps_highest() {
        // Applying T2 then T1 yields T2 when etag(T2) > etag(T1).
        let holder = TopologyHolder::new(topology(1, &["A"]));
        assert!(holder.try_update(topology(3, &["C"])));
        assert!(!holder.try_update(topology(2, &["B"])));
        assert_eq!(holder.etag(), 3);
        assert_eq!(holder.current().nodes[0].cluster_tag, "C");
    }

    #[test]
    fn test_seed_topology_accepts_any_authoritative_candidate() {
        let seed = Topology::from_seed_urls(&["http://a:8080"]);
        let holder = TopologyHolder::new(seed);
        assert_eq!(holder.etag(), Topology::UNKNOWN_ETAG);

        assert!(holder.try_update(topology(0, &["A"])));
        assert_eq!(holder.etag(), 0);
    }

    #[test]
    fn test_empty_candidate_is_rejected() {
        let holder = TopologyHolder::new(topology(1, &["A"]));
        assert!(!holder.try_update(Topology::new(99, vec![])));
        assert_eq!(holder.etag(), 1);
    }

    #[test]
    fn test_readers_see_complete_snapshots() {
        let holder = TopologyHolder::new(topology(1, &["A"]));
        let before = holder.current();
        holder.try_update(topology(2, &["B", "C"]));

        // The old snapshot is unchanged; new readers see the new one.
        assert_eq!(before.len(), 1);
        assert_eq!(holder.current().len(), 2);
    }
}
