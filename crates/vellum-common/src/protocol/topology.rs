use serde::{Deserialize, Serialize};

/// What request classes a node may serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    /// Full cluster member, serves reads and writes.
    #[default]
    Member,
    /// Recovering node. Excluded from read routing while a `Member` is
    /// available; still usable as a last-resort write target.
    Rehab,
}

/// Identity of one cluster member. Immutable; replaced wholesale whenever
/// the topology changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerNode {
    /// Base URL, e.g. `https://a.cluster.local:8080`.
    pub url: String,
    /// Short cluster-unique label identifying the node across topology
    /// versions.
    pub cluster_tag: String,
    #[serde(default)]
    pub role: ServerRole,
}

impl ServerNode {
    pub fn new(url: impl Into<String>, cluster_tag: impl Into<String>) -> Self {
        ServerNode {
            url: url.into(),
            cluster_tag: cluster_tag.into(),
            role: ServerRole::Member,
        }
    }

    pub fn with_role(mut self, role: ServerRole) -> Self {
        self.role = role;
        self
    }
}

/// An ordered, unique-by-tag snapshot of the cluster plus its version.
///
/// The etag is monotonic within one executor: a candidate topology is
/// adopted only if its etag is strictly greater than the held one (or the
/// held one is [`Topology::UNKNOWN_ETAG`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub etag: i64,
    pub nodes: Vec<ServerNode>,
}

impl Topology {
    /// Etag of an unauthoritative topology built from seed URLs.
    pub const UNKNOWN_ETAG: i64 = -1;

    /// Builds a topology, dropping later nodes that repeat a cluster tag.
    pub fn new(etag: i64, nodes: Vec<ServerNode>) -> Self {
        Topology { etag, nodes }.deduped()
    }

    /// Unauthoritative seed topology with synthesized tags `S1`, `S2`, ...
    pub fn from_seed_urls<S: AsRef<str>>(urls: &[S]) -> Self {
        let nodes = urls
            .iter()
            .enumerate()
            .map(|(i, url)| ServerNode::new(url.as_ref(), format!("S{}", i + 1)))
            .collect();
        Topology::new(Self::UNKNOWN_ETAG, nodes)
    }

    /// Enforces the unique-by-tag invariant, keeping first occurrences.
    /// Deserialized topologies go through this before adoption.
    pub fn deduped(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.nodes.retain(|n| seen.insert(n.cluster_tag.clone()));
        self
    }

    pub fn node_by_tag(&self, tag: &str) -> Option<&ServerNode> {
        self.nodes.iter().find(|n| n.cluster_tag == tag)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
