use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vellum_common::protocol::commands::Command;
use vellum_common::protocol::error::{Result, VellumError};
use vellum_common::protocol::topology::Topology;

use crate::executor::ExecutorInner;

/// Progress of the very first topology fetch, observed by
/// [`RequestExecutor::wait_for_first_topology`](crate::executor::RequestExecutor::wait_for_first_topology).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BootstrapState {
    Pending,
    Ready,
    /// Every seed node failed the first fetch ("cluster is down").
    Failed(String),
}

/// Background topology refresh.
///
/// Runs on a timer and opportunistically whenever a command response
/// reports a newer topology etag than the one currently held. A failed
/// round is non-fatal: it is logged and retried on the next tick, and
/// never blocks in-flight command execution.
pub(crate) struct TopologyUpdater {
    inner: Arc<ExecutorInner>,
}

impl TopologyUpdater {
    pub(crate) fn spawn(inner: Arc<ExecutorInner>) -> JoinHandle<()> {
        tokio::spawn(async move { TopologyUpdater { inner }.run().await })
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.inner.config.topology_refresh_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.inner.refresh.notified() => {}
            }

            match self.refresh_once().await {
                Ok(adopted) => {
                    if adopted {
                        info!(
                            etag = self.inner.topology.etag(),
                            nodes = self.inner.topology.current().len(),
                            "Adopted newer topology"
                        );
                    }
                    self.inner.bootstrap.send_if_modified(|state| {
                        if *state != BootstrapState::Ready {
                            *state = BootstrapState::Ready;
                            true
                        } else {
                            false
                        }
                    });
                }
                Err(err) => {
                    if self.inner.topology.etag() == Topology::UNKNOWN_ETAG {
                        warn!(%err, "Initial topology fetch failed, will retry");
                        self.inner.bootstrap.send_if_modified(|state| {
                            if *state == BootstrapState::Pending {
                                *state = BootstrapState::Failed(err.to_string());
                                true
                            } else {
                                false
                            }
                        });
                    } else {
                        debug!(%err, "Topology refresh failed, will retry");
                    }
                }
            }
        }
    }

    /// Fetches the topology from the first candidate that answers and
    /// adopts it if newer. Returns whether a new topology was adopted.
    async fn refresh_once(&self) -> Result<bool> {
        let command = Command::get_topology();
        let topology = self.inner.topology.current();
        let candidates = self
            .inner
            .selector
            .candidates(&topology, &self.inner.health, true);

        let mut last_error: Option<VellumError> = None;
        for node in candidates {
            match self.inner.attempt(&command, &node, None, None).await {
                Ok(response) => match serde_json::from_slice::<Topology>(&response.body) {
                    Ok(candidate) => return Ok(self.adopt(candidate)),
                    Err(err) => {
                        debug!(node = %node.cluster_tag, %err, "Malformed topology response");
                        last_error = Some(err.into());
                    }
                },
                Err(err) => {
                    debug!(node = %node.cluster_tag, %err, "Topology fetch attempt failed");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            VellumError::TopologyUnavailable("no known cluster nodes".to_string())
        }))
    }

    fn adopt(&self, candidate: Topology) -> bool {
        let adopted = self.inner.topology.try_update(candidate);
        if adopted {
            // Health records for nodes that left the cluster are reset.
            let current = self.inner.topology.current();
            let tags: HashSet<String> = current
                .nodes
                .iter()
                .map(|n| n.cluster_tag.clone())
                .collect();
            self.inner.health.retain(&tags);
        }
        adopted
    }
}
