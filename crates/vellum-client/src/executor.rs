use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use hyper::StatusCode;
use serde::de::DeserializeOwned;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vellum_common::protocol::commands::{next_write_id, Command, WriteId};
use vellum_common::protocol::error::{Result, VellumError};
use vellum_common::protocol::headers::{RAFT_REQUEST_ID, TOPOLOGY_ETAG};
use vellum_common::protocol::topology::{ServerNode, Topology};

use crate::cache::{CacheEntry, HttpCache};
use crate::config::ExecutorConfig;
use crate::health::{HealthTracker, NodeProber};
use crate::selector::{NodeSelector, ReadBalanceBehavior};
use crate::speed_test::NodeSpeedTester;
use crate::topology::TopologyHolder;
use crate::topology_updater::{BootstrapState, TopologyUpdater};
use crate::transport::{HyperTransport, Transport, TransportRequest, TransportResponse};

/// Decoded outcome of one executed command.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// True when the body was served from the HTTP cache after a
    /// `304 Not Modified` revalidation.
    pub from_cache: bool,
}

impl CommandResponse {
    pub fn json<R: DeserializeOwned>(&self) -> Result<R> {
        serde_json::from_slice(&self.body).map_err(VellumError::from)
    }
}

/// State shared between the public executor handle and its background
/// tasks (health prober, topology updater, speed tester).
pub(crate) struct ExecutorInner {
    pub(crate) config: ExecutorConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) topology: TopologyHolder,
    pub(crate) cache: HttpCache,
    pub(crate) selector: NodeSelector,
    pub(crate) health: HealthTracker,
    /// Wakes the topology updater ahead of its timer when a response
    /// advertises a newer topology etag.
    pub(crate) refresh: Notify,
    pub(crate) bootstrap: watch::Sender<BootstrapState>,
}

/// The request-execution engine: routes, retries and caches commands
/// against a multi-node cluster.
///
/// One executor owns one logical database's client state (topology,
/// cache, health records) and supports any number of concurrent
/// [`execute`](Self::execute) calls without external locking. Two
/// executors share nothing.
///
/// Dropping the executor aborts its background tasks.
pub struct RequestExecutor {
    inner: Arc<ExecutorInner>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    /// Creates an executor with the production hyper transport.
    ///
    /// The topology starts as an unauthoritative seed built from
    /// `config.seed_urls` and is replaced by the first successful
    /// background topology fetch; commands may be executed immediately and
    /// are routed to the seed nodes until then.
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        let transport = Arc::new(HyperTransport::new(config.tls.as_ref())?);
        Self::with_transport(config, transport)
    }

    /// Creates an executor over a caller-supplied transport. This is the
    /// seam the test suite uses; production code wants
    /// [`new`](Self::new).
    pub fn with_transport(config: ExecutorConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let topology = TopologyHolder::new(Topology::from_seed_urls(&config.seed_urls));
        let cache = HttpCache::new(config.cache_enabled);
        let selector = NodeSelector::new(config.read_balance);
        let health = HealthTracker::new(config.backoff.clone());
        let (bootstrap, _) = watch::channel(BootstrapState::Pending);

        let inner = Arc::new(ExecutorInner {
            config,
            transport,
            topology,
            cache,
            selector,
            health,
            refresh: Notify::new(),
            bootstrap,
        });

        let mut tasks = vec![NodeProber::spawn(Arc::clone(&inner))];
        if inner.config.disable_topology_updates {
            // Nothing will ever fetch a topology; don't leave bootstrap
            // waiters hanging.
            inner.bootstrap.send_replace(BootstrapState::Ready);
        } else {
            tasks.push(TopologyUpdater::spawn(Arc::clone(&inner)));
        }
        if inner.config.read_balance == ReadBalanceBehavior::FastestNode {
            tasks.push(NodeSpeedTester::spawn(Arc::clone(&inner)));
        }

        Ok(RequestExecutor { inner, tasks })
    }

    /// Executes one logical command: select a node, attempt, retry across
    /// candidates on transient failures, and surface a typed terminal
    /// error otherwise.
    pub async fn execute(&self, command: &Command) -> Result<CommandResponse> {
        self.inner.execute(command).await
    }

    /// [`execute`](Self::execute) plus JSON decoding of the body.
    pub async fn execute_json<R: DeserializeOwned>(&self, command: &Command) -> Result<R> {
        self.execute(command).await?.json()
    }

    /// Executes a command pinned to one node: single attempt, no node
    /// selection, no retry, no cache participation. Health accounting
    /// still applies.
    pub async fn execute_on_node(
        &self,
        command: &Command,
        node: &ServerNode,
    ) -> Result<CommandResponse> {
        let write_id = command.requires_unique_write_id.then(next_write_id);
        let response = self.inner.attempt(command, node, write_id, None).await?;
        Ok(CommandResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
            from_cache: false,
        })
    }

    /// The active topology snapshot.
    pub fn topology(&self) -> Arc<Topology> {
        self.inner.topology.current()
    }

    pub fn cache(&self) -> &HttpCache {
        &self.inner.cache
    }

    pub fn health(&self) -> &HealthTracker {
        &self.inner.health
    }

    /// Waits until the first background topology fetch has completed.
    ///
    /// Returns `Ok` once an authoritative topology was adopted, and
    /// [`VellumError::TopologyUnavailable`] if every seed node failed that
    /// first fetch, letting callers distinguish "cluster is down" at
    /// startup from a cluster that merely reshaped. Execution does not
    /// require calling this; commands run against the seed nodes until the
    /// fetch lands.
    pub async fn wait_for_first_topology(&self) -> Result<()> {
        let mut rx = self.inner.bootstrap.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                BootstrapState::Ready => return Ok(()),
                BootstrapState::Failed(reason) => {
                    return Err(VellumError::TopologyUnavailable(reason))
                }
                BootstrapState::Pending => {}
            }
            if rx.changed().await.is_err() {
                return Err(VellumError::TopologyUnavailable(
                    "executor shut down".to_string(),
                ));
            }
        }
    }
}

impl Drop for RequestExecutor {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl ExecutorInner {
    pub(crate) async fn execute(&self, command: &Command) -> Result<CommandResponse> {
        // Assigned once per logical call so a retried write carries the
        // same id to the next node and the cluster can deduplicate it.
        let write_id = command.requires_unique_write_id.then(next_write_id);

        let budget = self
            .config
            .max_retries
            .unwrap_or_else(|| self.topology.current().len())
            .max(1);
        let mut tried: HashSet<String> = HashSet::new();
        let mut last_error: Option<VellumError> = None;

        for attempt in 0..budget {
            let topology = self.topology.current();
            let candidates =
                self.selector
                    .candidates(&topology, &self.health, command.is_read_request);
            let Some(node) = candidates
                .iter()
                .find(|n| !tried.contains(&n.cluster_tag))
                .or_else(|| candidates.first())
                .cloned()
            else {
                return Err(VellumError::TopologyUnavailable(
                    "no known cluster nodes".to_string(),
                ));
            };
            tried.insert(node.cluster_tag.clone());

            let url = command.url_for(&node.url);
            let cached = if command.is_read_request {
                self.cache.get(&url)
            } else {
                None
            };

            match self.attempt(command, &node, write_id, cached.as_ref()).await {
                Ok(response) => return self.finish(command, &url, cached, response),
                Err(err) if err.is_retryable() => {
                    warn!(
                        node = %node.cluster_tag,
                        attempt = attempt + 1,
                        budget,
                        error = %err,
                        "Attempt failed, trying next candidate"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let last = last_error
            .unwrap_or_else(|| VellumError::Transport("no attempt was made".to_string()));
        Err(VellumError::AllNodesUnavailable {
            attempts: budget,
            last: Box::new(last),
        })
    }

    /// One transport exchange against one node, with the per-attempt
    /// timeout and health accounting. Shared by the retry loop, the pinned
    /// execution path, the health prober and the speed tester.
    pub(crate) async fn attempt(
        &self,
        command: &Command,
        node: &ServerNode,
        write_id: Option<WriteId>,
        cached: Option<&CacheEntry>,
    ) -> Result<TransportResponse> {
        let mut headers = HeaderMap::new();
        if command.body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if let Some(entry) = cached {
            // Tokens were lifted out of a response header, so they always
            // round-trip back into one.
            if let Ok(value) = HeaderValue::from_str(&entry.change_token) {
                headers.insert(IF_NONE_MATCH, value);
            }
        }
        if let Some(id) = write_id {
            headers.insert(HeaderName::from_static(RAFT_REQUEST_ID), HeaderValue::from(id));
        }

        let request = TransportRequest {
            method: command.method.clone(),
            url: command.url_for(&node.url),
            headers,
            body: command.body.clone(),
        };

        let timeout = self.config.request_timeout;
        let response = match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                self.health.report_failure(&node.cluster_tag);
                return Err(err);
            }
            Err(_) => {
                self.health.report_failure(&node.cluster_tag);
                return Err(VellumError::Timeout(timeout.as_millis() as u64));
            }
        };

        self.classify(node, response)
    }

    /// Sorts a response into the success / retry / fail buckets and feeds
    /// the health tracker.
    fn classify(&self, node: &ServerNode, response: TransportResponse) -> Result<TransportResponse> {
        let status = response.status;

        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            self.health.report_success(&node.cluster_tag);
            return Ok(response);
        }

        if status == StatusCode::MISDIRECTED_REQUEST {
            self.health.report_failure(&node.cluster_tag);
            return Err(VellumError::NodeMisdirected {
                tag: node.cluster_tag.clone(),
                status,
            });
        }

        if status.is_server_error() {
            self.health.report_failure(&node.cluster_tag);
            return Err(VellumError::ServerError {
                tag: node.cluster_tag.clone(),
                status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        // Remaining 4xx: the node answered; the request itself is at
        // fault. Terminal, one attempt only.
        Err(VellumError::ClientError {
            status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        })
    }

    /// Success path: serve 304s from cache, store fresh read responses,
    /// and schedule a topology refresh if the response advertises a newer
    /// etag.
    fn finish(
        &self,
        command: &Command,
        url: &str,
        cached: Option<CacheEntry>,
        response: TransportResponse,
    ) -> Result<CommandResponse> {
        self.observe_topology_header(&response.headers);

        if response.status == StatusCode::NOT_MODIFIED {
            let Some(entry) = cached else {
                // The server only sees If-None-Match when an entry existed.
                return Err(VellumError::InvalidResponse(
                    "304 Not Modified without a cached entry".to_string(),
                ));
            };
            debug!(%url, "Not modified, serving cached body");
            return Ok(CommandResponse {
                status: StatusCode::OK,
                headers: response.headers,
                body: entry.body,
                from_cache: true,
            });
        }

        if command.is_read_request {
            if let Some(token) = response.headers.get(ETAG).and_then(|v| v.to_str().ok()) {
                self.cache.put(url, response.body.clone(), token);
            }
        }

        Ok(CommandResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
            from_cache: false,
        })
    }

    fn observe_topology_header(&self, headers: &HeaderMap) {
        let Some(remote_etag) = headers
            .get(TOPOLOGY_ETAG)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
        else {
            return;
        };
        if remote_etag > self.topology.etag() && !self.config.disable_topology_updates {
            debug!(remote_etag, "Response advertises newer topology, scheduling refresh");
            self.refresh.notify_one();
        }
    }
}
