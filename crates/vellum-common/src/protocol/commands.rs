use bytes::Bytes;
use hyper::Method;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::protocol::headers;

/// Cluster-unique idempotency id for deduplicated writes.
pub type WriteId = u64;

static WRITE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Immutable description of one logical operation against the cluster.
///
/// Commands are built by the higher driver layers (sessions, queries, bulk
/// insert) and handed to the request executor, which owns routing, retry
/// and caching. The two flags drive executor policy:
///
/// - `is_read_request` governs node selection (read-balance behavior) and
///   cache participation; writes never touch the cache.
/// - `requires_unique_write_id` marks writes that the cluster must
///   deduplicate if the same logical call is retried against a second node
///   after a mid-flight failure. The executor assigns the id once per call,
///   not once per attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub method: Method,
    /// Path and query relative to a node's base URL, starting with `/`.
    pub path: String,
    pub body: Option<Bytes>,
    pub is_read_request: bool,
    pub requires_unique_write_id: bool,
}

impl Command {
    /// A read command. Participates in caching and read balancing.
    pub fn get(path: impl Into<String>) -> Self {
        Command {
            method: Method::GET,
            path: path.into(),
            body: None,
            is_read_request: true,
            requires_unique_write_id: false,
        }
    }

    /// A write command creating or replacing a resource.
    pub fn put(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::write(Method::PUT, path, Some(body.into()))
    }

    /// A write command submitting a body to a resource.
    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::write(Method::POST, path, Some(body.into()))
    }

    /// A write command removing a resource.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::write(Method::DELETE, path, None)
    }

    fn write(method: Method, path: impl Into<String>, body: Option<Bytes>) -> Self {
        Command {
            method,
            path: path.into(),
            body,
            is_read_request: false,
            requires_unique_write_id: false,
        }
    }

    /// Marks the command as a write the cluster must deduplicate across
    /// retries. The executor attaches the same id to every attempt of one
    /// logical call.
    pub fn with_unique_write_id(mut self) -> Self {
        self.requires_unique_write_id = true;
        self
    }

    /// The well-known topology-fetch command.
    pub fn get_topology() -> Self {
        Self::get(headers::TOPOLOGY_PATH)
    }

    /// The lightweight liveness probe used by health checks and speed tests.
    pub fn health_check() -> Self {
        Self::get(headers::HEALTH_CHECK_PATH)
    }

    /// Fully-qualified URL of this command against one node.
    pub fn url_for(&self, node_url: &str) -> String {
        format!("{}{}", node_url.trim_end_matches('/'), self.path)
    }
}

/// Generates a cluster-unique write id.
///
/// Combines the current timestamp (upper 32 bits) with a process-wide
/// counter (lower 32 bits) so ids stay unique across restarts without
/// coordination.
pub fn next_write_id() -> WriteId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let counter = WRITE_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

    (timestamp & 0xFFFFFFFF00000000) | (counter & 0xFFFFFFFF)
}
