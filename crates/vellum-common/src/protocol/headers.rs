//! Wire header names and well-known endpoint paths.
//!
//! Names are lowercase so they can be used with
//! `HeaderName::from_static`; HTTP header matching is case-insensitive.
//! Standard conditional-request headers (`If-None-Match`, `ETag`) come
//! from `hyper::header` and are not duplicated here.

/// Response header carrying the server's current topology etag. A value
/// newer than the locally held one schedules a background topology refresh.
pub const TOPOLOGY_ETAG: &str = "topology-etag";

/// Request header carrying the cluster-unique idempotency id attached to
/// writes that must be deduplicated when retried against another node.
pub const RAFT_REQUEST_ID: &str = "raft-request-id";

/// Well-known read-only endpoint returning the authoritative node list.
pub const TOPOLOGY_PATH: &str = "/cluster/topology";

/// Lightweight liveness endpoint used by health probes and speed tests.
pub const HEALTH_CHECK_PATH: &str = "/healthcheck";
