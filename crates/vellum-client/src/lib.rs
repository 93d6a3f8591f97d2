//! Vellum Request Execution Engine
//!
//! The client-side core of the Vellum document-database driver: turns a
//! logical [`Command`] into a correctly-routed, cached, retried HTTP
//! exchange against one node of a multi-node cluster.
//!
//! # Overview
//!
//! A [`RequestExecutor`] owns everything one logical database needs:
//!
//! - a [`Topology`] snapshot of the cluster and its monotonic etag,
//!   refreshed in the background and whenever a response advertises a
//!   newer version;
//! - a per-URL [`HttpCache`] used for conditional reads (`If-None-Match` /
//!   `304 Not Modified`);
//! - a [`NodeSelector`] that orders candidate nodes per command, honoring
//!   the configured [`ReadBalanceBehavior`];
//! - a [`HealthTracker`] with background probing and bounded exponential
//!   backoff for nodes that failed.
//!
//! Multiple commands may execute concurrently against one shared executor;
//! all internal state is synchronized behind its own locks and no lock is
//! held across network I/O.
//!
//! # Example
//!
//! ```no_run
//! use vellum_client::{Command, ExecutorConfig, RequestExecutor};
//!
//! # #[tokio::main]
//! # async fn main() -> vellum_client::Result<()> {
//! let config = ExecutorConfig::new(vec!["http://127.0.0.1:8080".to_string()]);
//! let executor = RequestExecutor::new(config)?;
//!
//! let doc: serde_json::Value = executor
//!     .execute_json(&Command::get("/doc/users/1"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod executor;
pub mod health;
pub mod selector;
pub mod topology;
pub mod topology_updater;
pub mod transport;

pub use cache::{CacheEntry, HttpCache};
pub use config::{BackoffConfig, ExecutorConfig, TlsConfig};
pub use executor::{CommandResponse, RequestExecutor};
pub use health::{HealthTracker, NodeStatus};
pub use selector::{NodeSelector, ReadBalanceBehavior};
pub use topology::TopologyHolder;
pub use transport::{HyperTransport, Transport, TransportRequest, TransportResponse};

pub use vellum_common::protocol::{
    Command, Result, ServerNode, ServerRole, Topology, VellumError,
};
