use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VellumError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Node {tag} cannot serve this request (HTTP {status})")]
    NodeMisdirected { tag: String, status: StatusCode },

    #[error("Server error from node {tag} (HTTP {status}): {body}")]
    ServerError {
        tag: String,
        status: StatusCode,
        body: String,
    },

    #[error("All nodes unavailable after {attempts} attempts, last error: {last}")]
    AllNodesUnavailable {
        attempts: usize,
        last: Box<VellumError>,
    },

    #[error("Client error (HTTP {status}): {body}")]
    ClientError { status: StatusCode, body: String },

    #[error("Cluster topology unavailable: {0}")]
    TopologyUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VellumError {
    /// Whether the failure is transient and worth retrying against another
    /// node. Terminal errors (client errors, exhausted retries, bad
    /// configuration) return `false` and are surfaced after one attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VellumError::Transport(_)
                | VellumError::Timeout(_)
                | VellumError::NodeMisdirected { .. }
                | VellumError::ServerError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, VellumError>;
