use std::time::Duration;

use vellum_common::protocol::error::{Result, VellumError};

use crate::selector::ReadBalanceBehavior;

/// Probe backoff for unhealthy nodes.
///
/// The delay before an unhealthy node becomes eligible for a probe grows
/// exponentially with consecutive failures, capped at `max_probe_delay`.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    ///
    /// Default: 1 second
    pub first_probe_delay: Duration,
    /// Cap on the probe delay.
    ///
    /// Default: 60 seconds
    pub max_probe_delay: Duration,
    /// Growth factor applied per consecutive failure.
    ///
    /// Default: 2.0 (doubles each time)
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            first_probe_delay: Duration::from_secs(1),
            max_probe_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before the next probe given the consecutive-failure count.
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        let base_ms = self.first_probe_delay.as_millis() as u64;
        let multiplier = self.multiplier.powi(consecutive_failures.saturating_sub(1) as i32);
        let backoff_ms = (base_ms as f64 * multiplier) as u64;
        let max_ms = self.max_probe_delay.as_millis() as u64;
        Duration::from_millis(backoff_ms.min(max_ms))
    }
}

/// TLS material for clusters requiring HTTPS and, optionally, mutual TLS.
///
/// All fields are PEM-encoded bytes; nothing is read from disk by this
/// crate.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Client certificate chain followed by its private key. When present,
    /// every connection authenticates with this identity.
    pub client_identity_pem: Option<Vec<u8>>,
    /// Additional trusted root certificates, appended to the built-in
    /// webpki roots (for clusters with private CAs).
    pub trusted_ca_pem: Option<Vec<u8>>,
}

/// Configuration for a [`RequestExecutor`](crate::executor::RequestExecutor).
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Initial node URLs used to bootstrap the topology. At least one is
    /// required; each must start with `http://` or `https://`.
    pub seed_urls: Vec<String>,
    /// Node preference for read commands.
    ///
    /// Default: [`ReadBalanceBehavior::None`]
    pub read_balance: ReadBalanceBehavior,
    /// Maximum number of distinct node attempts per command.
    ///
    /// Default: `None`, meaning the current topology size.
    pub max_retries: Option<usize>,
    /// Timeout applied to every individual attempt. A timed-out attempt is
    /// treated like a connection failure and retried on the next candidate.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,
    /// Whether read responses are cached and revalidated with conditional
    /// requests.
    ///
    /// Default: true
    pub cache_enabled: bool,
    /// Probe backoff for unhealthy nodes.
    pub backoff: BackoffConfig,
    /// Interval of the background health-probe loop.
    ///
    /// Default: 5 seconds
    pub probe_interval: Duration,
    /// Interval of the periodic topology refresh. Refreshes also run
    /// opportunistically when a response advertises a newer topology etag.
    ///
    /// Default: 60 seconds
    pub topology_refresh_interval: Duration,
    /// Interval of the round-trip speed test. Only runs under
    /// [`ReadBalanceBehavior::FastestNode`].
    ///
    /// Default: 60 seconds
    pub speed_test_interval: Duration,
    /// Disables all background topology refreshes. For callers that manage
    /// the topology themselves.
    ///
    /// Default: false
    pub disable_topology_updates: bool,
    /// TLS material. `None` still allows `https://` URLs against publicly
    /// trusted clusters.
    pub tls: Option<TlsConfig>,
}

impl ExecutorConfig {
    pub fn new(seed_urls: Vec<String>) -> Self {
        Self {
            seed_urls,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.seed_urls.is_empty() {
            return Err(VellumError::InvalidConfig(
                "at least one seed URL is required".to_string(),
            ));
        }
        for url in &self.seed_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(VellumError::InvalidConfig(format!(
                    "seed URL '{}' must start with http:// or https://",
                    url
                )));
            }
        }
        Ok(())
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            seed_urls: Vec::new(),
            read_balance: ReadBalanceBehavior::None,
            max_retries: None,
            request_timeout: Duration::from_secs(30),
            cache_enabled: true,
            backoff: BackoffConfig::default(),
            probe_interval: Duration::from_secs(5),
            topology_refresh_interval: Duration::from_secs(60),
            speed_test_interval: Duration::from_secs(60),
            disable_topology_updates: false,
            tls: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_default() {
        let config = BackoffConfig::default();
        assert_eq!(config.first_probe_delay, Duration::from_secs(1));
        assert_eq!(config.max_probe_delay, Duration::from_secs(60));
        assert_eq!(config.multiplier, 2.0);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = BackoffConfig::default();

        assert_eq!(config.delay_for(1), Duration::from_secs(1));
        assert_eq!(config.delay_for(2), Duration::from_secs(2));
        assert_eq!(config.delay_for(3), Duration::from_secs(4));
        assert_eq!(config.delay_for(4), Duration::from_secs(8));

        // Capped at max_probe_delay
        assert_eq!(config.delay_for(7), Duration::from_secs(60));
        assert_eq!(config.delay_for(30), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_zero_failures_uses_base() {
        let config = BackoffConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_secs(1));
    }

    #[test]
    fn test_config_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.read_balance, ReadBalanceBehavior::None);
        assert!(config.max_retries.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.cache_enabled);
        assert!(!config.disable_topology_updates);
        assert!(config.tls.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_seeds() {
        let config = ExecutorConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bare_host() {
        let config = ExecutorConfig::new(vec!["127.0.0.1:8080".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_http_and_https() {
        let config = ExecutorConfig::new(vec![
            "http://a.local:8080".to_string(),
            "https://b.local:8080".to_string(),
        ]);
        assert!(config.validate().is_ok());
    }
}
