use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default User-Agent string for requests sent by [`HyperTransport`](crate::HyperTransport)
pub const DEFAULT_USER_AGENT: &str = concat!("modkit-sling/", env!("CARGO_PKG_VERSION"));

/// Transport security configuration
///
/// Controls whether the transport enforces TLS or allows plain HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Send `http://` and `https://` URLs
    #[default]
    AllowInsecureHttp,
    /// Reject `http://` URLs before any connection is attempted
    TlsOnly,
}

/// Configuration of the hyper-based [`HyperTransport`](crate::HyperTransport).
///
/// Deserializes from partial documents; missing fields take their defaults.
/// Durations use the humantime format (`"30s"`, `"1m 30s"`).
///
/// ```
/// use modkit_sling::{TransportConfig, TransportSecurity};
/// use std::time::Duration;
///
/// let config: TransportConfig =
///     serde_json::from_str(r#"{ "request_timeout": "5s", "security": "tls_only" }"#).unwrap();
/// assert_eq!(config.request_timeout, Duration::from_secs(5));
/// assert_eq!(config.security, TransportSecurity::TlsOnly);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-request timeout covering connect, send and response headers
    /// (default: 30 seconds)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent header value, applied when a request carries none
    pub user_agent: String,

    /// Timeout for idle pooled connections (default: 90 seconds)
    ///
    /// `None` keeps hyper-util's default.
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    pub pool_max_idle_per_host: usize,

    /// Transport security mode (default: `AllowInsecureHttp`)
    pub security: TransportSecurity,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            security: TransportSecurity::AllowInsecureHttp,
        }
    }
}

impl TransportConfig {
    /// HTTPS-only configuration with the default limits
    #[must_use]
    pub fn tls_only() -> Self {
        Self {
            security: TransportSecurity::TlsOnly,
            ..Self::default()
        }
    }

    /// Configuration for talking to local mock servers: short timeouts and
    /// a small connection pool.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1 MB
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }
}
