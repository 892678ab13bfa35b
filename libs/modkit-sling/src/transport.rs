//! Request execution seam.
//!
//! A [`RequestBuilder`](crate::RequestBuilder) never talks to the network
//! itself; it hands finished requests to a [`Transport`]. [`HyperTransport`]
//! is the bundled implementation and [`default_transport`] the lazily built
//! process-wide instance used when no transport is injected.

use crate::body::RequestBody;
use crate::config::{TransportConfig, TransportSecurity};
use crate::error::{BoxError, HttpError, InvalidHeader};
use crate::response::{LimitedBody, ResponseBody};
use async_trait::async_trait;
use http::header::{HeaderValue, USER_AGENT};
use http::Response;
use http_body_util::BodyExt;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Request handed to a [`Transport`].
pub type Request = http::Request<RequestBody>;

/// Executes requests and returns responses with unread bodies.
///
/// Implementations must return `Ok` for every HTTP status; only failures to
/// obtain a response (connect, TLS, timeout) are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the response once its head has arrived.
    async fn execute(&self, request: Request) -> Result<Response<ResponseBody>, HttpError>;
}

type HyperClient = Client<HttpsConnector<HttpConnector>, RequestBody>;

/// [`Transport`] backed by a pooled hyper client with rustls TLS.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    user_agent: HeaderValue,
    timeout: Duration,
    max_body_size: usize,
    security: TransportSecurity,
}

impl HyperTransport {
    /// Transport with [`TransportConfig::default`].
    ///
    /// # Errors
    /// Returns `HttpError::Tls` if the TLS connector cannot be initialized.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_config(TransportConfig::default())
    }

    /// Transport with an explicit configuration.
    ///
    /// # Errors
    /// Returns `HttpError::Tls` if the TLS connector cannot be initialized, or
    /// `HttpError::InvalidHeader` if `user_agent` is not a valid header value.
    pub fn with_config(config: TransportConfig) -> Result<Self, HttpError> {
        let user_agent =
            HeaderValue::try_from(config.user_agent).map_err(|e| InvalidHeader {
                name: USER_AGENT.to_string(),
                reason: e.to_string(),
            })?;

        let https = build_https_connector(config.security)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout has no effect without a pool timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let client: HyperClient = client_builder.build(https);

        tracing::debug!(
            security = ?config.security,
            timeout = ?config.request_timeout,
            max_body_size = config.max_body_size,
            "hyper transport initialized"
        );

        Ok(Self {
            client,
            user_agent,
            timeout: config.request_timeout,
            max_body_size: config.max_body_size,
            security: config.security,
        })
    }

    fn check_scheme(&self, request: &Request) -> Result<(), HttpError> {
        match request.uri().scheme_str().unwrap_or_default() {
            "https" => Ok(()),
            "http" => match self.security {
                TransportSecurity::AllowInsecureHttp => Ok(()),
                TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
                }),
            },
            other => Err(HttpError::InvalidScheme {
                scheme: other.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
        }
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn execute(&self, mut request: Request) -> Result<Response<ResponseBody>, HttpError> {
        self.check_scheme(&request)?;

        if !request.headers().contains_key(USER_AGENT) {
            request
                .headers_mut()
                .insert(USER_AGENT, self.user_agent.clone());
        }

        // The deadline covers connecting and waiting for the response head
        let Ok(result) = tokio::time::timeout(self.timeout, self.client.request(request)).await
        else {
            return Err(HttpError::Timeout(self.timeout));
        };
        let response = result?;

        let max_body_size = self.max_body_size;
        Ok(response.map(|body| {
            LimitedBody::new(body, max_body_size)
                .map_err(BoxError::from)
                .boxed()
        }))
    }
}

/// HTTPS connector over webpki roots.
///
/// ALPN advertises both h2 and http/1.1.
fn build_https_connector(
    security: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let provider = rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    let builder = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(provider)
        .map_err(|e| HttpError::Tls(Box::new(e)))?;

    let connector = match security {
        TransportSecurity::AllowInsecureHttp => {
            builder.https_or_http().enable_all_versions().build()
        }
        TransportSecurity::TlsOnly => builder.https_only().enable_all_versions().build(),
    };
    Ok(connector)
}

/// Stand-in for a default transport that failed to initialize.
struct UnavailableTransport {
    reason: String,
}

#[async_trait]
impl Transport for UnavailableTransport {
    async fn execute(&self, _request: Request) -> Result<Response<ResponseBody>, HttpError> {
        Err(HttpError::Tls(self.reason.clone().into()))
    }
}

static DEFAULT_TRANSPORT: OnceLock<Arc<dyn Transport>> = OnceLock::new();

/// Process-wide [`HyperTransport`] with the default configuration.
///
/// Built on first use and shared afterwards; there is no teardown. If the
/// transport cannot be built, every request sent through it fails with
/// `HttpError::Tls`.
#[must_use]
pub fn default_transport() -> Arc<dyn Transport> {
    Arc::clone(DEFAULT_TRANSPORT.get_or_init(build_default_transport))
}

fn build_default_transport() -> Arc<dyn Transport> {
    match HyperTransport::new() {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            tracing::warn!(error = %e, "default HTTP transport unavailable");
            Arc::new(UnavailableTransport {
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::body::empty_body;

    fn request(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(empty_body()).unwrap()
    }

    #[tokio::test]
    async fn test_tls_only_rejects_http_before_connecting() {
        let transport = HyperTransport::with_config(TransportConfig::tls_only()).unwrap();

        let err = transport
            .execute(request("http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { ref scheme, .. } if scheme == "http"));
    }

    #[tokio::test]
    async fn test_unknown_scheme_rejected() {
        let transport = HyperTransport::new().unwrap();

        let err = transport
            .execute(request("ftp://example.com/file"))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { ref scheme, .. } if scheme == "ftp"));
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        let config = TransportConfig {
            user_agent: "bad\nagent".to_owned(),
            ..TransportConfig::default()
        };
        assert!(matches!(
            HyperTransport::with_config(config),
            Err(HttpError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_default_transport_is_shared() {
        let first = default_transport();
        let second = default_transport();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_unavailable_transport_reports_tls_error() {
        let transport = UnavailableTransport {
            reason: "no crypto provider".to_owned(),
        };
        let err = transport.execute(request("https://a.io/")).await.unwrap_err();
        assert!(matches!(err, HttpError::Tls(_)));
    }
}
