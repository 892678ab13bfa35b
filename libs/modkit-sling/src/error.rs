use crate::response::ResponseHead;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used for transport and body stream failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
///
/// # Example
///
/// ```ignore
/// match builder.request() {
///     Err(HttpError::InvalidUri { kind: InvalidUriKind::MissingScheme, .. }) => {
///         println!("set an absolute base URL first");
///     }
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is relative; there is no scheme to resolve it against
    MissingScheme,
    /// URL has no host component
    MissingAuthority,
}

/// A header name or value rejected when it was added to a builder.
///
/// The builder keeps the first rejected header and reports it from
/// [`RequestBuilder::request`](crate::RequestBuilder::request).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid header '{name}': {reason}")]
pub struct InvalidHeader {
    /// The header name as given by the caller
    pub name: String,
    /// Diagnostic message (unstable format, for logging only)
    pub reason: String,
}

/// Failure to turn a query struct or a body payload into bytes.
///
/// Encoding outcomes are captured when a payload is attached to a builder, so
/// this type is `Clone` and shared between a base builder and its children.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum EncodeError {
    /// A float that JSON cannot represent (NaN or infinity)
    #[error("JSON cannot represent non-finite float {0}")]
    NonFiniteFloat(f64),

    /// `serde_json` rejected the payload
    #[error("JSON encoding failed: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    /// Form URL encoding failed
    #[error("Form encoding failed: {0}")]
    Form(#[source] Arc<serde_urlencoded::ser::Error>),

    /// The payload does not map onto flat key/value pairs
    #[error("Unsupported query value: {0}")]
    Unsupported(String),

    /// A streaming body was already handed to a previous request
    #[error("Request body stream was already consumed")]
    StreamConsumed,

    /// Error raised by the payload's own `Serialize` implementation
    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for EncodeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        EncodeError::Custom(msg.to_string())
    }
}

impl From<serde_json::Error> for EncodeError {
    fn from(err: serde_json::Error) -> Self {
        EncodeError::Json(Arc::new(err))
    }
}

/// Failure to read or decode a response body into a target.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    /// The body stream failed while it was being read
    #[error("failed to read response body: {0}")]
    Read(#[source] BoxError),

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// XML parsing error
    #[error("XML parsing failed: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// The raw body does not fit the target (e.g. non UTF-8 into `String`)
    #[error("raw body does not fit target: {0}")]
    Raw(#[from] serde::de::value::Error),
}

/// HTTP request builder error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name or value
    #[error(transparent)]
    InvalidHeader(#[from] InvalidHeader),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only; do not match on its contents
    /// as the format is unstable and may change between releases.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// URL scheme not accepted by the transport
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme {
        /// The scheme that was rejected
        scheme: String,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Query struct or body encoding failed
    #[error("Encoding failed: {0}")]
    Encode(#[from] EncodeError),

    /// Request attempt timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Response body could not be decoded into the requested target.
    ///
    /// The response was received; its status and headers stay available
    /// through `head`.
    #[error("Failed to decode HTTP {} response: {source}", .head.status())]
    Decode {
        head: Box<ResponseHead>,
        #[source]
        source: DecodeError,
    },
}

impl HttpError {
    /// Response head attached to this error, if a response was received.
    #[must_use]
    pub fn response_head(&self) -> Option<&ResponseHead> {
        match self {
            HttpError::Decode { head, .. } => Some(head),
            _ => None,
        }
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

/// Recover an `HttpError` that travelled through a boxed error channel
/// (body streams), wrapping anything else as `Transport`.
pub(crate) fn map_boxed_error(err: BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_transport_error_preserves_source() {
        let err = HttpError::Transport(Box::new(TestError("connection refused")));

        let source = err.source().expect("transport error should have a source");
        let downcast = source.downcast_ref::<TestError>();
        assert_eq!(downcast.map(|e| e.0), Some("connection refused"));
    }

    #[test]
    fn test_decode_error_keeps_head() {
        let head = ResponseHead::new(http::StatusCode::BAD_GATEWAY, http::HeaderMap::new());
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = HttpError::Decode {
            head: Box::new(head),
            source: DecodeError::Json(json_err),
        };

        assert_eq!(
            err.response_head().map(ResponseHead::status),
            Some(http::StatusCode::BAD_GATEWAY)
        );
        assert!(err.to_string().starts_with("Failed to decode HTTP 502"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_map_boxed_error_recovers_http_error() {
        let boxed: BoxError = Box::new(HttpError::BodyTooLarge {
            limit: 4,
            actual: 8,
        });
        assert!(matches!(
            map_boxed_error(boxed),
            HttpError::BodyTooLarge { limit: 4, actual: 8 }
        ));

        let boxed: BoxError = Box::new(TestError("reset by peer"));
        assert!(matches!(map_boxed_error(boxed), HttpError::Transport(_)));
    }

    #[test]
    fn test_encode_error_is_cloneable_with_source() {
        let json_err = serde_json::from_str::<u32>("[").unwrap_err();
        let err = EncodeError::from(json_err);
        let copy = err.clone();
        assert!(copy.source().is_some());
        assert_eq!(err.to_string(), copy.to_string());
    }
}
