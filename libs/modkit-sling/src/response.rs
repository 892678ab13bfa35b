use crate::decode::ResponseDecoder;
use crate::error::{BoxError, DecodeError, HttpError, map_boxed_error};
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode, Version};
use http_body::Frame;
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Type alias for the boxed response body handed back by a [`Transport`].
///
/// [`Transport`]: crate::Transport
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

pin_project! {
    /// Body wrapper that enforces size limits during streaming.
    ///
    /// Tracks bytes read and returns [`HttpError::BodyTooLarge`] if the limit
    /// is exceeded. [`HyperTransport`](crate::HyperTransport) wraps every
    /// response body in one, so decoders never buffer more than the configured
    /// `max_body_size`.
    pub struct LimitedBody<B> {
        #[pin]
        inner: B,
        limit: usize,
        read: usize,
    }
}

impl<B> LimitedBody<B> {
    /// Creates a new `LimitedBody` wrapping the given body with the specified limit.
    #[must_use]
    pub fn new(inner: B, limit: usize) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }

    /// Returns the number of bytes read so far.
    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.read
    }

    /// Returns the configured size limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl<B> http_body::Body for LimitedBody<B>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    *this.read += data.len();
                    if *this.read > *this.limit {
                        return Poll::Ready(Some(Err(HttpError::BodyTooLarge {
                            limit: *this.limit,
                            actual: *this.read,
                        })));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(map_boxed_error(e.into())))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}

/// Status line and headers of a received response.
///
/// Returned by [`RequestBuilder::receive`](crate::RequestBuilder::receive)
/// once the body has been decoded or discarded, and carried by
/// [`HttpError::Decode`] so callers can inspect a response whose body did not
/// decode.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
}

impl ResponseHead {
    /// Create a head with HTTP/1.1 as the protocol version.
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl From<http::response::Parts> for ResponseHead {
    fn from(parts: http::response::Parts) -> Self {
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
        }
    }
}

/// Undecoded HTTP response returned by [`RequestBuilder::send`].
///
/// Owns the body stream; dropping the response releases it. Non-2xx statuses
/// are ordinary responses here, never errors.
///
/// [`RequestBuilder::send`]: crate::RequestBuilder::send
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
}

impl HttpResponse {
    /// Get the response status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Get the response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Consume the wrapper and return the inner response with boxed body
    #[must_use]
    pub fn into_inner(self) -> Response<ResponseBody> {
        self.inner
    }

    /// Returns the response body as a stream for incremental processing.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.inner.into_body()
    }

    /// Read the whole response body, regardless of status.
    ///
    /// # Errors
    /// Returns the transport's body error (e.g. `HttpError::BodyTooLarge`).
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_body(self.inner.into_body())
            .await
            .map_err(map_boxed_error)
    }

    /// Read the body and decode it with `decoder`, regardless of status.
    ///
    /// # Errors
    /// Returns `HttpError::Decode` carrying the response head when the body
    /// cannot be read or does not decode into `T`.
    pub async fn decode<T: DeserializeOwned>(
        self,
        decoder: ResponseDecoder,
    ) -> Result<T, HttpError> {
        let (parts, body) = self.inner.into_parts();
        match decode_body(decoder, body).await {
            Ok(value) => Ok(value),
            Err(source) => Err(HttpError::Decode {
                head: Box::new(ResponseHead::from(parts)),
                source,
            }),
        }
    }

    /// Read the body as JSON, regardless of status.
    ///
    /// # Errors
    /// Same as [`decode`](Self::decode).
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        self.decode(ResponseDecoder::Json).await
    }
}

/// Collect a response body into contiguous bytes.
pub(crate) async fn read_body(body: ResponseBody) -> Result<Bytes, BoxError> {
    Ok(body.collect().await?.to_bytes())
}

/// Read `body` to the end and decode it into a fresh `T`.
pub(crate) async fn decode_body<T: DeserializeOwned>(
    decoder: ResponseDecoder,
    body: ResponseBody,
) -> Result<T, DecodeError> {
    let bytes = read_body(body).await.map_err(DecodeError::Read)?;
    decoder.decode(&bytes)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn boxed(body: &'static str) -> ResponseBody {
        Full::new(Bytes::from_static(body.as_bytes()))
            .map_err(|never| match never {})
            .boxed()
    }

    #[tokio::test]
    async fn test_limited_body_within_limit() {
        let body = LimitedBody::new(boxed("hello"), 5);
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"hello");
    }

    #[tokio::test]
    async fn test_limited_body_over_limit() {
        let body = LimitedBody::new(boxed("hello world"), 5);
        let err = body.collect().await.unwrap_err();
        assert!(matches!(
            err,
            HttpError::BodyTooLarge {
                limit: 5,
                actual: 11
            }
        ));
    }

    #[tokio::test]
    async fn test_bytes_recovers_body_too_large() {
        let limited = LimitedBody::new(boxed("0123456789"), 3)
            .map_err(BoxError::from)
            .boxed();
        let response = HttpResponse {
            inner: Response::new(limited),
        };

        let result = response.bytes().await;
        assert!(matches!(result, Err(HttpError::BodyTooLarge { limit: 3, .. })));
    }

    #[tokio::test]
    async fn test_decode_failure_keeps_status_and_headers() {
        let inner = Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .header("x-request-id", "abc")
            .body(boxed("<html>oops</html>"))
            .unwrap();
        let response = HttpResponse { inner };

        let err = response.json::<serde_json::Value>().await.unwrap_err();
        let head = err.response_head().expect("decode error should carry the head");
        assert_eq!(head.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(head.headers()["x-request-id"], "abc");
    }

    #[test]
    fn test_response_head_from_parts() {
        let (parts, ()) = Response::builder()
            .status(StatusCode::CREATED)
            .version(Version::HTTP_2)
            .body(())
            .unwrap()
            .into_parts();
        let head = ResponseHead::from(parts);
        assert_eq!(head.status(), StatusCode::CREATED);
        assert_eq!(head.version(), Version::HTTP_2);
        assert!(head.is_success());
    }
}
