//! In-memory transports for unit tests.

use crate::error::{BoxError, HttpError};
use crate::response::ResponseBody;
use crate::transport::{Request, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, Response, StatusCode};
use http_body::Frame;
use http_body_util::{BodyExt, Full};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

/// Response body that counts how many times it was dropped.
pub struct TrackedBody {
    inner: Full<Bytes>,
    drops: Arc<AtomicUsize>,
}

impl http_body::Body for TrackedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// What a [`StubTransport`] saw for one request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Transport answering every request with the same canned response.
pub struct StubTransport {
    status: StatusCode,
    body: Bytes,
    drops: Arc<AtomicUsize>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl StubTransport {
    pub fn new(status: u16, body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            status: StatusCode::from_u16(status).unwrap(),
            body: Bytes::from_static(body.as_bytes()),
            drops: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Number of response bodies released so far.
    pub fn body_drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests.lock().last().cloned().unwrap()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn execute(&self, request: Request) -> Result<Response<ResponseBody>, HttpError> {
        let (parts, body) = request.into_parts();
        let body = body.collect().await.map_err(HttpError::Transport)?.to_bytes();
        self.requests.lock().push(RecordedRequest {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body,
        });

        let tracked = TrackedBody {
            inner: Full::new(self.body.clone()),
            drops: Arc::clone(&self.drops),
        };
        let body: ResponseBody = tracked.map_err(|never| match never {}).boxed();
        Ok(Response::builder().status(self.status).body(body).unwrap())
    }
}

/// Transport whose every request fails before a response arrives.
pub struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn execute(&self, _request: Request) -> Result<Response<ResponseBody>, HttpError> {
        Err(HttpError::Transport(BoxError::from("connection refused")))
    }
}
