use crate::error::{BoxError, EncodeError};
use crate::finite::ensure_finite;
use crate::query;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Type alias for the boxed request body handed to a [`Transport`].
///
/// [`Transport`]: crate::Transport
pub type RequestBody = BoxBody<Bytes, BoxError>;

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";
pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Source of request bodies attached to a [`RequestBuilder`].
///
/// Structured payloads are encoded when the provider is created, so a
/// provider captures the payload as it was at that moment and can be shared
/// between a base builder and the children derived from it.
///
/// ```
/// use modkit_sling::BodyProvider;
///
/// let provider = BodyProvider::json(&serde_json::json!({ "title": "new issue" }));
/// assert_eq!(provider.content_type(), Some("application/json"));
/// ```
///
/// [`RequestBuilder`]: crate::RequestBuilder
#[derive(Debug, Clone)]
pub struct BodyProvider {
    kind: BodyKind,
}

#[derive(Debug, Clone)]
enum BodyKind {
    /// Encoded JSON document, or the reason it could not be encoded
    Json(Result<Bytes, EncodeError>),
    /// Encoded form, or the reason it could not be encoded
    Form(Result<Bytes, EncodeError>),
    /// Raw bytes, replayed on every request
    Bytes(Bytes),
    /// Raw body stream, handed to the first request built from it
    Stream(Arc<Mutex<Option<RequestBody>>>),
}

impl BodyProvider {
    /// JSON-encode `payload` with `serde_json`.
    ///
    /// NaN and infinite floats anywhere in the payload make the provider fail
    /// with [`EncodeError::NonFiniteFloat`] instead of being written as `null`.
    pub fn json<T: Serialize + ?Sized>(payload: &T) -> Self {
        let encoded = ensure_finite(payload)
            .and_then(|()| serde_json::to_vec(payload).map_err(EncodeError::from))
            .map(Bytes::from);
        Self {
            kind: BodyKind::Json(encoded),
        }
    }

    /// Form-urlencode `payload`.
    ///
    /// Accepts the same structs and maps as query structs, see
    /// [`query::flatten`](crate::query::flatten). Fields are written sorted by
    /// key.
    pub fn form<T: Serialize + ?Sized>(payload: &T) -> Self {
        let encoded = query::flatten(payload).and_then(|mut pairs| {
            query::sort_pairs(&mut pairs);
            serde_urlencoded::to_string(&pairs)
                .map(Bytes::from)
                .map_err(|e| EncodeError::Form(Arc::new(e)))
        });
        Self {
            kind: BodyKind::Form(encoded),
        }
    }

    /// Raw bytes sent as-is on every request. No content type is implied.
    pub fn bytes(body: impl Into<Bytes>) -> Self {
        Self {
            kind: BodyKind::Bytes(body.into()),
        }
    }

    /// Raw body stream sent as-is. No content type is implied.
    ///
    /// A stream can only be sent once: the first request built from this
    /// provider (or any clone of it) takes the stream, later builds fail with
    /// [`EncodeError::StreamConsumed`].
    pub fn stream<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let body: RequestBody = body.map_err(Into::into).boxed();
        Self {
            kind: BodyKind::Stream(Arc::new(Mutex::new(Some(body)))),
        }
    }

    /// Media type this provider writes, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&'static str> {
        match self.kind {
            BodyKind::Json(_) => Some(JSON_CONTENT_TYPE),
            BodyKind::Form(_) => Some(FORM_CONTENT_TYPE),
            BodyKind::Bytes(_) | BodyKind::Stream(_) => None,
        }
    }

    /// Produce the body for one request.
    ///
    /// # Errors
    /// Returns the error captured while encoding the payload, or
    /// [`EncodeError::StreamConsumed`] when a stream was already taken.
    pub fn body(&self) -> Result<RequestBody, EncodeError> {
        match &self.kind {
            BodyKind::Json(encoded) | BodyKind::Form(encoded) => encoded.clone().map(full_body),
            BodyKind::Bytes(bytes) => Ok(full_body(bytes.clone())),
            BodyKind::Stream(slot) => slot.lock().take().ok_or(EncodeError::StreamConsumed),
        }
    }
}

pub(crate) fn full_body(bytes: Bytes) -> RequestBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

pub(crate) fn empty_body() -> RequestBody {
    Empty::new().map_err(|never| match never {}).boxed()
}
