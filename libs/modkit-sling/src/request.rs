use crate::body::{BodyProvider, empty_body};
use crate::decode::ResponseDecoder;
use crate::error::{EncodeError, HttpError, InvalidHeader};
use crate::executor;
use crate::query::{self, QueryEncoding};
use crate::response::{HttpResponse, ResponseHead};
use crate::transport::{Request, Transport, default_transport};
use crate::uri;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// Flattened query struct, or the reason it could not be flattened
type QueryPairs = Result<Vec<(String, String)>, EncodeError>;

/// Fluent HTTP request builder for REST API clients
///
/// A builder accumulates the method, URL, headers, query structs and body of
/// a request. [`request()`](RequestBuilder::request) turns it into an
/// `http::Request`; [`receive()`](RequestBuilder::receive) also sends it and
/// decodes the response body into a success or failure target.
///
/// Setters take `self` and return it, so a chain configures one builder in
/// place. To reuse configuration, keep a base builder and
/// [`derive()`](RequestBuilder::derive) a child per request; children copy
/// the headers and query structs, so changes to a child never reach the base
/// or its siblings.
///
/// # URL Construction
///
/// [`base()`](RequestBuilder::base) sets the URL verbatim and
/// [`path()`](RequestBuilder::path) resolves a reference against it the way
/// a browser resolves a link: `"foo/"` appends to a base ending in `/`, `"/foo"`
/// replaces the whole path, and an absolute URL replaces everything. A base
/// meant to be extended should end with a slash.
///
/// # Example
///
/// ```ignore
/// use modkit_sling::RequestBuilder;
///
/// let github = RequestBuilder::new()
///     .base("https://api.github.com/")
///     .set_header("accept", "application/vnd.github+json");
///
/// let mut issues: Vec<Issue> = Vec::new();
/// let mut error = GithubError::default();
/// let head = github
///     .derive()
///     .get("repos/rust-lang/rust/issues")
///     .query_struct(Some(&IssueListParams { state: "open".into() }))
///     .receive(Some(&mut issues), Some(&mut error))
///     .await?;
///
/// if !head.is_success() {
///     eprintln!("github said: {}", error.message);
/// }
/// ```
#[must_use = "RequestBuilder does nothing until .request() or .receive() is called"]
pub struct RequestBuilder {
    transport: Arc<dyn Transport>,
    method: Option<Method>,
    raw_url: String,
    headers: HeaderMap,
    query_structs: Vec<QueryPairs>,
    query_encoding: QueryEncoding,
    body: Option<BodyProvider>,
    decoder: ResponseDecoder,
    /// First rejected header (deferred to `request()`)
    invalid_header: Option<InvalidHeader>,
}

impl RequestBuilder {
    /// Empty builder using the process-wide [`default_transport`].
    pub fn new() -> Self {
        Self::with_transport(default_transport())
    }

    /// Empty builder sending through `transport`.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            method: None,
            raw_url: String::new(),
            headers: HeaderMap::new(),
            query_structs: Vec::new(),
            query_encoding: QueryEncoding::default(),
            body: None,
            decoder: ResponseDecoder::default(),
            invalid_header: None,
        }
    }

    /// Child builder carrying a snapshot of this builder's configuration.
    ///
    /// The child shares the transport and the body provider, and owns copies
    /// of the headers and query structs.
    pub fn derive(&self) -> Self {
        tracing::trace!(url = %self.raw_url, "deriving request builder");
        Self {
            transport: Arc::clone(&self.transport),
            method: self.method.clone(),
            raw_url: self.raw_url.clone(),
            headers: self.headers.clone(),
            query_structs: self.query_structs.clone(),
            query_encoding: self.query_encoding,
            body: self.body.clone(),
            decoder: self.decoder,
            invalid_header: self.invalid_header.clone(),
        }
    }

    /// Set the transport used to send requests. `None` selects the
    /// [`default_transport`].
    pub fn transport(mut self, transport: Option<Arc<dyn Transport>>) -> Self {
        self.transport = transport.unwrap_or_else(default_transport);
        self
    }

    // Method

    /// Set the method to HEAD and resolve `path` against the URL.
    pub fn head(self, path: &str) -> Self {
        self.method_and_path(Method::HEAD, path)
    }

    /// Set the method to GET and resolve `path` against the URL.
    pub fn get(self, path: &str) -> Self {
        self.method_and_path(Method::GET, path)
    }

    /// Set the method to POST and resolve `path` against the URL.
    pub fn post(self, path: &str) -> Self {
        self.method_and_path(Method::POST, path)
    }

    /// Set the method to PUT and resolve `path` against the URL.
    pub fn put(self, path: &str) -> Self {
        self.method_and_path(Method::PUT, path)
    }

    /// Set the method to PATCH and resolve `path` against the URL.
    pub fn patch(self, path: &str) -> Self {
        self.method_and_path(Method::PATCH, path)
    }

    /// Set the method to DELETE and resolve `path` against the URL.
    pub fn delete(self, path: &str) -> Self {
        self.method_and_path(Method::DELETE, path)
    }

    fn method_and_path(mut self, method: Method, path: &str) -> Self {
        self.method = Some(method);
        self.path(path)
    }

    // Headers

    /// Append a header value, keeping existing values for the same name.
    ///
    /// Names are case-insensitive. An invalid name or value is reported by
    /// [`request()`](Self::request).
    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        match parse_header(name, value) {
            Ok((name, value)) => {
                self.headers.append(name, value);
            }
            Err(e) => self.reject_header(e),
        }
        self
    }

    /// Set a header value, replacing all existing values for the same name.
    ///
    /// Names are case-insensitive. An invalid name or value is reported by
    /// [`request()`](Self::request).
    pub fn set_header(mut self, name: &str, value: &str) -> Self {
        match parse_header(name, value) {
            Ok((name, value)) => {
                self.headers.insert(name, value);
            }
            Err(e) => self.reject_header(e),
        }
        self
    }

    fn reject_header(&mut self, err: InvalidHeader) {
        self.invalid_header.get_or_insert(err);
    }

    // URL

    /// Set the URL verbatim. It is validated when the request is built.
    pub fn base(mut self, url: impl Into<String>) -> Self {
        self.raw_url = url.into();
        self
    }

    /// Resolve `path` against the current URL.
    ///
    /// An absolute URL replaces the current one. A relative current URL
    /// resolves the same way, so `"foo"` on an empty builder gives `"foo"`.
    /// If either is not a valid URI reference, the URL is left unchanged.
    pub fn path(mut self, path: &str) -> Self {
        match uri::resolve(&self.raw_url, path) {
            Some(resolved) => self.raw_url = resolved,
            None => tracing::debug!(
                base = %self.raw_url,
                path,
                "cannot resolve path against base URL; leaving URL unchanged"
            ),
        }
        self
    }

    /// Add a struct or map whose fields become query parameters.
    ///
    /// Parameters from all query structs are merged with any query string
    /// already on the URL; see [`query`](crate::query) for the encoding
    /// rules. `None` leaves the builder unchanged.
    pub fn query_struct<T: Serialize + ?Sized>(mut self, params: Option<&T>) -> Self {
        if let Some(params) = params {
            self.query_structs.push(query::flatten(params));
        }
        self
    }

    /// Select how merged query parameters are written (default:
    /// [`QueryEncoding::UrlEncoded`]).
    pub fn query_encoding(mut self, encoding: QueryEncoding) -> Self {
        self.query_encoding = encoding;
        self
    }

    // Body

    /// Send `payload` as a JSON body and set `Content-Type: application/json`.
    ///
    /// The payload is encoded immediately; encoding errors are reported by
    /// [`request()`](Self::request). `None` leaves the builder unchanged.
    pub fn json_body<T: Serialize + ?Sized>(self, payload: Option<&T>) -> Self {
        self.body_provider(payload.map(BodyProvider::json))
    }

    /// Send `payload` as an urlencoded form and set
    /// `Content-Type: application/x-www-form-urlencoded`.
    ///
    /// `None` leaves the builder unchanged.
    pub fn form_body<T: Serialize + ?Sized>(self, payload: Option<&T>) -> Self {
        self.body_provider(payload.map(BodyProvider::form))
    }

    /// Replace the body provider.
    ///
    /// A provider with a content type sets `Content-Type`. A provider without
    /// one clears a `Content-Type` that the previous provider set, leaving a
    /// caller-set value alone. `None` leaves the builder unchanged.
    pub fn body_provider(mut self, provider: Option<BodyProvider>) -> Self {
        let Some(provider) = provider else {
            return self;
        };

        if let Some(content_type) = provider.content_type() {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        } else if let Some(previous) = self.body.as_ref().and_then(BodyProvider::content_type)
            && self
                .headers
                .get(CONTENT_TYPE)
                .is_some_and(|current| current == previous)
        {
            self.headers.remove(CONTENT_TYPE);
        }

        self.body = Some(provider);
        self
    }

    /// Select how response bodies are decoded (default: JSON).
    pub fn response_decoder(mut self, decoder: ResponseDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    // Accessors

    /// Method of the next request; `None` builds as GET.
    #[must_use]
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// The accumulated URL, before query structs are merged.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.raw_url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn decoder(&self) -> ResponseDecoder {
        self.decoder
    }

    // Requests

    /// The URL the next request targets: the accumulated URL with the query
    /// structs merged into its query string.
    ///
    /// The URL is kept as written, so `"http://a.io"` with a query struct
    /// gives `"http://a.io?count=25"`. The `http::Uri` of a built request
    /// renders an empty path as `/`, the form sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidUri` if the URL is not absolute with a host,
    /// or `HttpError::Encode` if a query struct could not be flattened.
    pub fn request_url(&self) -> Result<String, HttpError> {
        uri::validate_absolute(&self.raw_url)?;

        if self.query_structs.is_empty() {
            return Ok(self.raw_url.clone());
        }
        let mut pairs = Vec::new();
        for params in &self.query_structs {
            let params = params.as_ref().map_err(|e| HttpError::Encode(e.clone()))?;
            pairs.extend(params.iter().cloned());
        }
        Ok(query::merge_into(&self.raw_url, pairs, self.query_encoding))
    }

    /// Build an `http::Request` from the current configuration.
    ///
    /// The builder is left untouched and can build again.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` if:
    /// - a header name or value was invalid (`InvalidHeader`)
    /// - the URL is not an absolute URL with a host (`InvalidUri`)
    /// - a query struct or the body could not be encoded (`Encode`)
    pub fn request(&self) -> Result<Request, HttpError> {
        if let Some(e) = &self.invalid_header {
            return Err(e.clone().into());
        }

        let url = self.request_url()?;

        let mut request = http::Request::builder()
            .method(self.method.clone().unwrap_or(Method::GET))
            .uri(url)
            .body(())?;
        *request.headers_mut() = self.headers.clone();

        // Last step: a stream provider hands its body out only once.
        let body = match &self.body {
            Some(provider) => provider.body()?,
            None => empty_body(),
        };
        Ok(request.map(|()| body))
    }

    /// Send `request` without reading the response body.
    ///
    /// # Errors
    ///
    /// Returns the transport's error; any HTTP status is a success here.
    pub async fn send(&self, request: Request) -> Result<HttpResponse, HttpError> {
        tracing::debug!(method = %request.method(), url = %request.uri(), "sending request");
        let inner = self.transport.execute(request).await?;
        tracing::trace!(status = %inner.status(), "response received");
        Ok(HttpResponse { inner })
    }

    /// Send `request` and decode the response body.
    ///
    /// A 2xx response is decoded into `success`, any other status into
    /// `failure`. A `None` target leaves the body unread. The body is always
    /// released before this returns.
    ///
    /// # Errors
    ///
    /// Returns the transport's error, or `HttpError::Decode` (carrying the
    /// response head) if the body does not decode into the selected target.
    pub async fn exchange<S, F>(
        &self,
        request: Request,
        success: Option<&mut S>,
        failure: Option<&mut F>,
    ) -> Result<ResponseHead, HttpError>
    where
        S: DeserializeOwned,
        F: DeserializeOwned,
    {
        executor::exchange(
            self.transport.as_ref(),
            self.decoder,
            request,
            success,
            failure,
        )
        .await
    }

    /// Build the request, send it and decode the response body.
    ///
    /// Shorthand for [`request()`](Self::request) followed by
    /// [`exchange()`](Self::exchange).
    ///
    /// # Errors
    ///
    /// Any error of `request()` or `exchange()`.
    pub async fn receive<S, F>(
        &self,
        success: Option<&mut S>,
        failure: Option<&mut F>,
    ) -> Result<ResponseHead, HttpError>
    where
        S: DeserializeOwned,
        F: DeserializeOwned,
    {
        let request = self.request()?;
        self.exchange(request, success, failure).await
    }

    /// Like [`receive()`](Self::receive) with no failure target: non-2xx
    /// bodies are discarded.
    ///
    /// # Errors
    ///
    /// Any error of `request()` or `exchange()`.
    pub async fn receive_success<S: DeserializeOwned>(
        &self,
        success: Option<&mut S>,
    ) -> Result<ResponseHead, HttpError> {
        self.receive::<S, S>(success, None).await
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("url", &self.raw_url)
            .field("headers", &self.headers)
            .field("query_structs", &self.query_structs.len())
            .field("query_encoding", &self.query_encoding)
            .field("body", &self.body)
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), InvalidHeader> {
    let invalid = |reason: String| InvalidHeader {
        name: name.to_owned(),
        reason,
    };
    let header_name = HeaderName::try_from(name).map_err(|e| invalid(e.to_string()))?;
    let header_value = HeaderValue::try_from(value).map_err(|e| invalid(e.to_string()))?;
    Ok((header_name, header_value))
}
