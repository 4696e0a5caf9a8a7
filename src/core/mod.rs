// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core primitives – requests, responses and the client contract.
//!
//! Everything that physically moves through the client pipeline is defined
//! in this module. No behaviour lives here; decorators sit in their own
//! modules (`interceptor`, `status`, `retry`, `logger`, `mapper`) and the
//! network lives in `transport`.

pub mod codec;
pub mod error;


pub use error::{FeignError, TransportErrorKind};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use futures_util::stream::{self, BoxStream, Stream};
use futures_util::{FutureExt, StreamExt};
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Stream of decoded body elements.
pub type BodyStream = BoxStream<'static, Result<Value, FeignError>>;

/// Stream of raw request body chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, FeignError>>;

/// A response travelling through the pipeline.
pub type BoxResponse = Box<dyn ReactiveHttpResponse>;

/// HTTP methods supported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
    Connect,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Delete => write!(f, "DELETE"),
            HttpMethod::Head => write!(f, "HEAD"),
            HttpMethod::Options => write!(f, "OPTIONS"),
            HttpMethod::Patch => write!(f, "PATCH"),
            HttpMethod::Trace => write!(f, "TRACE"),
            HttpMethod::Connect => write!(f, "CONNECT"),
        }
    }
}

impl FromStr for HttpMethod {
    type Err = FeignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            "PATCH" => Ok(HttpMethod::Patch),
            "TRACE" => Ok(HttpMethod::Trace),
            "CONNECT" => Ok(HttpMethod::Connect),
            other => Err(FeignError::InvalidRequest(format!(
                "unsupported HTTP method '{other}'"
            ))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Trace => reqwest::Method::TRACE,
            HttpMethod::Connect => reqwest::Method::CONNECT,
        }
    }
}

/// Whether a method resolves to at most one value or to a stream of values.
///
/// Fixed once per method when the client is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Zero or one element
    Mono,
    /// Zero or more elements
    Flux,
}

/// Call-invariant identification of a client method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMetadata {
    /// Tag used in logs and status errors, e.g. `OrdersApi#get(u64)`
    pub method_key: String,
    /// Declared return arity
    pub kind: ResultKind,
}

impl MethodMetadata {
    pub fn new(method_key: impl Into<String>, kind: ResultKind) -> Self {
        Self {
            method_key: method_key.into(),
            kind,
        }
    }

    pub fn mono(method_key: impl Into<String>) -> Self {
        Self::new(method_key, ResultKind::Mono)
    }

    pub fn flux(method_key: impl Into<String>) -> Self {
        Self::new(method_key, ResultKind::Flux)
    }
}

type BodyFactory = dyn Fn() -> ByteStream + Send + Sync;

/// A cold request body.
///
/// Every call to [`RequestBody::subscribe`] produces a fresh stream, so a
/// retried attempt sends the same content again.
#[derive(Clone)]
pub struct RequestBody {
    factory: Arc<BodyFactory>,
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBody").finish_non_exhaustive()
    }
}

impl RequestBody {
    /// Build a body from a stream factory.
    pub fn from_fn<F, S>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Bytes, FeignError>> + Send + 'static,
    {
        Self {
            factory: Arc::new(move || factory().boxed()),
        }
    }

    /// A body made of one fixed chunk.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::from_fn(move || stream::once(future::ready(Ok(bytes.clone()))))
    }

    /// A body holding the JSON encoding of `value`.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, FeignError> {
        let encoded = serde_json::to_vec(value)
            .map_err(|e| FeignError::InvalidRequest(format!("failed to encode body: {e}")))?;
        Ok(Self::from_bytes(encoded))
    }

    /// A newline-delimited JSON body, one chunk per element.
    pub fn ndjson(elements: Vec<Value>) -> Result<Self, FeignError> {
        let chunks = elements
            .iter()
            .map(|element| {
                let mut line = serde_json::to_vec(element).map_err(|e| {
                    FeignError::InvalidRequest(format!("failed to encode body element: {e}"))
                })?;
                line.push(b'\n');
                Ok(Bytes::from(line))
            })
            .collect::<Result<Vec<_>, FeignError>>()?;
        let chunks = Arc::new(chunks);
        Ok(Self::from_fn(move || {
            stream::iter(chunks.as_ref().clone().into_iter().map(Ok))
        }))
    }

    /// Start a new subscription to the body.
    pub fn subscribe(&self) -> ByteStream {
        (self.factory)()
    }

    /// Return a body that calls `hook` with the first chunk of every
    /// subscription, without consuming anything itself.
    pub fn tap_first<F>(&self, hook: F) -> Self
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        let inner = self.factory.clone();
        let hook = Arc::new(hook);
        Self {
            factory: Arc::new(move || {
                let hook = hook.clone();
                let mut seen = false;
                inner()
                    .inspect(move |item| {
                        if seen {
                            return;
                        }
                        if let Ok(chunk) = item {
                            seen = true;
                            hook(chunk);
                        }
                    })
                    .boxed()
            }),
        }
    }
}

/// An immutable outgoing request.
///
/// All modifications are functional updates that return a new value.
#[derive(Debug, Clone)]
pub struct ReactiveHttpRequest {
    method: HttpMethod,
    uri: Url,
    headers: HeaderMap,
    body: Option<RequestBody>,
}

impl ReactiveHttpRequest {
    pub fn new(method: HttpMethod, uri: Url) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Create a request from an absolute URI string.
    pub fn parse(method: HttpMethod, uri: &str) -> Result<Self, FeignError> {
        let uri = Url::parse(uri)
            .map_err(|e| FeignError::InvalidRequest(format!("invalid uri '{uri}': {e}")))?;
        Ok(Self::new(method, uri))
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Append a header value, keeping any existing values for the name.
    pub fn with_header(self, name: &str, value: &str) -> Result<Self, FeignError> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        Ok(self.with_header_value(name, value))
    }

    /// Append an already validated header value.
    pub fn with_header_value(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replace the whole header map.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_uri(mut self, uri: Url) -> Self {
        self.uri = uri;
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn without_body(mut self) -> Self {
        self.body = None;
        self
    }
}

/// A response produced by a transport or by a decorator wrapping one.
///
/// The body is consumed together with the response, so it can be read at
/// most once. Decorators wrap an inner response and override only the parts
/// they change.
pub trait ReactiveHttpResponse: Send {
    /// HTTP status code.
    fn status(&self) -> u16;

    /// Response headers.
    fn headers(&self) -> &HeaderMap;

    /// Decoded body elements.
    fn body(self: Box<Self>) -> BodyStream;

    /// Raw body bytes, used for error decoding.
    fn body_data(self: Box<Self>) -> BoxFuture<'static, Result<Bytes, FeignError>>;
}

impl fmt::Debug for dyn ReactiveHttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveHttpResponse")
            .field("status", &self.status())
            .field("headers", self.headers())
            .finish_non_exhaustive()
    }
}

/// A response whose body is already fully in memory.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    status: u16,
    headers: HeaderMap,
    data: Bytes,
    kind: ResultKind,
}

impl BufferedResponse {
    pub fn new(status: u16, kind: ResultKind) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            data: Bytes::new(),
            kind,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Append a header, ignoring names or values that are not valid.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Use the JSON encoding of `value` as the body.
    pub fn with_json(self, value: &Value) -> Self {
        let encoded = serde_json::to_vec(value).unwrap_or_default();
        self.with_header("content-type", "application/json")
            .with_data(encoded)
    }

    pub fn into_boxed(self) -> BoxResponse {
        Box::new(self)
    }
}

impl ReactiveHttpResponse for BufferedResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn body(self: Box<Self>) -> BodyStream {
        let content_type = codec::content_type(&self.headers);
        match codec::decode_body(self.kind, content_type.as_deref(), &self.data) {
            Ok(elements) => stream::iter(elements.into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        }
    }

    fn body_data(self: Box<Self>) -> BoxFuture<'static, Result<Bytes, FeignError>> {
        future::ready(Ok(self.data)).boxed()
    }
}

/// A body that completes without emitting anything.
pub fn empty_body() -> BodyStream {
    stream::empty().boxed()
}

/// A body that fails with `error` as soon as it is read.
pub fn error_body(error: FeignError) -> BodyStream {
    stream::once(future::ready(Err(error))).boxed()
}

/// A client that executes a request and produces a response.
///
/// Transports implement this directly; every decorator implements it by
/// wrapping another client.
#[async_trait]
pub trait ReactiveHttpClient: fmt::Debug + Send + Sync {
    /// Execute one request.
    async fn execute_request(
        &self,
        request: ReactiveHttpRequest,
    ) -> Result<BoxResponse, FeignError>;
}

#[async_trait]
impl<C: ReactiveHttpClient + ?Sized> ReactiveHttpClient for Arc<C> {
    async fn execute_request(
        &self,
        request: ReactiveHttpRequest,
    ) -> Result<BoxResponse, FeignError> {
        (**self).execute_request(request).await
    }
}
