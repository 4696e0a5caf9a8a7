// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Status handling.
//!
//! A status handler pairs a status predicate with a decoder. When the
//! predicate matches, the response is replaced by a [`FaultedResponse`]:
//! status and headers stay readable, but reading the body (either facet)
//! resolves to an error decoded from the original response. Decoding runs at
//! most once and only when somebody actually reads the body.


use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::{BoxFuture, Shared};
use futures_util::{FutureExt, StreamExt, stream};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::core::{
    BodyStream, BoxResponse, FeignError, ReactiveHttpClient, ReactiveHttpRequest,
    ReactiveHttpResponse,
};
use crate::debug_fmt;

/// Decides whether a status is an error and how to decode it.
pub trait ReactiveStatusHandler: Send + Sync {
    /// Whether responses with this status should be turned into errors.
    fn should_handle(&self, status: u16) -> bool;

    /// Decode the error carried by `response`.
    fn decode(&self, method_key: &str, response: BoxResponse) -> BoxFuture<'static, FeignError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "status_handler"
    }
}

/// Builds an error from the parts of an error response.
pub type StatusDecoder = Arc<dyn Fn(&str, u16, &HeaderMap, Bytes) -> FeignError + Send + Sync>;

type StatusPredicate = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// A predicate plus a decoder that works on the error body bytes.
#[derive(Clone)]
pub struct StatusHandler {
    name: String,
    predicate: StatusPredicate,
    decoder: StatusDecoder,
}

impl fmt::Debug for StatusHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusHandler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl StatusHandler {
    pub fn new<P, D>(predicate: P, decoder: D) -> Self
    where
        P: Fn(u16) -> bool + Send + Sync + 'static,
        D: Fn(&str, u16, &HeaderMap, Bytes) -> FeignError + Send + Sync + 'static,
    {
        Self {
            name: "status_handler".to_string(),
            predicate: Arc::new(predicate),
            decoder: Arc::new(decoder),
        }
    }

    /// Handles `400..=499`.
    pub fn client_errors<D>(decoder: D) -> Self
    where
        D: Fn(&str, u16, &HeaderMap, Bytes) -> FeignError + Send + Sync + 'static,
    {
        Self::new(|status| (400..500).contains(&status), decoder).named("client_errors")
    }

    /// Handles `500..=599`.
    pub fn server_errors<D>(decoder: D) -> Self
    where
        D: Fn(&str, u16, &HeaderMap, Bytes) -> FeignError + Send + Sync + 'static,
    {
        Self::new(|status| (500..600).contains(&status), decoder).named("server_errors")
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl ReactiveStatusHandler for StatusHandler {
    fn should_handle(&self, status: u16) -> bool {
        (self.predicate)(status)
    }

    fn decode(&self, method_key: &str, response: BoxResponse) -> BoxFuture<'static, FeignError> {
        let decoder = self.decoder.clone();
        let method_key = method_key.to_string();
        let status = response.status();
        let headers = response.headers().clone();
        async move {
            match response.body_data().await {
                Ok(body) => decoder(&method_key, status, &headers, body),
                Err(e) => e,
            }
        }
        .boxed()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handles every status `>= 400` with [`status_error`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStatusHandler;

impl ReactiveStatusHandler for DefaultStatusHandler {
    fn should_handle(&self, status: u16) -> bool {
        status >= 400
    }

    fn decode(&self, method_key: &str, response: BoxResponse) -> BoxFuture<'static, FeignError> {
        let method_key = method_key.to_string();
        let status = response.status();
        let headers = response.headers().clone();
        async move {
            match response.body_data().await {
                Ok(body) => status_error(&method_key, status, &headers, body),
                Err(e) => e,
            }
        }
        .boxed()
    }

    fn name(&self) -> &str {
        "default"
    }
}

/// The standard error for an unsuccessful status.
///
/// `Retry-After` (delta-seconds or an HTTP date) is kept for `429` and `503`.
pub fn status_error(method_key: &str, status: u16, headers: &HeaderMap, body: Bytes) -> FeignError {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string();
    let retry_after = if status == 429 || status == 503 {
        parse_retry_after(headers, SystemTime::now())
    } else {
        None
    };
    FeignError::Status {
        method_key: method_key.to_string(),
        status,
        reason,
        body: (!body.is_empty()).then_some(body),
        retry_after,
    }
}

/// Delay requested by `Retry-After`; a date in the past means no delay.
pub(crate) fn parse_retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(raw).ok()?;
    Some(date.duration_since(now).unwrap_or(Duration::ZERO))
}

/// An ordered list of handlers; the first one whose predicate matches wins.
#[derive(Clone, Default)]
pub struct CompositeStatusHandler {
    handlers: Vec<Arc<dyn ReactiveStatusHandler>>,
}

impl fmt::Debug for CompositeStatusHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.name()))
            .finish()
    }
}

impl CompositeStatusHandler {
    pub fn new(handlers: Vec<Arc<dyn ReactiveStatusHandler>>) -> Self {
        Self { handlers }
    }

    pub fn push(&mut self, handler: Arc<dyn ReactiveStatusHandler>) {
        self.handlers.push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn select(&self, status: u16) -> Option<&Arc<dyn ReactiveStatusHandler>> {
        self.handlers.iter().find(|h| h.should_handle(status))
    }
}

impl ReactiveStatusHandler for CompositeStatusHandler {
    fn should_handle(&self, status: u16) -> bool {
        self.select(status).is_some()
    }

    fn decode(&self, method_key: &str, response: BoxResponse) -> BoxFuture<'static, FeignError> {
        match self.select(response.status()) {
            Some(handler) => handler.decode(method_key, response),
            None => {
                let err = FeignError::Other(format!(
                    "no status handler for status {}",
                    response.status()
                ));
                async move { err }.boxed()
            }
        }
    }

    fn name(&self) -> &str {
        "composite"
    }
}

/// A response whose body has been replaced by a deferred error.
pub struct FaultedResponse {
    status: u16,
    headers: HeaderMap,
    error: Shared<BoxFuture<'static, FeignError>>,
}

impl FaultedResponse {
    /// Fault `response` with the error `handler` decodes from it. Nothing is
    /// decoded until the error is first awaited.
    pub fn new(
        handler: Arc<dyn ReactiveStatusHandler>,
        method_key: Arc<str>,
        response: BoxResponse,
    ) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let error = async move { handler.decode(&method_key, response).await }
            .boxed()
            .shared();
        Self {
            status,
            headers,
            error,
        }
    }

    /// The deferred error. Every call resolves to the same value.
    pub fn error(&self) -> Shared<BoxFuture<'static, FeignError>> {
        self.error.clone()
    }
}

impl ReactiveHttpResponse for FaultedResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn body(self: Box<Self>) -> BodyStream {
        stream::once(self.error.map(Err)).boxed()
    }

    fn body_data(self: Box<Self>) -> BoxFuture<'static, Result<Bytes, FeignError>> {
        self.error.map(Err).boxed()
    }
}

/// Applies a status handler to every response of the wrapped client.
pub struct StatusHandlerReactiveHttpClient {
    inner: Arc<dyn ReactiveHttpClient>,
    handler: Arc<dyn ReactiveStatusHandler>,
    method_key: Arc<str>,
}

impl fmt::Debug for StatusHandlerReactiveHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusHandlerReactiveHttpClient")
            .field("handler", &self.handler.name())
            .field("method_key", &self.method_key)
            .field("inner", &self.inner)
            .finish()
    }
}

impl StatusHandlerReactiveHttpClient {
    pub fn new(
        inner: Arc<dyn ReactiveHttpClient>,
        handler: Arc<dyn ReactiveStatusHandler>,
        method_key: &str,
    ) -> Self {
        Self {
            inner,
            handler,
            method_key: Arc::from(method_key),
        }
    }

    /// Fault `response` if the handler claims its status, otherwise return
    /// it untouched.
    pub fn handle(&self, response: BoxResponse) -> BoxResponse {
        let status = response.status();
        if !self.handler.should_handle(status) {
            return response;
        }

        debug_fmt!(
            "StatusHandler",
            "{} -> {} handled by '{}'",
            self.method_key,
            status,
            self.handler.name()
        );
        Box::new(FaultedResponse::new(
            self.handler.clone(),
            self.method_key.clone(),
            response,
        ))
    }
}

#[async_trait]
impl ReactiveHttpClient for StatusHandlerReactiveHttpClient {
    async fn execute_request(
        &self,
        request: ReactiveHttpRequest,
    ) -> Result<BoxResponse, FeignError> {
        let response = self.inner.execute_request(request).await?;
        Ok(self.handle(response))
    }
}
