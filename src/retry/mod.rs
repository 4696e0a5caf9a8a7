// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Retry decorator.
//!
//! The retry policy is a function from the stream of errors observed during a
//! logical call to a stream of permissions. It is invoked once per call. Each
//! time an attempt fails the error is pushed to the policy and the decorator
//! waits for its answer:
//!
//! - `Ok(())` re-issues the whole wrapped pipeline (interceptors, transport,
//!   status handling) with the same request;
//! - `Err(e)` fails the call with `e`;
//! - the end of the permission stream fails the call with the last error,
//!   unchanged.
//!
//! Failures that a status handler defers to the body are detected by reading
//! the first body element before the response is handed out. For `Flux`
//! methods, an error later in the body re-subscribes the pipeline as well and
//! the stream continues with the elements of the new attempt.

mod policy;


pub use policy::{Backoff, BasicRetryPolicy};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::core::codec;
use crate::core::{
    BodyStream, BoxResponse, FeignError, MethodMetadata, ReactiveHttpClient, ReactiveHttpRequest,
    ReactiveHttpResponse, ResultKind, empty_body,
};
use crate::debug_fmt;
use crate::logger::{ReactiveLoggerListener, notify};

/// Errors observed during one logical call, in order.
pub type ErrorStream = BoxStream<'static, FeignError>;

/// Answers of a retry policy, one per observed error.
pub type PermitStream = BoxStream<'static, Result<(), FeignError>>;

/// Caller-supplied retry policy.
pub trait ReactiveRetryPolicy: Send + Sync {
    /// Map the errors of one logical call to retry permissions.
    fn retry_when(&self, errors: ErrorStream) -> PermitStream;

    /// Name used in logs.
    fn name(&self) -> &str {
        "fn"
    }
}

impl<F> ReactiveRetryPolicy for F
where
    F: Fn(ErrorStream) -> PermitStream + Send + Sync,
{
    fn retry_when(&self, errors: ErrorStream) -> PermitStream {
        self(errors)
    }
}

/// Per-call conversation with the retry policy.
struct RetrySession {
    errors: mpsc::UnboundedSender<FeignError>,
    permits: PermitStream,
    retries: usize,
    method_key: Arc<str>,
    listener: Arc<dyn ReactiveLoggerListener>,
}

impl RetrySession {
    fn start(
        policy: &dyn ReactiveRetryPolicy,
        method_key: Arc<str>,
        listener: Arc<dyn ReactiveLoggerListener>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let errors = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|error| (error, rx))
        })
        .boxed();

        Self {
            errors: tx,
            permits: policy.retry_when(errors),
            retries: 0,
            method_key,
            listener,
        }
    }

    /// Hand `error` to the policy; `Ok` means another attempt is allowed.
    async fn permit(&mut self, error: FeignError) -> Result<(), FeignError> {
        debug_fmt!(
            "Retry",
            "{} attempt {} failed: {}",
            self.method_key,
            self.retries + 1,
            error
        );
        // A policy may drop its error stream and still grant permits.
        let _ = self.errors.send(error.clone());

        match self.permits.next().await {
            Some(Ok(())) => {
                self.retries += 1;
                let listener = &self.listener;
                let method_key = &self.method_key;
                let retries = self.retries;
                notify("retry_attempt", || {
                    listener.retry_attempt(method_key, retries, &error)
                });
                Ok(())
            }
            Some(Err(declined)) => Err(declined),
            None => Err(error),
        }
    }
}

/// A response whose first body element has already been read.
struct Primed {
    status: u16,
    headers: HeaderMap,
    first: Option<Value>,
    rest: BodyStream,
}

/// Run one attempt up to its first body element.
async fn prime(
    inner: &Arc<dyn ReactiveHttpClient>,
    request: ReactiveHttpRequest,
) -> Result<Primed, FeignError> {
    let response = inner.execute_request(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let mut body = response.body();

    match body.next().await {
        Some(Ok(first)) => Ok(Primed {
            status,
            headers,
            first: Some(first),
            rest: body,
        }),
        Some(Err(e)) => Err(e),
        None => Ok(Primed {
            status,
            headers,
            first: None,
            rest: empty_body(),
        }),
    }
}

/// Attempt until one succeeds or the policy gives up.
async fn attempt(
    inner: &Arc<dyn ReactiveHttpClient>,
    request: &ReactiveHttpRequest,
    session: &mut RetrySession,
) -> Result<Primed, FeignError> {
    loop {
        match prime(inner, request.clone()).await {
            Ok(primed) => return Ok(primed),
            Err(error) => session.permit(error).await?,
        }
    }
}

/// Re-issues the wrapped pipeline according to a retry policy.
pub struct RetryReactiveHttpClient {
    inner: Arc<dyn ReactiveHttpClient>,
    policy: Arc<dyn ReactiveRetryPolicy>,
    listener: Arc<dyn ReactiveLoggerListener>,
    method_key: Arc<str>,
    kind: ResultKind,
}

impl fmt::Debug for RetryReactiveHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryReactiveHttpClient")
            .field("policy", &self.policy.name())
            .field("method_key", &self.method_key)
            .field("kind", &self.kind)
            .field("inner", &self.inner)
            .finish()
    }
}

impl RetryReactiveHttpClient {
    pub fn new(
        inner: Arc<dyn ReactiveHttpClient>,
        policy: Arc<dyn ReactiveRetryPolicy>,
        listener: Arc<dyn ReactiveLoggerListener>,
        method: &MethodMetadata,
    ) -> Self {
        Self {
            inner,
            policy,
            listener,
            method_key: Arc::from(method.method_key.as_str()),
            kind: method.kind,
        }
    }
}

#[async_trait]
impl ReactiveHttpClient for RetryReactiveHttpClient {
    async fn execute_request(
        &self,
        request: ReactiveHttpRequest,
    ) -> Result<BoxResponse, FeignError> {
        let mut session = RetrySession::start(
            self.policy.as_ref(),
            self.method_key.clone(),
            self.listener.clone(),
        );
        let primed = attempt(&self.inner, &request, &mut session).await?;

        Ok(Box::new(RetryingResponse {
            primed,
            kind: self.kind,
            inner: self.inner.clone(),
            request,
            session,
        }))
    }
}

/// The response of the successful attempt, still able to retry if a `Flux`
/// body fails part way.
struct RetryingResponse {
    primed: Primed,
    kind: ResultKind,
    inner: Arc<dyn ReactiveHttpClient>,
    request: ReactiveHttpRequest,
    session: RetrySession,
}

struct FluxState {
    pending: Option<Value>,
    rest: BodyStream,
    inner: Arc<dyn ReactiveHttpClient>,
    request: ReactiveHttpRequest,
    session: RetrySession,
}

impl ReactiveHttpResponse for RetryingResponse {
    fn status(&self) -> u16 {
        self.primed.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.primed.headers
    }

    fn body(self: Box<Self>) -> BodyStream {
        let RetryingResponse {
            primed,
            kind,
            inner,
            request,
            session,
        } = *self;

        if kind == ResultKind::Mono {
            return stream::iter(primed.first.map(Ok)).boxed();
        }

        let state = FluxState {
            pending: primed.first,
            rest: primed.rest,
            inner,
            request,
            session,
        };
        stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            if let Some(element) = state.pending.take() {
                return Some((Ok(element), Some(state)));
            }
            loop {
                match state.rest.next().await {
                    Some(Ok(element)) => return Some((Ok(element), Some(state))),
                    None => return None,
                    Some(Err(error)) => {
                        if let Err(error) = state.session.permit(error).await {
                            return Some((Err(error), None));
                        }
                        match attempt(&state.inner, &state.request, &mut state.session).await {
                            Ok(primed) => {
                                state.rest = primed.rest;
                                if let Some(element) = primed.first {
                                    return Some((Ok(element), Some(state)));
                                }
                            }
                            Err(error) => return Some((Err(error), None)),
                        }
                    }
                }
            }
        })
        .boxed()
    }

    fn body_data(self: Box<Self>) -> BoxFuture<'static, Result<Bytes, FeignError>> {
        let kind = self.kind;
        let body = self.body();
        async move {
            let elements: Vec<Value> = body.try_collect().await?;
            codec::encode_elements(kind, &elements)
        }
        .boxed()
    }
}
