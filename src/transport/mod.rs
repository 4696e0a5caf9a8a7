// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Default transport over `reqwest`.
//!
//! The request body is streamed from its cold producer and the response is
//! handed out as soon as its headers arrive. Newline-delimited `Flux` bodies
//! are decoded while the chunks come in; everything else is decoded once the
//! whole body has been read. Dropping the response or its body stream drops
//! the underlying connection.


use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt, TryStreamExt, stream};
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::timeout;

use crate::core::codec;
use crate::core::{
    BodyStream, BoxResponse, FeignError, ReactiveHttpClient, ReactiveHttpRequest,
    ReactiveHttpResponse, ResultKind, error_body,
};
use crate::trace_fmt;

/// Executes requests with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    kind: ResultKind,
    timeout: Option<Duration>,
}

impl ReqwestHttpClient {
    pub fn new(client: reqwest::Client, kind: ResultKind) -> Self {
        Self {
            client,
            kind,
            timeout: None,
        }
    }

    /// Fail with [`FeignError::Timeout`] when the response headers take
    /// longer than `timeout` to arrive.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the underlying client from connection settings.
    pub fn client_builder(
        connect_timeout: Option<Duration>,
        follow_redirects: bool,
    ) -> Result<reqwest::Client, FeignError> {
        let mut builder = reqwest::Client::builder();
        if let Some(connect_timeout) = connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if !follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }
        builder
            .build()
            .map_err(|e| FeignError::Configuration(format!("failed to build http client: {e}")))
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }
}

#[async_trait]
impl ReactiveHttpClient for ReqwestHttpClient {
    async fn execute_request(
        &self,
        request: ReactiveHttpRequest,
    ) -> Result<BoxResponse, FeignError> {
        let mut builder = self
            .client
            .request(request.method().into(), request.uri().clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(reqwest::Body::wrap_stream(body.subscribe()));
        }

        trace_fmt!("Transport", "{} {}", request.method(), request.uri());
        let response = match self.timeout {
            Some(limit) => timeout(limit, builder.send())
                .await
                .map_err(|_| FeignError::Timeout(limit))??,
            None => builder.send().await?,
        };

        Ok(Box::new(ReqwestResponse {
            response,
            kind: self.kind,
        }))
    }
}

/// A live response whose body has not been read yet.
struct ReqwestResponse {
    response: reqwest::Response,
    kind: ResultKind,
}

impl ReactiveHttpResponse for ReqwestResponse {
    fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    fn body(self: Box<Self>) -> BodyStream {
        let kind = self.kind;
        let content_type = codec::content_type(self.response.headers());

        if kind == ResultKind::Flux && codec::is_streaming(content_type.as_deref()) {
            let chunks = self
                .response
                .bytes_stream()
                .map_err(FeignError::from)
                .boxed();
            return codec::decode_lines(chunks);
        }

        let response = self.response;
        stream::once(async move {
            let data = response.bytes().await?;
            codec::decode_body(kind, content_type.as_deref(), &data)
        })
        .map(|decoded| match decoded {
            Ok(elements) => stream::iter(elements.into_iter().map(Ok)).boxed(),
            Err(e) => error_body(e),
        })
        .flatten()
        .boxed()
    }

    fn body_data(self: Box<Self>) -> BoxFuture<'static, Result<Bytes, FeignError>> {
        let response = self.response;
        async move { Ok(response.bytes().await?) }.boxed()
    }
}
