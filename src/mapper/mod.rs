// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Response mappers.
//!
//! A mapper turns one response into another without calling the transport
//! again. Mappers run once per response, in the order they were added, and
//! sit outside status handling: a mapper that claims a status sees the
//! faulted response but never reads its body, so the deferred error is
//! simply discarded.


use async_trait::async_trait;
use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use reqwest::header::HeaderMap;
use std::fmt;
use std::sync::Arc;

use crate::core::{
    BodyStream, BoxResponse, FeignError, ReactiveHttpClient, ReactiveHttpRequest,
    ReactiveHttpResponse, empty_body,
};
use crate::debug_fmt;

/// Maps a response to a different logical result.
pub trait ResponseMapper: Send + Sync {
    fn map(&self, response: BoxResponse) -> BoxResponse;

    /// Name used in logs.
    fn name(&self) -> &str {
        "fn"
    }
}

impl<F> ResponseMapper for F
where
    F: Fn(BoxResponse) -> BoxResponse + Send + Sync,
{
    fn map(&self, response: BoxResponse) -> BoxResponse {
        self(response)
    }
}

/// A response with some facets replaced and the rest delegated.
pub struct RewrittenResponse {
    inner: BoxResponse,
    status: Option<u16>,
    empty_body: bool,
}

impl RewrittenResponse {
    pub fn new(inner: BoxResponse) -> Self {
        Self {
            inner,
            status: None,
            empty_body: false,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Replace the body with one that completes immediately. The wrapped
    /// body is never read.
    pub fn with_empty_body(mut self) -> Self {
        self.empty_body = true;
        self
    }
}

impl ReactiveHttpResponse for RewrittenResponse {
    fn status(&self) -> u16 {
        self.status.unwrap_or_else(|| self.inner.status())
    }

    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn body(self: Box<Self>) -> BodyStream {
        if self.empty_body {
            return empty_body();
        }
        self.inner.body()
    }

    fn body_data(self: Box<Self>) -> BoxFuture<'static, Result<Bytes, FeignError>> {
        if self.empty_body {
            return future::ready(Ok(Bytes::new())).boxed();
        }
        self.inner.body_data()
    }
}

/// Treats `404 Not Found` as a successful, empty result.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ignore404Mapper;

impl ResponseMapper for Ignore404Mapper {
    fn map(&self, response: BoxResponse) -> BoxResponse {
        if response.status() != 404 {
            return response;
        }
        Box::new(
            RewrittenResponse::new(response)
                .with_status(200)
                .with_empty_body(),
        )
    }

    fn name(&self) -> &str {
        "ignore404"
    }
}

/// Applies response mappers to every response of the wrapped client.
pub struct ResponseMappingReactiveHttpClient {
    inner: Arc<dyn ReactiveHttpClient>,
    mappers: Vec<Arc<dyn ResponseMapper>>,
}

impl fmt::Debug for ResponseMappingReactiveHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseMappingReactiveHttpClient")
            .field(
                "mappers",
                &self.mappers.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("inner", &self.inner)
            .finish()
    }
}

impl ResponseMappingReactiveHttpClient {
    pub fn new(inner: Arc<dyn ReactiveHttpClient>, mappers: Vec<Arc<dyn ResponseMapper>>) -> Self {
        Self { inner, mappers }
    }
}

#[async_trait]
impl ReactiveHttpClient for ResponseMappingReactiveHttpClient {
    async fn execute_request(
        &self,
        request: ReactiveHttpRequest,
    ) -> Result<BoxResponse, FeignError> {
        let response = self.inner.execute_request(request).await?;
        Ok(self.mappers.iter().fold(response, |response, mapper| {
            let before = response.status();
            let mapped = mapper.map(response);
            if mapped.status() != before {
                debug_fmt!(
                    "ResponseMapper",
                    "'{}' mapped status {} to {}",
                    mapper.name(),
                    before,
                    mapped.status()
                );
            }
            mapped
        }))
    }
}
