// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client assembly.
//!
//! [`ReactiveFeignBuilder`] wraps a transport in the decorators that were
//! configured, always in the same order (outermost first):
//!
//! ```text
//! Logger -> Retry -> ResponseMapper -> StatusHandler -> Interceptor -> Transport
//! ```
//!
//! The logger sees the outcome after retries, so its timing covers the whole
//! logical call. Retry sees errors after status handling and re-runs the
//! interceptors on every attempt. Response mappers sit outside status
//! handling, so `decode404` turns a `404` into an empty success before retry
//! can count it as a failure.
//!
//! [`ReactiveFeignClient`] is the typed entry point on top of the pipeline.

#[cfg(test)]
mod tests;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

use crate::config::{ClientProperties, Config};
use crate::core::{
    BoxResponse, FeignError, HttpMethod, MethodMetadata, ReactiveHttpClient, ReactiveHttpRequest,
    ResultKind,
};
use crate::interceptor::{
    HeaderInterceptor, HeaderInterceptorConfig, InterceptorChain, InterceptorFactory,
    InterceptorReactiveHttpClient, ReactiveHttpRequestInterceptor,
};
use crate::logger::{
    DefaultReactiveLogger, LoggerReactiveHttpClient, ReactiveLoggerListener,
};
use crate::mapper::{Ignore404Mapper, ResponseMapper, ResponseMappingReactiveHttpClient};
use crate::retry::{ReactiveRetryPolicy, RetryReactiveHttpClient};
use crate::status::{
    CompositeStatusHandler, DefaultStatusHandler, ReactiveStatusHandler,
    StatusHandlerReactiveHttpClient,
};
use crate::transport::ReqwestHttpClient;
use crate::{debug_fmt, info_fmt};

/// Collects the parts of a client and composes them.
pub struct ReactiveFeignBuilder {
    method: MethodMetadata,
    target: Option<Url>,
    transport: Option<Arc<dyn ReactiveHttpClient>>,
    interceptors: InterceptorChain,
    status_handlers: CompositeStatusHandler,
    mappers: Vec<Arc<dyn ResponseMapper>>,
    retry_policy: Option<Arc<dyn ReactiveRetryPolicy>>,
    logger: Option<Arc<dyn ReactiveLoggerListener>>,
}

impl fmt::Debug for ReactiveFeignBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveFeignBuilder")
            .field("method", &self.method)
            .field("target", &self.target.as_ref().map(Url::as_str))
            .field("interceptors", &self.interceptors)
            .field("status_handlers", &self.status_handlers)
            .field("mappers", &self.mappers.len())
            .field("retry", &self.retry_policy.as_ref().map(|p| p.name().to_string()))
            .finish_non_exhaustive()
    }
}

impl ReactiveFeignBuilder {
    pub fn new(method: MethodMetadata) -> Self {
        Self {
            method,
            target: None,
            transport: None,
            interceptors: InterceptorChain::new(),
            status_handlers: CompositeStatusHandler::default(),
            mappers: Vec::new(),
            retry_policy: None,
            logger: None,
        }
    }

    /// Base URL that request paths are appended to.
    pub fn target(mut self, target: &str) -> Result<Self, FeignError> {
        let url = Url::parse(target)
            .map_err(|e| FeignError::Configuration(format!("invalid target '{target}': {e}")))?;
        self.target = Some(url);
        Ok(self)
    }

    /// Replace the default `reqwest` transport.
    pub fn transport(mut self, transport: Arc<dyn ReactiveHttpClient>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn add_interceptor(mut self, interceptor: Arc<dyn ReactiveHttpRequestInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Add a status handler. Handlers are tried in the order added; statuses
    /// `>= 400` that none of them claims get [`DefaultStatusHandler`].
    pub fn add_status_handler(mut self, handler: Arc<dyn ReactiveStatusHandler>) -> Self {
        self.status_handlers.push(handler);
        self
    }

    pub fn add_response_mapper(mut self, mapper: Arc<dyn ResponseMapper>) -> Self {
        self.mappers.push(mapper);
        self
    }

    /// Treat `404 Not Found` as an empty result.
    pub fn decode404(self) -> Self {
        self.add_response_mapper(Arc::new(Ignore404Mapper))
    }

    pub fn retry_policy(mut self, policy: Arc<dyn ReactiveRetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn logger(mut self, listener: Arc<dyn ReactiveLoggerListener>) -> Self {
        self.logger = Some(listener);
        self
    }

    /// Start from the properties of client `name` (see [`ClientProperties`]).
    pub fn from_config(
        method: MethodMetadata,
        config: &Config,
        name: &str,
    ) -> Result<Self, FeignError> {
        let props = ClientProperties::load(config, name)?;
        debug_fmt!("ReactiveFeign", "Client '{}' properties: {:?}", name, props);
        Self::from_properties(method, &props)
    }

    pub fn from_properties(
        method: MethodMetadata,
        props: &ClientProperties,
    ) -> Result<Self, FeignError> {
        let kind = method.kind;
        let mut builder = Self::new(method);

        if let Some(target) = &props.target {
            builder = builder.target(target)?;
        }

        let client = ReqwestHttpClient::client_builder(props.connect_timeout(), props.follow_redirects)?;
        let mut transport = ReqwestHttpClient::new(client, kind);
        if let Some(read_timeout) = props.read_timeout() {
            transport = transport.with_timeout(read_timeout);
        }
        builder = builder.transport(Arc::new(transport));

        if !props.default_headers.is_empty() {
            let headers = HeaderInterceptor::new(HeaderInterceptorConfig {
                defaults: props.default_headers.clone(),
                ..HeaderInterceptorConfig::default()
            })?;
            builder = builder.add_interceptor(Arc::new(headers));
        }
        for entry in &props.interceptors {
            let interceptor = InterceptorFactory::create_interceptor(&entry.kind, entry.config.clone())?;
            builder = builder.add_interceptor(interceptor);
        }

        if props.decode404 {
            builder = builder.decode404();
        }
        if let Some(retry) = &props.retry {
            builder = builder.retry_policy(Arc::new(retry.to_policy()));
        }
        if let Some(logger) = &props.logger {
            builder = builder.logger(Arc::new(DefaultReactiveLogger::new(logger.to_logger_config())));
        }
        Ok(builder)
    }

    /// Compose the pipeline.
    pub fn build(self) -> ReactiveFeignClient {
        let method = self.method;
        let key = method.method_key.as_str();

        let mut client: Arc<dyn ReactiveHttpClient> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestHttpClient::new(reqwest::Client::new(), method.kind)),
        };

        if !self.interceptors.is_empty() {
            client = Arc::new(InterceptorReactiveHttpClient::new(
                client,
                Arc::new(self.interceptors),
            ));
        }

        let mut handlers = self.status_handlers;
        handlers.push(Arc::new(DefaultStatusHandler));
        client = Arc::new(StatusHandlerReactiveHttpClient::new(
            client,
            Arc::new(handlers),
            key,
        ));

        if !self.mappers.is_empty() {
            client = Arc::new(ResponseMappingReactiveHttpClient::new(client, self.mappers));
        }

        if let Some(policy) = self.retry_policy {
            let listener: Arc<dyn ReactiveLoggerListener> = match &self.logger {
                Some(listener) => listener.clone(),
                None => Arc::new(DefaultReactiveLogger::default()),
            };
            client = Arc::new(RetryReactiveHttpClient::new(client, policy, listener, &method));
        }

        if let Some(listener) = self.logger {
            client = Arc::new(LoggerReactiveHttpClient::new(client, listener, key));
        }

        info_fmt!("ReactiveFeign", "Built client for {}", key);
        ReactiveFeignClient {
            pipeline: client,
            target: self.target,
            method,
        }
    }
}

/// Stream of typed body elements.
pub type TypedStream<T> = BoxStream<'static, Result<T, FeignError>>;

/// A composed client for one method.
#[derive(Debug, Clone)]
pub struct ReactiveFeignClient {
    pipeline: Arc<dyn ReactiveHttpClient>,
    target: Option<Url>,
    method: MethodMetadata,
}

impl ReactiveFeignClient {
    pub fn builder(method: MethodMetadata) -> ReactiveFeignBuilder {
        ReactiveFeignBuilder::new(method)
    }

    pub fn method(&self) -> &MethodMetadata {
        &self.method
    }

    /// A request for `path`, appended to the target. An absolute URL
    /// (`scheme://…`) is used as is.
    pub fn request(&self, method: HttpMethod, path: &str) -> Result<ReactiveHttpRequest, FeignError> {
        if path.contains("://") {
            return ReactiveHttpRequest::parse(method, path);
        }
        let target = self.target.as_ref().ok_or_else(|| {
            FeignError::InvalidRequest(format!("relative path '{path}' without a target"))
        })?;
        let base = target.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        ReactiveHttpRequest::parse(method, &format!("{base}/{path}"))
    }

    /// Run the request through the pipeline.
    pub async fn execute(&self, request: ReactiveHttpRequest) -> Result<BoxResponse, FeignError> {
        self.pipeline.execute_request(request).await
    }

    /// Execute a single-valued method and decode its result.
    pub async fn mono<T: DeserializeOwned>(
        &self,
        request: ReactiveHttpRequest,
    ) -> Result<Option<T>, FeignError> {
        self.expect_kind(ResultKind::Mono)?;
        let response = self.execute(request).await?;
        match response.body().next().await {
            Some(element) => Ok(Some(serde_json::from_value(element?)?)),
            None => Ok(None),
        }
    }

    /// Execute a multi-valued method; elements are decoded as they arrive.
    pub async fn flux<T>(&self, request: ReactiveHttpRequest) -> Result<TypedStream<T>, FeignError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.expect_kind(ResultKind::Flux)?;
        let response = self.execute(request).await?;
        Ok(response
            .body()
            .map(|element| -> Result<T, FeignError> { Ok(serde_json::from_value(element?)?) })
            .boxed())
    }

    fn expect_kind(&self, kind: ResultKind) -> Result<(), FeignError> {
        if self.method.kind == kind {
            return Ok(());
        }
        Err(FeignError::Configuration(format!(
            "{} is declared {:?}, not {:?}",
            self.method.method_key, self.method.kind, kind
        )))
    }
}
